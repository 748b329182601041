//! 主控循环
//!
//! 状态机 AwaitingModel -> DispatchingTool -> Done：
//! 保证系统提示 -> 调用模型 -> 解析 -> 写入待执行动作 -> 路由 -> 适配器计算观察 -> 一步提交 -> 回到模型。
//! 每轮工具循环次数受 max_cycles 限制；轮次结束时一定清空待执行动作。
//! 可选 event_tx 推送 Thinking / ModelOutput / ToolCall / Observation / Finished 等过程事件。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::ConversationState;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::react::{parse_model_output, route, NextStep, ParseDiagnostic, ReactEvent};
use crate::tools::Toolbox;

/// 默认每轮最多工具循环次数
pub const DEFAULT_MAX_CYCLES: usize = 6;

pub const CYCLE_LIMIT_REPLY: &str = "He alcanzado el límite de razonamiento para esta pregunta. \
¿Podrías reformularla o dividirla en partes más sencillas?";

pub const MODEL_FAULT_REPLY: &str =
    "Lo siento, no he podido consultar al modelo de lenguaje. ¿Lo intentamos de nuevo?";

pub const CANCELLED_REPLY: &str = "La conversación fue interrumpida.";

/// 观察预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 本轮结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Answered,
    CycleLimit,
    ModelFault,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub reply: String,
    /// 本轮执行的工具次数
    pub cycles: usize,
    pub stop: StopReason,
}

/// 无状态编排器；每个会话持有自己的 ConversationState，可多会话共享
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    toolbox: Toolbox,
    system_prompt: String,
    max_cycles: usize,
    event_tx: Option<UnboundedSender<ReactEvent>>,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, toolbox: Toolbox, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            toolbox,
            system_prompt: system_prompt.into(),
            max_cycles: DEFAULT_MAX_CYCLES,
            event_tx: None,
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: usize) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn max_cycles(&self) -> usize {
        self.max_cycles
    }

    /// 底层模型客户端的累计 token：(prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    fn send_event(&self, ev: ReactEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }

    fn finish(
        &self,
        state: &mut ConversationState,
        reply: String,
        cycles: usize,
        stop: StopReason,
    ) -> TurnOutcome {
        state.clear_pending();
        tracing::info!(cycles, stop = ?stop, "turn finished");
        self.send_event(ReactEvent::Finished {
            reply: reply.clone(),
            cycles,
        });
        TurnOutcome {
            reply,
            cycles,
            stop,
        }
    }

    /// 处理一条用户消息，直到模型给出最终回复（或触达上限 / 模型故障 / 取消）
    pub async fn run_turn(
        &self,
        state: &mut ConversationState,
        user_input: &str,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        state.push(Message::user(user_input));
        let mut cycles = 0;

        loop {
            // AwaitingModel
            if cancel.is_cancelled() {
                return self.finish(state, CANCELLED_REPLY.to_string(), cycles, StopReason::Cancelled);
            }
            if state.ensure_system_prompt(&self.system_prompt) {
                tracing::debug!("system prompt inserted");
            }

            self.send_event(ReactEvent::Thinking {
                cycle: cycles + 1,
                max_cycles: self.max_cycles,
            });
            let completion = tokio::select! {
                _ = cancel.cancelled() => None,
                result = self.llm.complete(state.messages()) => Some(result),
            };
            let raw = match completion {
                None => {
                    return self.finish(state, CANCELLED_REPLY.to_string(), cycles, StopReason::Cancelled)
                }
                Some(Ok(raw)) => raw,
                Some(Err(e)) => {
                    tracing::error!(error = %e, "model call failed");
                    state.push(Message::assistant(MODEL_FAULT_REPLY));
                    return self.finish(state, MODEL_FAULT_REPLY.to_string(), cycles, StopReason::ModelFault);
                }
            };

            let parsed = parse_model_output(&raw);
            self.send_event(ReactEvent::ModelOutput {
                text: parsed.text.clone(),
            });
            match &parsed.diagnostic {
                Some(ParseDiagnostic::MalformedJson { span, error }) => {
                    self.send_event(ReactEvent::ParseFault {
                        span: span.clone(),
                        error: error.clone(),
                    })
                }
                Some(ParseDiagnostic::UnknownAction(action)) => {
                    self.send_event(ReactEvent::UnknownAction {
                        action: action.clone(),
                    })
                }
                None => {}
            }
            if let Some(action) = parsed.action() {
                tracing::info!(action = %action, input = ?parsed.input(), "model requested tool");
            }

            let reply = parsed.text.clone();
            state.push(Message::assistant(parsed.text));
            state.set_pending(parsed.request);

            // DispatchingTool
            let step = route(state.pending_action.as_ref());
            if step == NextStep::Terminate {
                return self.finish(state, reply, cycles, StopReason::Answered);
            }
            if cycles >= self.max_cycles {
                tracing::warn!(max_cycles = self.max_cycles, "reasoning limit reached");
                state.push(Message::assistant(CYCLE_LIMIT_REPLY));
                return self.finish(state, CYCLE_LIMIT_REPLY.to_string(), cycles, StopReason::CycleLimit);
            }
            let Some(pending) = state.take_pending() else {
                return self.finish(state, reply, cycles, StopReason::Answered);
            };

            self.send_event(ReactEvent::ToolCall {
                tool: pending.action.name().to_string(),
                input: pending.input.clone(),
            });
            let executed = tokio::select! {
                _ = cancel.cancelled() => None,
                obs = self.toolbox.execute(step, &pending) => obs,
            };
            let Some(observation) = executed else {
                return self.finish(state, CANCELLED_REPLY.to_string(), cycles, StopReason::Cancelled);
            };
            self.send_event(ReactEvent::Observation {
                tool: observation.tool.name().to_string(),
                preview: observation
                    .content
                    .chars()
                    .take(OBSERVATION_PREVIEW_CHARS)
                    .collect(),
            });
            state.commit(observation);
            cycles += 1;
        }
    }
}
