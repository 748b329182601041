//! 工具层：能力提供方（百科、计算、语音、语义检索）与适配器
//!
//! 提供方把所有故障转换成值（CapabilityError 的 Display 即面向用户的文本），
//! 适配器负责把结果与固定的后续指令组合成一条观察；Toolbox 按 NextStep 分派并输出审计日志。

pub mod adapters;
pub mod calculator;
pub mod retrieval;
pub mod speech;
pub mod wikipedia;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::{Observation, PendingTool};
use crate::react::NextStep;

pub use adapters::{CalculatorAdapter, RetrievalAdapter, SpeechAdapter, WikipediaAdapter};
pub use calculator::{Calculation, Calculator};
pub use retrieval::{split_titles, RetrievalLimits, RetrievalResults, RetrievalService};
pub use speech::{encode_wav, HttpSpeechBackend, SpeechBackend, SpeechSynthesizer, Waveform};
pub use wikipedia::{lookup, Encyclopedia, WikipediaClient};

/// 能力故障；Display 文本直接写入观察
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CapabilityError {
    #[error("{0}")]
    EmptyInput(&'static str),

    #[error("No se encontró ningún resultado en Wikipedia.")]
    NotFound,

    #[error("Tu consulta es ambigua. Tal vez quisiste decir: {}", .options.join(", "))]
    Ambiguous { options: Vec<String> },

    #[error("{0}")]
    Backend(String),
}

/// 工具适配器：读取待执行调用，调用提供方，返回待提交的观察（不直接改状态）
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// 审计日志中的工具名
    fn name(&self) -> &str;

    async fn run(&self, pending: &PendingTool) -> Observation;
}

/// 按路由结果持有四个适配器
pub struct Toolbox {
    wikipedia: Arc<dyn ToolAdapter>,
    calculator: Arc<dyn ToolAdapter>,
    speech: Arc<dyn ToolAdapter>,
    retrieval: Arc<dyn ToolAdapter>,
}

impl Toolbox {
    pub fn new(
        wikipedia: Arc<dyn ToolAdapter>,
        calculator: Arc<dyn ToolAdapter>,
        speech: Arc<dyn ToolAdapter>,
        retrieval: Arc<dyn ToolAdapter>,
    ) -> Self {
        Self {
            wikipedia,
            calculator,
            speech,
            retrieval,
        }
    }

    /// Terminate 没有对应适配器
    pub fn adapter_for(&self, step: NextStep) -> Option<&Arc<dyn ToolAdapter>> {
        match step {
            NextStep::Wikipedia => Some(&self.wikipedia),
            NextStep::Calculator => Some(&self.calculator),
            NextStep::Speech => Some(&self.speech),
            NextStep::VectorSearch(_) => Some(&self.retrieval),
            NextStep::Terminate => None,
        }
    }

    /// 执行适配器并输出一行 JSON 审计日志
    pub async fn execute(&self, step: NextStep, pending: &PendingTool) -> Option<Observation> {
        let adapter = self.adapter_for(step)?;
        let start = Instant::now();
        let observation = adapter.run(pending).await;
        let audit = audit_record(adapter.name(), pending, &observation, start.elapsed().as_millis() as u64);
        tracing::info!(audit = %audit.to_string(), "tool");
        Some(observation)
    }
}

fn audit_record(
    tool: &str,
    pending: &PendingTool,
    observation: &Observation,
    duration_ms: u64,
) -> serde_json::Value {
    serde_json::json!({
        "event": "tool_audit",
        "tool": tool,
        "action": pending.action.name(),
        "ok": observation.ok,
        "duration_ms": duration_ms,
        "input_preview": input_preview(pending.input.as_deref().unwrap_or("")),
    })
}

fn input_preview(input: &str) -> String {
    if input.chars().count() > 200 {
        format!("{}...", input.chars().take(200).collect::<String>())
    } else {
        input.to_string()
    }
}
