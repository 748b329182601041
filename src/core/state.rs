//! 会话状态
//!
//! 一次会话的可变记录：消息历史、待执行动作及其输入、最近使用的工具。
//! 轮次内由 Orchestrator 独占；交给模型时只读快照。

use crate::memory::{Message, Role};
use crate::react::{Action, ActionRequest};

/// 工具执行后要写回对话的观察
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub tool: Action,
    pub content: String,
    /// 提供方是否成功；故障文本同样会写回对话
    pub ok: bool,
}

impl Observation {
    pub fn new(tool: Action, content: impl Into<String>) -> Self {
        Self {
            tool,
            content: content.into(),
            ok: true,
        }
    }

    pub fn with_ok(mut self, ok: bool) -> Self {
        self.ok = ok;
        self
    }
}

/// 从状态中取出的待执行工具调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTool {
    pub action: Action,
    pub input: Option<String>,
}

impl PendingTool {
    /// 去掉首尾空白后的输入；空串视为缺失
    pub fn query(&self) -> Option<&str> {
        self.input.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
    pub pending_action: Option<Action>,
    pub tool_input: Option<String>,
    /// 仅用于观测，控制逻辑不读取
    pub last_tool_used: Option<Action>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从持久化的历史恢复
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// 保证 messages[0] 是系统提示；已存在时不重复插入。返回是否插入
    pub fn ensure_system_prompt(&mut self, prompt: &str) -> bool {
        if self.messages.first().is_some_and(Message::is_system) {
            return false;
        }
        self.messages.insert(0, Message::system(prompt));
        true
    }

    /// 写入解析结果；无请求时清空
    pub fn set_pending(&mut self, request: Option<ActionRequest>) {
        match request {
            Some(r) => {
                self.pending_action = r.action;
                self.tool_input = r.input;
            }
            None => self.clear_pending(),
        }
    }

    /// 取出并清空待执行动作与输入
    pub fn take_pending(&mut self) -> Option<PendingTool> {
        let input = self.tool_input.take();
        self.pending_action
            .take()
            .map(|action| PendingTool { action, input })
    }

    pub fn clear_pending(&mut self) {
        self.pending_action = None;
        self.tool_input = None;
    }

    /// 一步提交观察：追加助手消息、清空待执行动作、记录 last_tool_used
    pub fn commit(&mut self, observation: Observation) {
        self.messages.push(Message::assistant(observation.content));
        self.clear_pending();
        self.last_tool_used = Some(observation.tool);
    }

    pub fn last_assistant(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    /// 清空对话（REPL 的 /reset）
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::react::RetrievalVariant;

    #[test]
    fn test_system_prompt_inserted_once_at_front() {
        let mut state = ConversationState::new();
        state.push(Message::user("hola"));
        assert!(state.ensure_system_prompt("persona"));
        assert!(!state.ensure_system_prompt("persona"));
        assert_eq!(state.messages().len(), 2);
        assert!(state.messages()[0].is_system());
        assert_eq!(
            state.messages().iter().filter(|m| m.is_system()).count(),
            1
        );
    }

    #[test]
    fn test_take_pending_clears_both_fields() {
        let mut state = ConversationState::new();
        state.set_pending(Some(ActionRequest {
            action: Some(Action::Calculate),
            input: Some("2+2".into()),
        }));
        let pending = state.take_pending().unwrap();
        assert_eq!(pending.action, Action::Calculate);
        assert_eq!(pending.query(), Some("2+2"));
        assert!(state.pending_action.is_none());
        assert!(state.tool_input.is_none());
    }

    #[test]
    fn test_commit_records_last_tool() {
        let mut state = ConversationState::new();
        let tool = Action::Retrieve(RetrievalVariant::RelatedConcepts);
        state.pending_action = Some(tool);
        state.tool_input = Some("alma".into());
        state.commit(Observation::new(tool, "alma: similaridad 0.9"));
        assert_eq!(state.last_tool_used, Some(tool));
        assert!(state.pending_action.is_none());
        assert_eq!(state.last_assistant(), Some("alma: similaridad 0.9"));
    }

    #[test]
    fn test_blank_input_is_not_a_query() {
        let pending = PendingTool {
            action: Action::Wikipedia,
            input: Some("   ".into()),
        };
        assert_eq!(pending.query(), None);
    }
}
