//! Mock / Scripted LLM 客户端（用于离线运行与测试，无需 API）
//!
//! - MockLlmClient：取最后一条 User 消息，以苏格拉底式反问回显（不调用工具，单轮即结束）
//! - ScriptedLlmClient：按顺序返回预设回复，并记录每次收到的消息快照，便于断言循环行为

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(sin entrada)");

        Ok(format!(
            "Dices «{}». Dime, ¿qué entiendes tú por ello?",
            last_user
        ))
    }
}

/// 预设回复序列；脚本用完后返回 Err，模拟后端故障
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 追加一次失败回复
    pub fn then_fail(self, error: impl Into<String>) -> Self {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(error.into()));
        }
        self
    }

    /// 每次 complete 收到的消息快照
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        self.replies
            .lock()
            .map_err(|e| e.to_string())?
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_echoes_last_user_message() {
        let out = MockLlmClient
            .complete(&[Message::system("p"), Message::user("la virtud")])
            .await
            .unwrap();
        assert!(out.contains("la virtud"));
        assert!(!out.contains('{'));
    }

    #[tokio::test]
    async fn test_scripted_replays_in_order_then_fails() {
        let llm = ScriptedLlmClient::new(["uno", "dos"]).then_fail("down");
        assert_eq!(llm.complete(&[]).await.unwrap(), "uno");
        assert_eq!(llm.complete(&[]).await.unwrap(), "dos");
        assert_eq!(llm.complete(&[]).await.unwrap_err(), "down");
        assert_eq!(llm.complete(&[]).await.unwrap_err(), "script exhausted");
        assert_eq!(llm.call_count(), 4);
    }
}
