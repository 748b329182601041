//! Agent 错误类型
//!
//! 只用于构建期（配置、知识库、模型客户端）；对话循环内部的故障一律转成文本观察，不向上传播。

use thiserror::Error;

use crate::store::StoreError;

/// 构建 Agent 组件或运行二进制时可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Knowledge store error: {0}")]
    Store(#[from] StoreError),

    #[error("Prompt file error: {0}")]
    PromptFile(#[from] std::io::Error),
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::ConfigError(e.to_string())
    }
}
