//! Socrates - Rust 苏格拉底式哲学导师智能体
//!
//! 模块划分：
//! - **agent**: 由配置组装 Orchestrator（LLM、知识库、工具）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 会话状态、错误类型、ReAct 主控循环
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / Scripted）与嵌入提供方
//! - **memory**: 对话消息与对话记录持久化
//! - **observability**: tracing 初始化
//! - **react**: 动作枚举与路由、模型输出解析、提示词、过程事件
//! - **store**: SQLite 向量知识库与索引器
//! - **tools**: 百科、计算器、语音合成、语义检索与适配器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod store;
pub mod tools;

pub use crate::core::{ConversationState, Orchestrator, StopReason, TurnOutcome};
