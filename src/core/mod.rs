//! 核心编排层：错误类型、会话状态、主控循环

pub mod error;
pub mod orchestrator;
pub mod state;

pub use error::AgentError;
pub use orchestrator::{
    Orchestrator, StopReason, TurnOutcome, CANCELLED_REPLY, CYCLE_LIMIT_REPLY,
    DEFAULT_MAX_CYCLES, MODEL_FAULT_REPLY,
};
pub use state::{ConversationState, Observation, PendingTool};
