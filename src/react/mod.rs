//! 认知层：动作枚举与路由、模型输出解析、提示词、过程事件

pub mod action;
pub mod events;
pub mod parser;
pub mod prompts;

pub use action::{route, route_name, Action, NextStep, RetrievalVariant, UnknownAction};
pub use events::ReactEvent;
pub use parser::{
    clean_model_output, parse_model_output, ActionRequest, ParseDiagnostic, ParsedOutput,
    NO_OUTPUT_PLACEHOLDER,
};
pub use prompts::{system_prompt, tool_followup};
