//! 模型输出解析
//!
//! 清理指令分隔符残留 -> 取第一个 `{` 到最后一个 `}` 的贪婪片段 -> 严格 JSON 解析出 action / input。
//! 解析失败或动作名不在集合内时不报错，只返回“无动作”并附带诊断信息；清理后的文本即为回复。

use serde::Deserialize;
use serde_json::Value;

use crate::react::Action;

/// 清理后文本为空时的占位回复
pub const NO_OUTPUT_PLACEHOLDER: &str = "El LLM no generó texto";

/// 本地指令模型常见的模板残留
const INSTRUCTION_ARTIFACTS: [&str; 4] = ["[INST]", "[/INST]", "<s>", "</s>"];

/// 从一次模型回复中解析出的动作请求（用完即弃，只拷贝进 ConversationState）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub action: Option<Action>,
    pub input: Option<String>,
}

/// 不影响控制流的诊断信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseDiagnostic {
    /// 有花括号片段但不是合法 JSON 对象
    MalformedJson { span: String, error: String },
    /// JSON 合法但 action 不在动作集合内
    UnknownAction(String),
}

/// 解析结果：text 为追加到对话中的助手消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    pub text: String,
    pub request: Option<ActionRequest>,
    pub diagnostic: Option<ParseDiagnostic>,
}

impl ParsedOutput {
    pub fn action(&self) -> Option<Action> {
        self.request.as_ref().and_then(|r| r.action)
    }

    pub fn input(&self) -> Option<&str> {
        self.request.as_ref().and_then(|r| r.input.as_deref())
    }
}

#[derive(Deserialize)]
struct RawPayload {
    action: Option<Value>,
    input: Option<Value>,
}

/// 去掉分隔符残留并 trim；结果为空时返回占位文本
pub fn clean_model_output(raw: &str) -> String {
    let mut text = raw.trim().to_string();
    for artifact in INSTRUCTION_ARTIFACTS {
        text = text.replace(artifact, "");
    }
    let text = text.trim();
    if text.is_empty() {
        NO_OUTPUT_PLACEHOLDER.to_string()
    } else {
        text.to_string()
    }
}

/// 第一个 `{` 到最后一个 `}`（可跨行）
fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// 非字符串的标量 input（数字、布尔）转成文本；null / 数组 / 对象视为缺失
fn input_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// 解析模型原始输出
pub fn parse_model_output(raw: &str) -> ParsedOutput {
    let text = clean_model_output(raw);
    tracing::debug!(raw = %raw, cleaned = %text, "model output");

    let Some(span) = brace_span(&text) else {
        return ParsedOutput {
            text,
            request: None,
            diagnostic: None,
        };
    };

    let payload: RawPayload = match serde_json::from_str(span) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(span = %span, error = %e, "brace-shaped span is not valid JSON, treating as plain reply");
            let diagnostic = ParseDiagnostic::MalformedJson {
                span: span.to_string(),
                error: e.to_string(),
            };
            return ParsedOutput {
                text,
                request: None,
                diagnostic: Some(diagnostic),
            };
        }
    };

    let input = input_text(payload.input);
    let (action, diagnostic) = match payload.action {
        Some(Value::String(name)) => match name.parse::<Action>() {
            Ok(a) => (Some(a), None),
            Err(_) => {
                tracing::warn!(action = %name, "model requested an unknown action");
                (None, Some(ParseDiagnostic::UnknownAction(name)))
            }
        },
        Some(Value::Null) | None => (None, None),
        Some(other) => {
            let name = other.to_string();
            tracing::warn!(action = %name, "model requested a non-string action");
            (None, Some(ParseDiagnostic::UnknownAction(name)))
        }
    };
    tracing::info!(action = ?action.map(|a| a.name()), input = ?input, "parsed action payload");

    ParsedOutput {
        text,
        request: Some(ActionRequest { action, input }),
        diagnostic,
    }
}
