//! ReAct 过程事件：供前端展示思考、解析诊断、工具调用与观察

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 第 cycle 次调用模型
    Thinking { cycle: usize, max_cycles: usize },
    /// 清洗后的模型输出
    ModelOutput { text: String },
    /// 花括号片段不是合法 JSON
    ParseFault { span: String, error: String },
    /// JSON 合法但 action 不在集合内
    UnknownAction { action: String },
    ToolCall {
        tool: String,
        input: Option<String>,
    },
    /// 观察（预览）
    Observation { tool: String, preview: String },
    /// 本轮结束
    Finished { reply: String, cycles: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_is_tagged() {
        let ev = ReactEvent::ToolCall {
            tool: "calcular".into(),
            input: Some("2+2".into()),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "tool_call");
        assert_eq!(v["tool"], "calcular");
    }
}
