//! 动作枚举与工具路由
//!
//! 模型输出中的 `action` 字符串在解析边界就转成封闭枚举 Action；
//! `route` 是纯函数，把待执行动作映射到唯一的下一步（具体工具或 Terminate）。
//! 匹配是严格的字符串相等：不做大小写折叠，也不做模糊匹配。

use std::fmt;
use std::str::FromStr;

/// 五种语义检索变体
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RetrievalVariant {
    /// buscar_documentos_por_contenido
    #[default]
    DocumentsByContent,
    /// buscar_conceptos_relacionados
    RelatedConcepts,
    /// buscar_fragmentos_especificos
    SpecificFragments,
    /// analizar_contexto_concepto
    ConceptContext,
    /// comparar_documentos_por_conceptos
    CompareDocuments,
}

impl RetrievalVariant {
    pub const ALL: [RetrievalVariant; 5] = [
        RetrievalVariant::DocumentsByContent,
        RetrievalVariant::RelatedConcepts,
        RetrievalVariant::SpecificFragments,
        RetrievalVariant::ConceptContext,
        RetrievalVariant::CompareDocuments,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RetrievalVariant::DocumentsByContent => "buscar_documentos_por_contenido",
            RetrievalVariant::RelatedConcepts => "buscar_conceptos_relacionados",
            RetrievalVariant::SpecificFragments => "buscar_fragmentos_especificos",
            RetrievalVariant::ConceptContext => "analizar_contexto_concepto",
            RetrievalVariant::CompareDocuments => "comparar_documentos_por_conceptos",
        }
    }
}

/// 模型可请求的动作（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Wikipedia,
    Calculate,
    Speak,
    Retrieve(RetrievalVariant),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Wikipedia => "wikipedia",
            Action::Calculate => "calcular",
            Action::Speak => "voz",
            Action::Retrieve(v) => v.name(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 未知动作名
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wikipedia" => Ok(Action::Wikipedia),
            "calcular" => Ok(Action::Calculate),
            "voz" => Ok(Action::Speak),
            other => RetrievalVariant::ALL
                .iter()
                .find(|v| v.name() == other)
                .map(|v| Action::Retrieve(*v))
                .ok_or_else(|| UnknownAction(other.to_string())),
        }
    }
}

/// 路由结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Wikipedia,
    Calculator,
    Speech,
    VectorSearch(RetrievalVariant),
    Terminate,
}

/// 工具路由：无副作用、全函数，None 一律 Terminate
pub fn route(pending_action: Option<&Action>) -> NextStep {
    match pending_action {
        Some(Action::Wikipedia) => NextStep::Wikipedia,
        Some(Action::Calculate) => NextStep::Calculator,
        Some(Action::Speak) => NextStep::Speech,
        Some(Action::Retrieve(v)) => NextStep::VectorSearch(*v),
        None => NextStep::Terminate,
    }
}

/// 直接按名字路由（名字在集合外时 Terminate）
pub fn route_name(action: Option<&str>) -> NextStep {
    let parsed = action.and_then(|a| a.parse::<Action>().ok());
    route(parsed.as_ref())
}
