//! 工具适配器：提供方结果 + 固定后续指令 -> 一条观察
//!
//! 适配器只计算观察，不碰会话状态；提交由 Orchestrator 一步完成。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{Observation, PendingTool};
use crate::react::{tool_followup, Action, RetrievalVariant};
use crate::tools::{
    lookup, Calculator, Encyclopedia, RetrievalService, SpeechSynthesizer, ToolAdapter,
};

pub const EMPTY_RETRIEVAL_QUERY: &str = "No se recibió texto para búsqueda vectorial.";
pub const NO_RESULTS: &str = "⚠️ No se encontraron resultados relevantes.";

pub struct WikipediaAdapter {
    encyclopedia: Arc<dyn Encyclopedia>,
    sentences: usize,
}

impl WikipediaAdapter {
    pub fn new(encyclopedia: Arc<dyn Encyclopedia>, sentences: usize) -> Self {
        Self {
            encyclopedia,
            sentences,
        }
    }
}

#[async_trait]
impl ToolAdapter for WikipediaAdapter {
    fn name(&self) -> &str {
        "wikipedia"
    }

    async fn run(&self, pending: &PendingTool) -> Observation {
        let query = pending.query().unwrap_or_default();
        let (result, ok) = match lookup(self.encyclopedia.as_ref(), query, self.sentences).await {
            Ok(summary) => (summary, true),
            Err(e) => (e.to_string(), false),
        };
        Observation::new(
            Action::Wikipedia,
            format!(
                "Información de Wikipedia: {result}\n\n{}",
                tool_followup(Action::Wikipedia)
            ),
        )
        .with_ok(ok)
    }
}

pub struct CalculatorAdapter {
    calculator: Calculator,
}

impl CalculatorAdapter {
    pub fn new(calculator: Calculator) -> Self {
        Self { calculator }
    }
}

#[async_trait]
impl ToolAdapter for CalculatorAdapter {
    fn name(&self) -> &str {
        "calculator"
    }

    async fn run(&self, pending: &PendingTool) -> Observation {
        let (result, ok) = match self.calculator.evaluate(pending.query().unwrap_or_default()) {
            Ok(value) => (value.to_string(), true),
            Err(e) => (e.to_string(), false),
        };
        Observation::new(
            Action::Calculate,
            format!(
                "Resultado del cálculo: {result}\n\n{}",
                tool_followup(Action::Calculate)
            ),
        )
        .with_ok(ok)
    }
}

pub struct SpeechAdapter {
    synthesizer: SpeechSynthesizer,
}

impl SpeechAdapter {
    pub fn new(synthesizer: SpeechSynthesizer) -> Self {
        Self { synthesizer }
    }
}

#[async_trait]
impl ToolAdapter for SpeechAdapter {
    fn name(&self) -> &str {
        "tts"
    }

    async fn run(&self, pending: &PendingTool) -> Observation {
        let (result, ok) = match self.synthesizer.speak(pending.query().unwrap_or_default()).await {
            Ok(path) => (format!("Audio generado exitosamente: {}", path.display()), true),
            Err(e) => (e.to_string(), false),
        };
        Observation::new(
            Action::Speak,
            format!("Audio generado: {result}\n\n{}", tool_followup(Action::Speak)),
        )
        .with_ok(ok)
    }
}

/// 五种检索变体共用一个适配器，变体取自 pending.action
pub struct RetrievalAdapter {
    service: RetrievalService,
}

impl RetrievalAdapter {
    pub fn new(service: RetrievalService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolAdapter for RetrievalAdapter {
    fn name(&self) -> &str {
        "vector_search"
    }

    async fn run(&self, pending: &PendingTool) -> Observation {
        let variant = match pending.action {
            Action::Retrieve(v) => v,
            _ => RetrievalVariant::default(),
        };
        let action = Action::Retrieve(variant);
        let Some(query) = pending.query() else {
            return Observation::new(action, EMPTY_RETRIEVAL_QUERY).with_ok(false);
        };

        let results = self.service.run(variant, query).await;
        let content = if results.is_empty() {
            NO_RESULTS.to_string()
        } else {
            results.render()
        };
        Observation::new(action, format!("{content}\n\n{}", tool_followup(action)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::HashingEmbedder;
    use crate::store::SqliteKnowledgeStore;
    use crate::tools::{CapabilityError, RetrievalLimits};

    struct StaticEncyclopedia(Result<String, CapabilityError>);

    #[async_trait]
    impl Encyclopedia for StaticEncyclopedia {
        async fn summary(&self, _query: &str, _sentences: usize) -> Result<String, CapabilityError> {
            self.0.clone()
        }
    }

    fn pending(action: Action, input: &str) -> PendingTool {
        PendingTool {
            action,
            input: Some(input.to_string()),
        }
    }

    #[tokio::test]
    async fn test_calculator_observation() {
        let adapter = CalculatorAdapter::new(Calculator::with_current_year(2025));
        let obs = adapter.run(&pending(Action::Calculate, "2+2")).await;
        assert!(obs.content.starts_with("Resultado del cálculo: 4.0\n\n"));
        assert!(obs.content.ends_with(tool_followup(Action::Calculate)));
        assert_eq!(obs.tool, Action::Calculate);
        assert!(obs.ok);
    }

    #[tokio::test]
    async fn test_wikipedia_fault_is_observation_text() {
        let adapter = WikipediaAdapter::new(Arc::new(StaticEncyclopedia(Err(CapabilityError::NotFound))), 5);
        let obs = adapter.run(&pending(Action::Wikipedia, "Sócrates")).await;
        assert!(obs
            .content
            .starts_with("Información de Wikipedia: No se encontró ningún resultado en Wikipedia."));
        assert!(!obs.ok);
    }

    #[tokio::test]
    async fn test_retrieval_without_results() {
        let store = SqliteKnowledgeStore::open_in_memory().unwrap();
        let service = RetrievalService::new(
            Arc::new(store),
            Arc::new(HashingEmbedder::new(16)),
            RetrievalLimits::default(),
        );
        let adapter = RetrievalAdapter::new(service);
        let action = Action::Retrieve(RetrievalVariant::RelatedConcepts);

        let obs = adapter.run(&pending(action, "virtud")).await;
        assert!(obs.content.starts_with(NO_RESULTS));
        assert_eq!(obs.tool, action);

        let empty = adapter.run(&pending(action, "   ")).await;
        assert_eq!(empty.content, EMPTY_RETRIEVAL_QUERY);
        assert!(!empty.ok);
    }
}
