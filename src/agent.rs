//! Agent 组装
//!
//! 从 AppConfig 构建 LLM、嵌入提供方、知识库、四个工具适配器与系统提示，得到可多会话共享的 Orchestrator。
//! 所有服务句柄显式构建并注入，没有全局单例。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{AgentError, Orchestrator};
use crate::llm::{
    create_embedder_from_config, EmbeddingProvider, LlmClient, MockLlmClient, OpenAiClient,
    SamplingParams,
};
use crate::react::system_prompt;
use crate::store::{KnowledgeStore, SqliteKnowledgeStore};
use crate::tools::{
    Calculator, CalculatorAdapter, HttpSpeechBackend, RetrievalAdapter, RetrievalLimits,
    RetrievalService, SpeechAdapter, SpeechSynthesizer, Toolbox, WikipediaAdapter,
    WikipediaClient,
};

/// provider = "mock" 或没有 API Key 且未配置 base_url 时使用 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
    if provider == "mock" || (key.is_none() && cfg.llm.base_url.is_none()) {
        tracing::warn!("No API key or endpoint configured, using Mock LLM");
        return Arc::new(MockLlmClient);
    }
    tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
    Arc::new(
        OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, key.as_deref())
            .with_sampling(SamplingParams {
                temperature: cfg.llm.temperature,
                top_p: cfg.llm.top_p,
                max_tokens: cfg.llm.max_tokens,
            })
            .with_timeout(cfg.llm.timeouts.request),
    )
}

pub fn create_embedder(cfg: &AppConfig) -> Arc<dyn EmbeddingProvider> {
    create_embedder_from_config(
        &cfg.embedding.provider,
        cfg.embedding.base_url.as_deref(),
        &cfg.embedding.model,
        cfg.embedding.dimension,
    )
}

pub fn open_store(cfg: &AppConfig) -> Result<SqliteKnowledgeStore, AgentError> {
    Ok(SqliteKnowledgeStore::open(&cfg.store.path)?
        .with_preview_chars(cfg.tools.retrieval.preview_chars))
}

/// 系统提示：配置了 system_prompt_path 时读文件，否则用内置文本（full / basic）
pub fn load_system_prompt(cfg: &AppConfig) -> Result<String, AgentError> {
    match &cfg.agent.system_prompt_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            tracing::info!(path = %path.display(), "system prompt loaded from file");
            Ok(text)
        }
        None => Ok(system_prompt(cfg.agent.full_prompt)),
    }
}

pub fn create_toolbox(
    cfg: &AppConfig,
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<Toolbox, AgentError> {
    let wiki = &cfg.tools.wikipedia;
    let encyclopedia = WikipediaClient::new(&wiki.language, wiki.base_url.as_deref(), wiki.timeout_secs)
        .map_err(|e| AgentError::ConfigError(format!("wikipedia client: {e}")))?;

    let speech = &cfg.tools.speech;
    let backend = HttpSpeechBackend::new(&speech.base_url, &speech.voice, speech.timeout_secs)
        .map_err(|e| AgentError::ConfigError(format!("speech backend: {e}")))?;
    let synthesizer = SpeechSynthesizer::new(
        Arc::new(backend),
        speech.output_dir.clone(),
        speech.file_prefix.clone(),
    );

    let retrieval = &cfg.tools.retrieval;
    let service = RetrievalService::new(
        store,
        embedder,
        RetrievalLimits {
            documents: retrieval.document_limit,
            concepts: retrieval.concept_limit,
            fragments: retrieval.fragment_limit,
        },
    );

    Ok(Toolbox::new(
        Arc::new(WikipediaAdapter::new(Arc::new(encyclopedia), wiki.sentences)),
        Arc::new(CalculatorAdapter::new(Calculator::new())),
        Arc::new(SpeechAdapter::new(synthesizer)),
        Arc::new(RetrievalAdapter::new(service)),
    ))
}

/// 由配置构建完整 Orchestrator
pub fn build_orchestrator(cfg: &AppConfig) -> Result<Orchestrator, AgentError> {
    let store: Arc<dyn KnowledgeStore> = Arc::new(open_store(cfg)?);
    let toolbox = create_toolbox(cfg, store, create_embedder(cfg))?;
    let prompt = load_system_prompt(cfg)?;
    Ok(Orchestrator::new(create_llm_from_config(cfg), toolbox, prompt)
        .with_max_cycles(cfg.agent.max_cycles))
}
