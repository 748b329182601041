//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SOCRATES__*` 覆盖（双下划线表示嵌套，如 `SOCRATES__AGENT__MAX_CYCLES=4`）。
//! 每个键都有默认值，缺少配置文件也能启动。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub agent: AgentSection,
    pub llm: LlmSection,
    pub embedding: EmbeddingSection,
    pub store: StoreSection,
    pub tools: ToolsSection,
    pub indexer: IndexerSection,
}

/// [app] 段：应用名、对话记录文件
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 设置后 REPL 每轮结束把对话写成 JSON
    pub transcript_path: Option<PathBuf>,
}

/// [agent] 段：循环上限与提示词
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_cycles")]
    pub max_cycles: usize,
    /// true 时系统提示包含工具说明与示例
    #[serde(default = "default_full_prompt")]
    pub full_prompt: bool,
    /// 指定文件时用文件内容替换内置系统提示
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
            full_prompt: default_full_prompt(),
            system_prompt_path: None,
        }
    }
}

fn default_max_cycles() -> usize {
    crate::core::DEFAULT_MAX_CYCLES
}

fn default_full_prompt() -> bool {
    true
}

/// [llm] 段：后端选择、采样参数与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// openai（OpenAI 兼容端点，含 llama.cpp / vLLM）或 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.4
}

fn default_top_p() -> f32 {
    0.9
}

fn default_max_tokens() -> u32 {
    218
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [embedding] 段
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSection {
    /// openai 或 hashing（离线确定性向量）
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// hashing 后端的向量维度
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            base_url: None,
            dimension: default_embedding_dimension(),
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimension() -> usize {
    384
}

/// [store] 段：SQLite 知识库路径
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/knowledge.db")
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ToolsSection {
    #[serde(default)]
    pub wikipedia: WikipediaSection,
    #[serde(default)]
    pub speech: SpeechSection,
    #[serde(default)]
    pub retrieval: RetrievalSection,
}

/// [tools.wikipedia] 段
#[derive(Debug, Clone, Deserialize)]
pub struct WikipediaSection {
    #[serde(default = "default_wikipedia_language")]
    pub language: String,
    /// 摘要句数
    #[serde(default = "default_wikipedia_sentences")]
    pub sentences: usize,
    /// 测试或镜像站点用；为空时使用 https://{language}.wikipedia.org
    pub base_url: Option<String>,
    #[serde(default = "default_wikipedia_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WikipediaSection {
    fn default() -> Self {
        Self {
            language: default_wikipedia_language(),
            sentences: default_wikipedia_sentences(),
            base_url: None,
            timeout_secs: default_wikipedia_timeout_secs(),
        }
    }
}

fn default_wikipedia_language() -> String {
    "es".to_string()
}

fn default_wikipedia_sentences() -> usize {
    5
}

fn default_wikipedia_timeout_secs() -> u64 {
    15
}

/// [tools.speech] 段
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechSection {
    #[serde(default = "default_speech_base_url")]
    pub base_url: String,
    #[serde(default = "default_speech_voice")]
    pub voice: String,
    #[serde(default = "default_speech_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_speech_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_speech_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SpeechSection {
    fn default() -> Self {
        Self {
            base_url: default_speech_base_url(),
            voice: default_speech_voice(),
            output_dir: default_speech_output_dir(),
            file_prefix: default_speech_file_prefix(),
            timeout_secs: default_speech_timeout_secs(),
        }
    }
}

fn default_speech_base_url() -> String {
    "http://127.0.0.1:5002".to_string()
}

fn default_speech_voice() -> String {
    "es_speaker_6".to_string()
}

fn default_speech_output_dir() -> PathBuf {
    PathBuf::from("audio")
}

fn default_speech_file_prefix() -> String {
    "socrates".to_string()
}

fn default_speech_timeout_secs() -> u64 {
    120
}

/// [tools.retrieval] 段
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalSection {
    #[serde(default = "default_document_limit")]
    pub document_limit: usize,
    #[serde(default = "default_concept_limit")]
    pub concept_limit: usize,
    #[serde(default = "default_fragment_limit")]
    pub fragment_limit: usize,
    /// 文档预览字符数
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            document_limit: default_document_limit(),
            concept_limit: default_concept_limit(),
            fragment_limit: default_fragment_limit(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_document_limit() -> usize {
    5
}

fn default_concept_limit() -> usize {
    10
}

fn default_fragment_limit() -> usize {
    10
}

fn default_preview_chars() -> usize {
    300
}

/// [indexer] 段：socrates-index 使用的向量化参数与概念词表
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerSection {
    /// 文档向量只取正文前 max_chars 字符
    #[serde(default = "default_index_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_index_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_min_concept_frequency")]
    pub min_concept_frequency: i64,
    /// 出现在文档句子中时记录为概念提及
    #[serde(default = "default_concepts")]
    pub concepts: Vec<String>,
}

impl Default for IndexerSection {
    fn default() -> Self {
        Self {
            max_chars: default_index_max_chars(),
            chunk_size: default_index_chunk_size(),
            min_concept_frequency: default_min_concept_frequency(),
            concepts: default_concepts(),
        }
    }
}

fn default_index_max_chars() -> usize {
    8000
}

fn default_index_chunk_size() -> usize {
    500
}

fn default_min_concept_frequency() -> i64 {
    2
}

fn default_concepts() -> Vec<String> {
    [
        "alma", "virtud", "justicia", "bien", "belleza", "verdad", "conocimiento", "opinión",
        "idea", "forma", "razón", "sabiduría", "amor", "muerte", "inmortalidad", "ciudad",
        "ley", "valor", "templanza", "piedad", "dialéctica", "reminiscencia", "naturaleza",
        "felicidad", "placer",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// 从 config 目录加载配置，环境变量 SOCRATES__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SOCRATES__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SOCRATES")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_any_file() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.max_cycles, 6);
        assert!(cfg.agent.full_prompt);
        assert_eq!(cfg.tools.wikipedia.language, "es");
        assert_eq!(cfg.tools.retrieval.document_limit, 5);
        assert_eq!(cfg.tools.retrieval.preview_chars, 300);
        assert_eq!(cfg.llm.max_tokens, 218);
        assert_eq!(cfg.indexer.chunk_size, 500);
        assert!(cfg.indexer.concepts.iter().any(|c| c == "alma"));
    }

    // 环境变量为进程级，文件覆盖与环境覆盖放在同一个测试里顺序执行
    #[test]
    fn test_file_then_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "[agent]\nmax_cycles = 3\n\n[tools.speech]\nvoice = \"es_speaker_2\"\n\n[store]\npath = \"/tmp/k.db\""
        )
        .unwrap();

        let cfg = load_config(Some(path.clone())).unwrap();
        assert_eq!(cfg.agent.max_cycles, 3);
        assert_eq!(cfg.tools.speech.voice, "es_speaker_2");
        assert_eq!(cfg.tools.speech.file_prefix, "socrates");
        assert_eq!(cfg.store.path, PathBuf::from("/tmp/k.db"));

        std::env::set_var("SOCRATES__AGENT__MAX_CYCLES", "9");
        std::env::set_var("SOCRATES__TOOLS__WIKIPEDIA__LANGUAGE", "en");
        let from_env = load_config(Some(path));
        std::env::remove_var("SOCRATES__AGENT__MAX_CYCLES");
        std::env::remove_var("SOCRATES__TOOLS__WIKIPEDIA__LANGUAGE");

        let cfg = from_env.unwrap();
        assert_eq!(cfg.agent.max_cycles, 9);
        assert_eq!(cfg.tools.wikipedia.language, "en");
        assert_eq!(cfg.tools.speech.voice, "es_speaker_2");
    }
}
