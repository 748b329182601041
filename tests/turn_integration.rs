//! 整轮对话集成测试：Scripted LLM + 内存 SQLite + 确定性嵌入

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use socrates::core::{ConversationState, Orchestrator, StopReason, CYCLE_LIMIT_REPLY};
use socrates::llm::{EmbeddingProvider, HashingEmbedder, ScriptedLlmClient};
use socrates::memory::Role;
use socrates::react::{system_prompt, tool_followup, Action, RetrievalVariant};
use socrates::store::{
    ConceptContext, ConceptHit, DocumentHit, FragmentHit, Indexer, KnowledgeStore,
    SqliteKnowledgeStore, StoreError,
};
use socrates::tools::{
    Calculator, CalculatorAdapter, CapabilityError, Encyclopedia, RetrievalAdapter,
    RetrievalLimits, RetrievalService, SpeechAdapter, SpeechBackend, SpeechSynthesizer, Toolbox,
    Waveform, WikipediaAdapter,
};
use tokio_util::sync::CancellationToken;

struct CountingEmbedder {
    inner: HashingEmbedder,
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// 每次查询都失败并计数
#[derive(Default)]
struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    fn fail<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Join("connection reset".into()))
    }
}

#[async_trait]
impl KnowledgeStore for FailingStore {
    async fn nearest_documents(&self, _m: &str, _e: &[f32], _l: usize) -> Result<Vec<DocumentHit>, StoreError> {
        self.fail()
    }
    async fn nearest_concepts(&self, _m: &str, _e: &[f32], _l: usize) -> Result<Vec<ConceptHit>, StoreError> {
        self.fail()
    }
    async fn nearest_fragments(&self, _m: &str, _e: &[f32], _l: usize) -> Result<Vec<FragmentHit>, StoreError> {
        self.fail()
    }
    async fn concept_context(&self, _m: &str, _c: &str) -> Result<Vec<ConceptContext>, StoreError> {
        self.fail()
    }
    async fn concepts_for_title(&self, _t: &str) -> Result<Vec<String>, StoreError> {
        self.fail()
    }
}

struct FixedEncyclopedia;

#[async_trait]
impl Encyclopedia for FixedEncyclopedia {
    async fn summary(&self, query: &str, _sentences: usize) -> Result<String, CapabilityError> {
        Ok(format!("{query} fue un filósofo de Atenas."))
    }
}

struct SineBackend;

#[async_trait]
impl SpeechBackend for SineBackend {
    async fn synthesize(&self, _text: &str) -> Result<Waveform, String> {
        Ok(Waveform {
            sample_rate: 16_000,
            samples: (0..160).map(|i| (i as f32 / 10.0).sin() * 0.3).collect(),
        })
    }
}

fn toolbox_with(
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    audio_dir: &std::path::Path,
) -> Toolbox {
    Toolbox::new(
        Arc::new(WikipediaAdapter::new(Arc::new(FixedEncyclopedia), 5)),
        Arc::new(CalculatorAdapter::new(Calculator::with_current_year(2025))),
        Arc::new(SpeechAdapter::new(SpeechSynthesizer::new(
            Arc::new(SineBackend),
            audio_dir,
            "socrates",
        ))),
        Arc::new(RetrievalAdapter::new(RetrievalService::new(
            store,
            embedder,
            RetrievalLimits::default(),
        ))),
    )
}

fn default_toolbox(audio_dir: &std::path::Path) -> Toolbox {
    let store = SqliteKnowledgeStore::open_in_memory().unwrap();
    toolbox_with(Arc::new(store), Arc::new(HashingEmbedder::new(64)), audio_dir)
}

#[tokio::test]
async fn calculator_observation_reaches_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlmClient::new([
        r#"Veamos. {"action": "calcular", "input": "2+2"}"#,
        "Son cuatro. ¿Pero qué es el número en sí mismo?",
    ]));
    let orch = Orchestrator::new(llm.clone(), default_toolbox(dir.path()), system_prompt(true));
    let mut state = ConversationState::new();

    let out = orch
        .run_turn(&mut state, "¿Cuánto es 2+2?", &CancellationToken::new())
        .await;

    assert_eq!(out.stop, StopReason::Answered);
    assert_eq!(out.reply, "Son cuatro. ¿Pero qué es el número en sí mismo?");
    let second_call = &llm.calls()[1];
    let observation = second_call.last().unwrap();
    assert_eq!(observation.role, Role::Assistant);
    assert!(observation.content.contains("Resultado del cálculo: 4.0"));
    assert!(observation.content.ends_with(tool_followup(Action::Calculate)));
}

#[tokio::test]
async fn plain_question_is_the_final_answer() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlmClient::new(["¿Qué piensas tú sobre eso?"]));
    let orch = Orchestrator::new(llm.clone(), default_toolbox(dir.path()), "SYS");
    let mut state = ConversationState::new();

    let out = orch
        .run_turn(&mut state, "La virtud se enseña", &CancellationToken::new())
        .await;

    assert_eq!(out.stop, StopReason::Answered);
    assert_eq!(out.cycles, 0);
    assert_eq!(out.reply, "¿Qué piensas tú sobre eso?");
    assert_eq!(state.last_assistant(), Some("¿Qué piensas tú sobre eso?"));
    assert_eq!(llm.call_count(), 1);
}

#[tokio::test]
async fn system_prompt_stays_single_and_first_across_cycles_and_turns() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlmClient::new([
        r#"{"action": "wikipedia", "input": "Sócrates"}"#,
        r#"{"action": "calcular", "input": "399 a.C."}"#,
        "Hace mucho tiempo. ¿Importa el tiempo para la verdad?",
        "Pensemos juntos.",
    ]));
    let orch = Orchestrator::new(llm.clone(), default_toolbox(dir.path()), "PERSONA");
    let mut state = ConversationState::new();
    let cancel = CancellationToken::new();

    orch.run_turn(&mut state, "¿Quién fue Sócrates?", &cancel).await;
    orch.run_turn(&mut state, "Sigamos", &cancel).await;

    for snapshot in llm.calls() {
        assert_eq!(snapshot[0].role, Role::System);
        assert_eq!(snapshot[0].content, "PERSONA");
        assert_eq!(snapshot.iter().filter(|m| m.is_system()).count(), 1);
    }
    let third = &llm.calls()[2];
    assert!(third
        .iter()
        .any(|m| m.content.starts_with("Resultado del cálculo: 2424")));
    assert!(third
        .iter()
        .any(|m| m.content.starts_with("Información de Wikipedia: Sócrates fue")));
}

#[tokio::test]
async fn store_fault_yields_no_results_observation() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FailingStore::default());
    let llm = Arc::new(ScriptedLlmClient::new([
        r#"{"action": "buscar_documentos_por_contenido", "input": "la inmortalidad del alma"}"#,
        "No encontré textos. ¿Qué crees tú que es el alma?",
    ]));
    let toolbox = toolbox_with(store.clone(), Arc::new(HashingEmbedder::new(32)), dir.path());
    let orch = Orchestrator::new(llm.clone(), toolbox, "SYS");
    let mut state = ConversationState::new();

    let out = orch
        .run_turn(&mut state, "Háblame del alma", &CancellationToken::new())
        .await;

    assert_eq!(out.stop, StopReason::Answered);
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    assert!(state
        .messages()
        .iter()
        .any(|m| m.content.starts_with("⚠️ No se encontraron resultados relevantes.")));
}

#[tokio::test]
async fn empty_retrieval_query_touches_neither_embedder_nor_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FailingStore::default());
    let embedder = Arc::new(CountingEmbedder {
        inner: HashingEmbedder::new(32),
        calls: AtomicUsize::new(0),
    });
    let llm = Arc::new(ScriptedLlmClient::new([
        r#"{"action": "buscar_documentos_por_contenido", "input": ""}"#,
        "Dime primero qué buscas.",
    ]));
    let toolbox = toolbox_with(store.clone(), embedder.clone(), dir.path());
    let orch = Orchestrator::new(llm, toolbox, "SYS");
    let mut state = ConversationState::new();

    orch.run_turn(&mut state, "Busca", &CancellationToken::new()).await;

    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    assert!(state
        .messages()
        .iter()
        .any(|m| m.content == "No se recibió texto para búsqueda vectorial."));
    assert_eq!(state.pending_action, None);
}

#[tokio::test]
async fn cycle_limit_ends_turn_and_clears_pending() {
    let dir = tempfile::tempdir().unwrap();
    let looping = r#"{"action": "calcular", "input": "1+1"}"#;
    let llm = Arc::new(ScriptedLlmClient::new([looping, looping, looping, looping]));
    let orch = Orchestrator::new(llm.clone(), default_toolbox(dir.path()), "SYS").with_max_cycles(2);
    let mut state = ConversationState::new();

    let out = orch
        .run_turn(&mut state, "Calcula sin parar", &CancellationToken::new())
        .await;

    assert_eq!(out.stop, StopReason::CycleLimit);
    assert_eq!(out.cycles, 2);
    assert_eq!(out.reply, CYCLE_LIMIT_REPLY);
    assert_eq!(llm.call_count(), 3);
    assert_eq!(state.pending_action, None);
    assert_eq!(state.tool_input, None);
    assert_eq!(state.last_assistant(), Some(CYCLE_LIMIT_REPLY));
}

#[tokio::test]
async fn malformed_json_is_a_plain_reply() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlmClient::new([
        r#"Quizá {"action": "calcular", "input": } no."#,
    ]));
    let orch = Orchestrator::new(llm, default_toolbox(dir.path()), "SYS");
    let mut state = ConversationState::new();

    let out = orch.run_turn(&mut state, "hola", &CancellationToken::new()).await;
    assert_eq!(out.stop, StopReason::Answered);
    assert_eq!(out.reply, r#"Quizá {"action": "calcular", "input": } no."#);
    assert_eq!(state.last_tool_used, None);
}

#[tokio::test]
async fn speech_writes_artifact_and_confirms() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlmClient::new([
        r#"{"action": "voz", "input": "Solo sé que no sé nada"}"#,
        "Ya puedes escucharme.",
    ]));
    let orch = Orchestrator::new(llm, default_toolbox(dir.path()), "SYS");
    let mut state = ConversationState::new();

    orch.run_turn(&mut state, "Dilo en voz alta", &CancellationToken::new()).await;

    let wavs: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|x| x == "wav"))
        .collect();
    assert_eq!(wavs.len(), 1);
    assert!(state
        .messages()
        .iter()
        .any(|m| m.content.starts_with("Audio generado: Audio generado exitosamente:")));
    assert_eq!(state.last_tool_used, Some(Action::Speak));
}

#[tokio::test]
async fn indexed_corpus_is_searchable_through_a_turn() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteKnowledgeStore::open_in_memory().unwrap();
    let embedder = Arc::new(HashingEmbedder::new(128));
    let indexer = Indexer::new(store.clone(), embedder.clone());
    let vocab = vec!["alma".to_string(), "justicia".to_string()];
    indexer
        .ingest_document("Fedón", "dialogo", "El alma es inmortal. El alma recuerda.", &vocab)
        .await
        .unwrap();
    indexer
        .ingest_document("República", "dialogo", "La justicia en la ciudad. La justicia en el alma.", &vocab)
        .await
        .unwrap();
    indexer.vectorize_documents(8000).await.unwrap();
    indexer.vectorize_concepts(2).await.unwrap();

    let llm = Arc::new(ScriptedLlmClient::new([
        r#"{"action": "comparar_documentos_por_conceptos", "input": "Fedón | República"}"#,
        r#"{"action": "analizar_contexto_concepto", "input": "justicia"}"#,
        "Ambos hablan del alma.",
    ]));
    let toolbox = toolbox_with(Arc::new(store), embedder, dir.path());
    let orch = Orchestrator::new(llm, toolbox, "SYS");
    let mut state = ConversationState::new();

    let out = orch
        .run_turn(&mut state, "Compara Fedón y República", &CancellationToken::new())
        .await;

    assert_eq!(out.cycles, 2);
    let contents: Vec<&str> = state.messages().iter().map(|m| m.content.as_str()).collect();
    assert!(contents
        .iter()
        .any(|c| c.starts_with("'Fedón' y 'República' comparten 1 conceptos: alma")));
    assert!(contents
        .iter()
        .any(|c| c.starts_with("'justicia' aparece 2 veces en 1 documentos.")));
    assert_eq!(
        state.last_tool_used,
        Some(Action::Retrieve(RetrievalVariant::ConceptContext))
    );
}

#[tokio::test]
async fn sessions_run_concurrently_on_a_shared_orchestrator() {
    let dir = tempfile::tempdir().unwrap();
    let replies: Vec<String> = (0..8).map(|i| format!("Respuesta {i}")).collect();
    let llm = Arc::new(ScriptedLlmClient::new(replies));
    let orch = Arc::new(Orchestrator::new(llm.clone(), default_toolbox(dir.path()), "SYS"));

    let mut handles = Vec::new();
    for i in 0..8 {
        let orch = Arc::clone(&orch);
        handles.push(tokio::spawn(async move {
            let mut state = ConversationState::new();
            let out = orch
                .run_turn(&mut state, &format!("pregunta {i}"), &CancellationToken::new())
                .await;
            (out, state)
        }));
    }

    for handle in handles {
        let (out, state) = handle.await.unwrap();
        assert_eq!(out.stop, StopReason::Answered);
        assert!(out.reply.starts_with("Respuesta "));
        assert_eq!(state.messages().len(), 3);
    }
    assert_eq!(llm.call_count(), 8);
}
