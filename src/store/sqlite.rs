//! SQLite 知识库
//!
//! 向量以小端 f32 BLOB 存储；连接上注册 `cosine_similarity(a, b)` 标量函数，
//! 最近邻查询因此是单条 `ORDER BY cosine_similarity(...) DESC LIMIT n` SQL。
//! 连接放在 Arc<Mutex<Connection>> 中，所有访问经 spawn_blocking，供多会话并发共享。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection};

use crate::store::{
    ConceptContext, ConceptHit, DocumentHit, FragmentHit, KnowledgeStore, StoreError,
};

/// 文档预览默认字符数
pub const DEFAULT_PREVIEW_CHARS: usize = 300;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL DEFAULT 'dialogo',
    body TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS document_embeddings (
    document_id INTEGER NOT NULL REFERENCES documents(id),
    model TEXT NOT NULL,
    title_embedding BLOB NOT NULL,
    text_embedding BLOB NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (document_id, model)
);

CREATE TABLE IF NOT EXISTS fragment_embeddings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(id),
    fragment_index INTEGER NOT NULL,
    fragment_text TEXT NOT NULL,
    embedding BLOB NOT NULL,
    token_count INTEGER NOT NULL,
    model TEXT NOT NULL,
    UNIQUE (document_id, fragment_index, model)
);

CREATE TABLE IF NOT EXISTS concept_mentions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(id),
    concept TEXT NOT NULL,
    context TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_concept_mentions_concept ON concept_mentions(concept);

CREATE TABLE IF NOT EXISTS concept_embeddings (
    concept TEXT NOT NULL,
    model TEXT NOT NULL,
    example_context TEXT NOT NULL,
    embedding BLOB NOT NULL,
    total_frequency INTEGER NOT NULL,
    documents_mentioning INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (concept, model)
);
"#;

pub fn encode_embedding(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// 维度不一致或零向量时返回 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0f64, 0f64, 0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "cosine_similarity",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let a: Vec<u8> = ctx.get(0)?;
            let b: Vec<u8> = ctx.get(1)?;
            Ok(cosine_similarity(&decode_embedding(&a), &decode_embedding(&b)))
        },
    )
}

/// 索引阶段读取的文档
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: i64,
    pub title: String,
    pub body: String,
}

/// 概念出现统计（用于概念向量化）
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptStats {
    pub concept: String,
    pub frequency: i64,
    pub documents: i64,
    /// 最长的一条上下文
    pub example_context: Option<String>,
}

/// 一个待写入的片段：(文本, 向量, 词数)
pub type FragmentRecord = (String, Vec<f32>, usize);

#[derive(Clone)]
pub struct SqliteKnowledgeStore {
    conn: Arc<Mutex<Connection>>,
    preview_chars: usize,
}

impl SqliteKnowledgeStore {
    /// 打开或创建知识库；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self::init(Connection::open(path)?)?;
        tracing::info!(path = %path.display(), "knowledge store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        register_functions(&conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            preview_chars: DEFAULT_PREVIEW_CHARS,
        })
    }

    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars.max(1);
        self
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }

    /// 按标题 upsert 文档，返回 id
    pub async fn upsert_document(
        &self,
        title: &str,
        kind: &str,
        body: &str,
    ) -> Result<i64, StoreError> {
        let (title, kind, body) = (title.to_string(), kind.to_string(), body.to_string());
        self.with_conn(move |conn| {
            let id = conn.query_row(
                "INSERT INTO documents (title, kind, body) VALUES (?1, ?2, ?3)
                 ON CONFLICT(title) DO UPDATE SET kind = excluded.kind, body = excluded.body
                 RETURNING id",
                params![title, kind, body],
                |r| r.get(0),
            )?;
            Ok(id)
        })
        .await
    }

    pub async fn documents(&self) -> Result<Vec<StoredDocument>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, title, body FROM documents ORDER BY id")?;
            let rows = stmt.query_map([], |r| {
                Ok(StoredDocument {
                    id: r.get(0)?,
                    title: r.get(1)?,
                    body: r.get(2)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    /// 正文字符数超过 min_chars 的文档
    pub async fn documents_longer_than(
        &self,
        min_chars: usize,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let min_chars = min_chars as i64;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, body FROM documents WHERE length(body) > ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![min_chars], |r| {
                Ok(StoredDocument {
                    id: r.get(0)?,
                    title: r.get(1)?,
                    body: r.get(2)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    pub async fn upsert_document_embedding(
        &self,
        document_id: i64,
        model: &str,
        title_embedding: &[f32],
        text_embedding: &[f32],
    ) -> Result<(), StoreError> {
        let model = model.to_string();
        let (title_blob, text_blob) = (
            encode_embedding(title_embedding),
            encode_embedding(text_embedding),
        );
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO document_embeddings
                    (document_id, model, title_embedding, text_embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (document_id, model) DO UPDATE SET
                    title_embedding = excluded.title_embedding,
                    text_embedding = excluded.text_embedding,
                    created_at = excluded.created_at",
                params![document_id, model, title_blob, text_blob, Utc::now()],
            )?;
            Ok(())
        })
        .await
    }

    /// 用新片段整体替换某文档在该模型下的片段
    pub async fn replace_fragments(
        &self,
        document_id: i64,
        model: &str,
        fragments: Vec<FragmentRecord>,
    ) -> Result<usize, StoreError> {
        let model = model.to_string();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM fragment_embeddings WHERE document_id = ?1 AND model = ?2",
                params![document_id, model],
            )?;
            let count = fragments.len();
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO fragment_embeddings
                        (document_id, fragment_index, fragment_text, embedding, token_count, model)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for (i, (text, embedding, tokens)) in fragments.into_iter().enumerate() {
                    stmt.execute(params![
                        document_id,
                        i as i64,
                        text,
                        encode_embedding(&embedding),
                        tokens as i64,
                        model
                    ])?;
                }
            }
            tx.commit()?;
            Ok(count)
        })
        .await
    }

    pub async fn add_concept_mention(
        &self,
        document_id: i64,
        concept: &str,
        context: &str,
    ) -> Result<(), StoreError> {
        let (concept, context) = (concept.to_string(), context.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO concept_mentions (document_id, concept, context) VALUES (?1, ?2, ?3)",
                params![document_id, concept, context],
            )?;
            Ok(())
        })
        .await
    }

    /// 删除某文档的全部概念出现记录（重新索引前调用）
    pub async fn clear_concept_mentions(&self, document_id: i64) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM concept_mentions WHERE document_id = ?1",
                params![document_id],
            )?;
            Ok(())
        })
        .await
    }

    /// 出现次数不少于 min_frequency 的概念
    pub async fn concept_stats(&self, min_frequency: i64) -> Result<Vec<ConceptStats>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT m.concept, COUNT(*), COUNT(DISTINCT m.document_id),
                        (SELECT c.context FROM concept_mentions c
                         WHERE c.concept = m.concept
                         ORDER BY length(c.context) DESC LIMIT 1)
                 FROM concept_mentions m
                 GROUP BY m.concept
                 HAVING COUNT(*) >= ?1
                 ORDER BY m.concept",
            )?;
            let rows = stmt.query_map(params![min_frequency], |r| {
                Ok(ConceptStats {
                    concept: r.get(0)?,
                    frequency: r.get(1)?,
                    documents: r.get(2)?,
                    example_context: r.get(3)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    pub async fn upsert_concept_embedding(
        &self,
        stats: &ConceptStats,
        model: &str,
        example_context: &str,
        embedding: &[f32],
    ) -> Result<(), StoreError> {
        let (concept, frequency, documents) =
            (stats.concept.clone(), stats.frequency, stats.documents);
        let (model, example_context, blob) = (
            model.to_string(),
            example_context.to_string(),
            encode_embedding(embedding),
        );
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO concept_embeddings
                    (concept, model, example_context, embedding, total_frequency,
                     documents_mentioning, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (concept, model) DO UPDATE SET
                    example_context = excluded.example_context,
                    embedding = excluded.embedding,
                    total_frequency = excluded.total_frequency,
                    documents_mentioning = excluded.documents_mentioning,
                    created_at = excluded.created_at",
                params![concept, model, example_context, blob, frequency, documents, Utc::now()],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn nearest_documents(
        &self,
        model: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<DocumentHit>, StoreError> {
        let (model, blob, limit, preview) = (
            model.to_string(),
            encode_embedding(embedding),
            limit as i64,
            self.preview_chars as i64,
        );
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT d.id, d.title, d.kind,
                        cosine_similarity(e.text_embedding, ?1) AS score,
                        substr(d.body, 1, ?3)
                 FROM document_embeddings e
                 JOIN documents d ON d.id = e.document_id
                 WHERE e.model = ?4
                 ORDER BY score DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![blob, limit, preview, model], |r| {
                Ok(DocumentHit {
                    document_id: r.get(0)?,
                    title: r.get(1)?,
                    kind: r.get(2)?,
                    similarity: r.get(3)?,
                    preview: r.get(4)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn nearest_concepts(
        &self,
        model: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ConceptHit>, StoreError> {
        let (model, blob, limit) = (model.to_string(), encode_embedding(embedding), limit as i64);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT concept, cosine_similarity(embedding, ?1) AS score,
                        total_frequency, example_context
                 FROM concept_embeddings
                 WHERE model = ?3
                 ORDER BY score DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![blob, limit, model], |r| {
                Ok(ConceptHit {
                    concept: r.get(0)?,
                    similarity: r.get(1)?,
                    total_frequency: r.get(2)?,
                    example_context: r.get(3)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn nearest_fragments(
        &self,
        model: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<FragmentHit>, StoreError> {
        let (model, blob, limit) = (model.to_string(), encode_embedding(embedding), limit as i64);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT document_id, fragment_index, fragment_text,
                        cosine_similarity(embedding, ?1) AS score
                 FROM fragment_embeddings
                 WHERE model = ?3
                 ORDER BY score DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![blob, limit, model], |r| {
                Ok(FragmentHit {
                    document_id: r.get(0)?,
                    fragment_index: r.get(1)?,
                    text: r.get(2)?,
                    similarity: r.get(3)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn concept_context(
        &self,
        model: &str,
        concept: &str,
    ) -> Result<Vec<ConceptContext>, StoreError> {
        let (model, concept) = (model.to_string(), concept.to_string());
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT example_context, total_frequency, documents_mentioning
                 FROM concept_embeddings
                 WHERE concept = ?1 AND model = ?2",
            )?;
            let rows = stmt.query_map(params![concept, model], |r| {
                Ok(ConceptContext {
                    example_context: r.get(0)?,
                    total_frequency: r.get(1)?,
                    documents_mentioning: r.get(2)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn concepts_for_title(&self, title: &str) -> Result<Vec<String>, StoreError> {
        let title = title.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT m.concept
                 FROM concept_mentions m
                 JOIN documents d ON d.id = m.document_id
                 WHERE d.title = ?1
                 ORDER BY m.concept",
            )?;
            let rows = stmt.query_map(params![title], |r| r.get(0))?;
            Ok(rows.collect::<Result<Vec<String>, _>>()?)
        })
        .await
    }
}
