//! 知识库层：文档 / 片段 / 概念的向量存储
//!
//! KnowledgeStore 是检索工具依赖的唯一接口（五种查询）；SqliteKnowledgeStore 为默认实现，
//! Indexer 负责把原始文本向量化写入库中。

pub mod indexer;
pub mod sqlite;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use indexer::{split_into_fragments, IndexReport, Indexer};
pub use sqlite::{cosine_similarity, decode_embedding, encode_embedding, SqliteKnowledgeStore};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Blocking task failed: {0}")]
    Join(String),

    #[error("Connection lock poisoned")]
    Poisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 按内容检索到的文档
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentHit {
    pub document_id: i64,
    pub title: String,
    pub kind: String,
    pub similarity: f64,
    pub preview: String,
}

/// 语义相近的概念
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConceptHit {
    pub concept: String,
    pub similarity: f64,
    pub total_frequency: i64,
    pub example_context: String,
}

/// 语义相近的文本片段
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragmentHit {
    pub document_id: i64,
    pub fragment_index: i64,
    pub text: String,
    pub similarity: f64,
}

/// 某概念的上下文统计（精确匹配）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConceptContext {
    pub example_context: String,
    pub total_frequency: i64,
    pub documents_mentioning: i64,
}

/// 两个文档的共同概念；空记录表示比较失败
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConceptComparison {
    pub first_title: String,
    pub second_title: String,
    pub common_concepts: Vec<String>,
    pub common_count: usize,
}

impl ConceptComparison {
    pub fn is_empty(&self) -> bool {
        self.first_title.is_empty() && self.second_title.is_empty()
    }
}

/// 检索工具依赖的数据存储接口
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// 文档最近邻（按文本向量）；只比较 `model` 生成的向量
    async fn nearest_documents(
        &self,
        model: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<DocumentHit>, StoreError>;

    /// 概念最近邻
    async fn nearest_concepts(
        &self,
        model: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ConceptHit>, StoreError>;

    /// 片段表按向量距离排序扫描
    async fn nearest_fragments(
        &self,
        model: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<FragmentHit>, StoreError>;

    /// 概念上下文精确查询
    async fn concept_context(
        &self,
        model: &str,
        concept: &str,
    ) -> Result<Vec<ConceptContext>, StoreError>;

    /// 标题 -> 该文档提到的概念集合（精确匹配）
    async fn concepts_for_title(&self, title: &str) -> Result<Vec<String>, StoreError>;
}
