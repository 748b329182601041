//! 语义检索：五种变体
//!
//! 每个变体恰好一次存储查询（比较变体为两次精确查询）；嵌入或存储故障记 error 日志，
//! 返回空列表 / 空比较记录，由适配器统一输出"无相关结果"。

use std::collections::HashSet;
use std::sync::Arc;

use crate::llm::EmbeddingProvider;
use crate::react::RetrievalVariant;
use crate::store::{
    ConceptComparison, ConceptContext, ConceptHit, DocumentHit, FragmentHit, KnowledgeStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalLimits {
    pub documents: usize,
    pub concepts: usize,
    pub fragments: usize,
}

impl Default for RetrievalLimits {
    fn default() -> Self {
        Self {
            documents: 5,
            concepts: 10,
            fragments: 10,
        }
    }
}

/// 按变体打标签的检索结果
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalResults {
    Documents(Vec<DocumentHit>),
    Concepts(Vec<ConceptHit>),
    Fragments(Vec<FragmentHit>),
    Context {
        concept: String,
        rows: Vec<ConceptContext>,
    },
    Comparison(ConceptComparison),
}

impl RetrievalResults {
    pub fn is_empty(&self) -> bool {
        match self {
            RetrievalResults::Documents(v) => v.is_empty(),
            RetrievalResults::Concepts(v) => v.is_empty(),
            RetrievalResults::Fragments(v) => v.is_empty(),
            RetrievalResults::Context { rows, .. } => rows.is_empty(),
            RetrievalResults::Comparison(c) => c.is_empty(),
        }
    }

    /// 每个变体一种文本格式
    pub fn render(&self) -> String {
        match self {
            RetrievalResults::Documents(hits) => hits
                .iter()
                .map(|h| format!("{}: {}", h.title, h.preview))
                .collect::<Vec<_>>()
                .join("\n"),
            RetrievalResults::Concepts(hits) => hits
                .iter()
                .map(|h| format!("{}: similaridad {:.3}", h.concept, h.similarity))
                .collect::<Vec<_>>()
                .join("\n"),
            RetrievalResults::Fragments(hits) => hits
                .iter()
                .map(|h| {
                    format!(
                        "[documento {} · fragmento {} · similaridad {:.3}] {}",
                        h.document_id, h.fragment_index, h.similarity, h.text
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            RetrievalResults::Context { concept, rows } => rows
                .iter()
                .map(|r| {
                    format!(
                        "'{}' aparece {} veces en {} documentos. Ejemplo: {}",
                        concept, r.total_frequency, r.documents_mentioning, r.example_context
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            RetrievalResults::Comparison(c) => {
                let listed = if c.common_concepts.is_empty() {
                    "ninguno".to_string()
                } else {
                    c.common_concepts.join(", ")
                };
                format!(
                    "'{}' y '{}' comparten {} conceptos: {}",
                    c.first_title, c.second_title, c.common_count, listed
                )
            }
        }
    }
}

/// 比较变体的输入："A | B"、"A; B"、"A vs B"、"A vs. B"
pub fn split_titles(input: &str) -> Option<(String, String)> {
    let pair = ["|", ";", " vs. ", " vs "]
        .iter()
        .find_map(|sep| input.split_once(sep))?;
    let (a, b) = (pair.0.trim(), pair.1.trim());
    if a.is_empty() || b.is_empty() {
        return None;
    }
    Some((a.to_string(), b.to_string()))
}

pub struct RetrievalService {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    limits: RetrievalLimits,
}

impl RetrievalService {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        limits: RetrievalLimits,
    ) -> Self {
        Self {
            store,
            embedder,
            limits,
        }
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        match self.embedder.embed(text).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::error!(error = %e, "query embedding failed");
                None
            }
        }
    }

    pub async fn search_documents(&self, query: &str, limit: usize) -> Vec<DocumentHit> {
        let Some(embedding) = self.embed(query).await else {
            return Vec::new();
        };
        self.store
            .nearest_documents(self.embedder.model_name(), &embedding, limit)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "document search failed");
                Vec::new()
            })
    }

    pub async fn related_concepts(&self, concept: &str, limit: usize) -> Vec<ConceptHit> {
        let Some(embedding) = self.embed(concept).await else {
            return Vec::new();
        };
        self.store
            .nearest_concepts(self.embedder.model_name(), &embedding, limit)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "related concept search failed");
                Vec::new()
            })
    }

    pub async fn specific_fragments(&self, query: &str, limit: usize) -> Vec<FragmentHit> {
        let Some(embedding) = self.embed(query).await else {
            return Vec::new();
        };
        self.store
            .nearest_fragments(self.embedder.model_name(), &embedding, limit)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "fragment search failed");
                Vec::new()
            })
    }

    pub async fn concept_context(&self, concept: &str) -> Vec<ConceptContext> {
        self.store
            .concept_context(self.embedder.model_name(), concept)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(concept, error = %e, "concept context lookup failed");
                Vec::new()
            })
    }

    /// 概念集合求交；任一查询失败返回空记录
    pub async fn compare_documents(&self, first: &str, second: &str) -> ConceptComparison {
        let lookup = async {
            let a = self.store.concepts_for_title(first).await?;
            let b = self.store.concepts_for_title(second).await?;
            Ok::<_, crate::store::StoreError>((a, b))
        };
        match lookup.await {
            Ok((a, b)) => {
                let other: HashSet<&String> = b.iter().collect();
                let common: Vec<String> = a.iter().filter(|c| other.contains(c)).cloned().collect();
                ConceptComparison {
                    first_title: first.to_string(),
                    second_title: second.to_string(),
                    common_count: common.len(),
                    common_concepts: common,
                }
            }
            Err(e) => {
                tracing::error!(first, second, error = %e, "document comparison failed");
                ConceptComparison::default()
            }
        }
    }

    /// 按变体执行；调用方保证 query 非空
    pub async fn run(&self, variant: RetrievalVariant, query: &str) -> RetrievalResults {
        match variant {
            RetrievalVariant::DocumentsByContent => {
                RetrievalResults::Documents(self.search_documents(query, self.limits.documents).await)
            }
            RetrievalVariant::RelatedConcepts => {
                RetrievalResults::Concepts(self.related_concepts(query, self.limits.concepts).await)
            }
            RetrievalVariant::SpecificFragments => {
                RetrievalResults::Fragments(self.specific_fragments(query, self.limits.fragments).await)
            }
            RetrievalVariant::ConceptContext => RetrievalResults::Context {
                concept: query.to_string(),
                rows: self.concept_context(query).await,
            },
            RetrievalVariant::CompareDocuments => {
                let comparison = match split_titles(query) {
                    Some((a, b)) => self.compare_documents(&a, &b).await,
                    None => {
                        tracing::warn!(query, "comparison needs two titles");
                        ConceptComparison::default()
                    }
                };
                RetrievalResults::Comparison(comparison)
            }
        }
    }
}
