//! 向量化索引
//!
//! 把 documents 表中的原文写成三类向量：文档（标题 + 正文前 max_chars 字符）、
//! 长文档的句子边界片段、出现至少两次的概念（"{概念}: {最长上下文}"）。
//! 单条失败只记日志并跳过，不中断整批。

use std::sync::Arc;

use crate::llm::EmbeddingProvider;
use crate::store::sqlite::{FragmentRecord, SqliteKnowledgeStore};
use crate::store::StoreError;

/// 一批索引的结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub processed: usize,
    pub failed: usize,
}

/// 按 ". " 切句并累积成不超过 max_size 字符的片段（单句超长时自成一段）
pub fn split_into_fragments(text: &str, max_size: usize) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    for sentence in text.split(". ") {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        let piece = if sentence.ends_with('.') {
            format!("{sentence} ")
        } else {
            format!("{sentence}. ")
        };
        if !current.is_empty() && current.chars().count() + sentence.chars().count() > max_size {
            fragments.push(current.trim().to_string());
            current.clear();
        }
        current.push_str(&piece);
    }
    if !current.trim().is_empty() {
        fragments.push(current.trim().to_string());
    }
    fragments
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub struct Indexer {
    store: SqliteKnowledgeStore,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Indexer {
    pub fn new(store: SqliteKnowledgeStore, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// 写入一篇文档并记录 vocabulary 中各概念所在的句子；返回文档 id
    pub async fn ingest_document(
        &self,
        title: &str,
        kind: &str,
        body: &str,
        vocabulary: &[String],
    ) -> Result<i64, StoreError> {
        let id = self.store.upsert_document(title, kind, body).await?;
        self.store.clear_concept_mentions(id).await?;
        for sentence in body.split(['.', '?', '!', '\n']).map(str::trim) {
            if sentence.is_empty() {
                continue;
            }
            let lower = sentence.to_lowercase();
            for concept in vocabulary {
                if mentions(&lower, &concept.to_lowercase()) {
                    self.store.add_concept_mention(id, concept, sentence).await?;
                }
            }
        }
        Ok(id)
    }

    pub async fn vectorize_documents(&self, max_chars: usize) -> Result<IndexReport, StoreError> {
        let documents = self.store.documents().await?;
        tracing::info!(count = documents.len(), "vectorizing documents");
        let mut report = IndexReport::default();
        let model = self.embedder.model_name().to_string();

        for (i, doc) in documents.iter().enumerate() {
            let title = self.embedder.embed(&doc.title).await;
            let text = self.embedder.embed(truncate_chars(&doc.body, max_chars)).await;
            match (title, text) {
                (Ok(t), Ok(x)) => {
                    self.store.upsert_document_embedding(doc.id, &model, &t, &x).await?;
                    report.processed += 1;
                }
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(document_id = doc.id, error = %e, "document embedding failed");
                    report.failed += 1;
                }
            }
            if (i + 1) % 10 == 0 {
                tracing::info!("processed {}/{} documents", i + 1, documents.len());
            }
        }
        Ok(report)
    }

    /// 只处理长度超过 2 * max_chunk_size 的文档
    pub async fn vectorize_fragments(&self, max_chunk_size: usize) -> Result<IndexReport, StoreError> {
        let documents = self.store.documents_longer_than(max_chunk_size * 2).await?;
        tracing::info!(count = documents.len(), "vectorizing fragments of long documents");
        let mut report = IndexReport::default();
        let model = self.embedder.model_name().to_string();

        'docs: for doc in documents {
            let mut records: Vec<FragmentRecord> = Vec::new();
            for fragment in split_into_fragments(&doc.body, max_chunk_size) {
                match self.embedder.embed(&fragment).await {
                    Ok(embedding) => {
                        let tokens = fragment.split_whitespace().count();
                        records.push((fragment, embedding, tokens));
                    }
                    Err(e) => {
                        tracing::error!(document_id = doc.id, error = %e, "fragment embedding failed");
                        report.failed += 1;
                        continue 'docs;
                    }
                }
            }
            self.store.replace_fragments(doc.id, &model, records).await?;
            report.processed += 1;
        }
        Ok(report)
    }

    pub async fn vectorize_concepts(&self, min_frequency: i64) -> Result<IndexReport, StoreError> {
        let concepts = self.store.concept_stats(min_frequency).await?;
        tracing::info!(count = concepts.len(), "vectorizing concepts");
        let mut report = IndexReport::default();
        let model = self.embedder.model_name().to_string();

        for stats in concepts {
            let context = stats
                .example_context
                .clone()
                .unwrap_or_else(|| stats.concept.clone());
            let text = format!("{}: {}", stats.concept, context);
            match self.embedder.embed(&text).await {
                Ok(embedding) => {
                    self.store
                        .upsert_concept_embedding(&stats, &model, &context, &embedding)
                        .await?;
                    report.processed += 1;
                }
                Err(e) => {
                    tracing::error!(concept = %stats.concept, error = %e, "concept embedding failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

/// 整词匹配（前后不是字母数字）
fn mentions(haystack: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    haystack.match_indices(word).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::HashingEmbedder;
    use crate::store::KnowledgeStore;

    #[test]
    fn test_split_respects_sentence_boundaries() {
        let text = "Uno dos. Tres cuatro. Cinco seis siete";
        let frags = split_into_fragments(text, 20);
        assert_eq!(frags, vec!["Uno dos. Tres cuatro.", "Cinco seis siete."]);
        assert!(split_into_fragments("", 10).is_empty());
    }

    #[test]
    fn test_mentions_whole_words_only() {
        assert!(mentions("el alma es inmortal", "alma"));
        assert!(!mentions("la almada", "alma"));
        assert!(mentions("virtud", "virtud"));
    }

    #[tokio::test]
    async fn test_full_index_makes_everything_searchable() {
        let store = SqliteKnowledgeStore::open_in_memory().unwrap();
        let embedder = Arc::new(HashingEmbedder::new(64));
        let indexer = Indexer::new(store.clone(), embedder.clone());
        let vocab = vec!["alma".to_string(), "justicia".to_string()];

        let long_body = "El alma es inmortal. ".repeat(40);
        indexer.ingest_document("Fedón", "dialogo", &long_body, &vocab).await.unwrap();
        indexer
            .ingest_document("República", "dialogo", "La justicia y el alma. Justicia en la ciudad.", &vocab)
            .await
            .unwrap();

        assert_eq!(indexer.vectorize_documents(8000).await.unwrap().processed, 2);
        assert_eq!(indexer.vectorize_fragments(100).await.unwrap().processed, 1);
        let concepts = indexer.vectorize_concepts(2).await.unwrap();
        assert_eq!(concepts.processed, 2);

        let query = embedder.encode("alma inmortal");
        let docs = store.nearest_documents(HashingEmbedder::MODEL_NAME, &query, 1).await.unwrap();
        assert_eq!(docs[0].title, "Fedón");
        assert!(!store.nearest_fragments(HashingEmbedder::MODEL_NAME, &query, 3).await.unwrap().is_empty());
        let ctx = store.concept_context(HashingEmbedder::MODEL_NAME, "justicia").await.unwrap();
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx[0].total_frequency, 2);
    }
}
