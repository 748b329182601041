//! Socrates 知识库索引
//!
//! 读取目录下所有 .txt 文档（文件名即标题，上级目录名即类型），写入 SQLite 并记录概念提及，
//! 然后依次向量化文档、长文档片段与概念。
//!
//! 启动: cargo run --bin socrates-index -- <docs_dir> [config.toml]

use std::path::{Path, PathBuf};

use anyhow::Context;
use socrates::agent::{create_embedder, open_store};
use socrates::config::load_config;
use socrates::observability;
use socrates::store::Indexer;
use walkdir::WalkDir;

const DEFAULT_KIND: &str = "dialogo";

fn document_kind(path: &Path, root: &Path) -> String {
    path.parent()
        .filter(|p| *p != root)
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| DEFAULT_KIND.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let mut args = std::env::args().skip(1);
    let docs_dir = args
        .next()
        .map(PathBuf::from)
        .context("usage: socrates-index <docs_dir> [config.toml]")?;
    let cfg = load_config(args.next().map(PathBuf::from)).context("Failed to load config")?;

    let store = open_store(&cfg).context("Failed to open knowledge store")?;
    let indexer = Indexer::new(store, create_embedder(&cfg));

    let mut ingested = 0usize;
    for entry in WalkDir::new(&docs_dir).into_iter().filter_map(Result::ok) {
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let Some(title) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
            continue;
        };
        let body = match tokio::fs::read_to_string(path).await {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to read document");
                continue;
            }
        };
        let kind = document_kind(path, &docs_dir);
        indexer
            .ingest_document(&title, &kind, &body, &cfg.indexer.concepts)
            .await
            .with_context(|| format!("Failed to ingest {}", path.display()))?;
        ingested += 1;
    }
    tracing::info!(ingested, dir = %docs_dir.display(), "documents ingested");

    let docs = indexer.vectorize_documents(cfg.indexer.max_chars).await?;
    let fragments = indexer.vectorize_fragments(cfg.indexer.chunk_size).await?;
    let concepts = indexer
        .vectorize_concepts(cfg.indexer.min_concept_frequency)
        .await?;

    println!(
        "documentos: {} ({} fallidos), fragmentos: {} documentos ({} fallidos), conceptos: {} ({} fallidos)",
        docs.processed, docs.failed, fragments.processed, fragments.failed, concepts.processed, concepts.failed
    );
    Ok(())
}
