//! Load knowledge files into the vector store.
//!
//! Usage:
//!   load-knowledge [directory]
//!
//! The directory defaults to `KNOWLEDGE_DIR`. Re-running on unchanged
//! files overwrites the same chunks, so ingestion is safe to repeat.

use std::env;
use std::path::PathBuf;

use knowledgebot::loader::{discover_sources, FileLoader};
use knowledgebot::rag::compose_agent;
use knowledgebot::{logging, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    logging::init(&config.log_dir);

    let dir = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.knowledge_dir.clone());

    println!("Loading knowledge from {}", dir.display());

    let files = discover_sources(&dir)?;
    if files.is_empty() {
        anyhow::bail!(
            "no knowledge files found in {} (supported: .md, .markdown, .txt)",
            dir.display()
        );
    }
    println!("Found {} knowledge file(s)\n", files.len());

    let agent = compose_agent(&config).await?;
    let loader = FileLoader::new(config.chunking.clone());

    let mut total_stored = 0usize;
    let mut total_failed = 0usize;

    for path in &files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        match loader.load(path) {
            Ok(documents) => {
                let chunk_count = documents.len();
                let report = agent.add_documents(documents).await?;

                total_stored += report.stored;
                total_failed += report.failures.len();

                println!("  {name}: {chunk_count} chunk(s)");
                for (id, err) in &report.failures {
                    eprintln!("    failed to embed {id}: {err}");
                }
            }
            Err(err) => {
                total_failed += 1;
                eprintln!("  skipping {name}: {err}");
            }
        }
    }

    println!(
        "\nLoaded {} chunk(s) into store '{}'",
        total_stored, config.store.store_name
    );
    if total_failed > 0 {
        println!("{total_failed} item(s) failed; fix and re-run to ingest them");
    }

    Ok(())
}
