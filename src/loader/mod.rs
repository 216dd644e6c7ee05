//! Knowledge file loading and chunking.
//!
//! Splits markdown/plain-text files into bounded, overlapping chunks,
//! preferring sentence boundaries near the end of a chunk. Chunk ids are
//! deterministic (`<file-name>#<index>`) so re-ingesting an unchanged file
//! overwrites in place.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::core::config::ChunkConfig;
use crate::core::errors::AppError;
use crate::store::Document;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Enumerate ingestible files directly under `dir`, sorted by name.
pub fn discover_sources(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let entries = fs::read_dir(dir).map_err(|err| AppError::unreadable(dir, err))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();

    files.sort();
    Ok(files)
}

pub struct FileLoader {
    chunking: ChunkConfig,
}

impl FileLoader {
    pub fn new(chunking: ChunkConfig) -> Self {
        Self { chunking }
    }

    /// Read a file and split it into chunk documents.
    ///
    /// A missing or unreadable path is an error; an empty file yields an
    /// empty list.
    pub fn load(&self, path: &Path) -> Result<Vec<Document>, AppError> {
        let text = fs::read_to_string(path).map_err(|err| AppError::unreadable(path, err))?;
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Ok(self.split(&text, &source))
    }

    fn split(&self, text: &str, source: &str) -> Vec<Document> {
        let max_chars = self.chunking.max_chars.max(1);
        let step = max_chars
            .saturating_sub(self.chunking.overlap_chars)
            .max(1);

        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();

        let mut documents = Vec::new();
        let mut start = 0;

        while start < total_chars {
            let end = (start + max_chars).min(total_chars);
            let window: String = chars[start..end].iter().collect();

            let piece = if end < total_chars {
                trim_to_sentence_boundary(&window)
            } else {
                window.as_str()
            };
            let content = piece.trim();

            if !content.is_empty() {
                let index = documents.len();
                documents.push(Document {
                    id: format!("{source}#{index}"),
                    content: content.to_string(),
                    source: source.to_string(),
                    metadata: Some(json!({
                        "source": source,
                        "start_offset": start,
                        "chunk_index": index,
                    })),
                    embedding: None,
                });
            }

            start += step;
        }

        documents
    }
}

/// Cut the chunk at the last sentence ending, as long as that keeps at
/// least 60% of it. Falls back to the full window.
fn trim_to_sentence_boundary(text: &str) -> &str {
    const ENDINGS: [&str; 6] = [". ", "! ", "? ", ".\n", "!\n", "?\n"];

    let floor = text.len() * 3 / 5;
    let mut cut = None;

    for ending in ENDINGS {
        if let Some(pos) = text.rfind(ending) {
            let candidate = pos + ending.len();
            if candidate >= floor {
                cut = Some(cut.map_or(candidate, |best: usize| best.max(candidate)));
            }
        }
    }

    match cut {
        Some(candidate) => &text[..candidate],
        None => text,
    }
}
