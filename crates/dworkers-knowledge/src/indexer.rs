use crate::repository::{DocumentChunk, KnowledgeRepository};
use dworkers_core::{DworkersError, DworkersResult};
use tracing::info;

/// Default characters per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default characters shared by consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Splits text into overlapping character windows and indexes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentIndexer {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl DocumentIndexer {
    /// Fails with a config error unless `0 <= chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> DworkersResult<Self> {
        if chunk_size == 0 {
            return Err(DworkersError::Config("chunk_size must be at least 1".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(DworkersError::Config(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split `text` and store each piece as `<source>:<n>`. Returns the
    /// chunk ids in order.
    pub fn index_text(
        &self,
        repository: &KnowledgeRepository,
        source: &str,
        text: &str,
        metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> Vec<String> {
        let ids: Vec<String> = self
            .split(text)
            .into_iter()
            .enumerate()
            .map(|(i, content)| {
                let chunk_id = format!("{source}:{i}");
                repository.index(DocumentChunk {
                    chunk_id: chunk_id.clone(),
                    source: source.to_string(),
                    content,
                    metadata: metadata.clone(),
                });
                chunk_id
            })
            .collect();
        info!(source = %source, chunks = ids.len(), "Document indexed");
        ids
    }

    /// Character windows of `chunk_size`, each starting `chunk_size -
    /// chunk_overlap` after the previous one. Text that fits in one window,
    /// the empty string included, is a single chunk.
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= self.chunk_size {
            return vec![text.to_string()];
        }
        let step = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            chunks.push(chars[start..end].iter().collect());
            start += step;
        }
        chunks
    }
}

impl Default for DocumentIndexer {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        let indexer = DocumentIndexer::default();
        assert_eq!(indexer.split("brief"), vec!["brief"]);
        assert_eq!(indexer.split(""), vec![""]);
    }

    #[test]
    fn test_overlapping_windows() {
        let indexer = DocumentIndexer::new(4, 1).unwrap();
        assert_eq!(indexer.split("abcdefghij"), vec!["abcd", "defg", "ghij", "j"]);
    }

    #[test]
    fn test_split_counts_characters_not_bytes() {
        let indexer = DocumentIndexer::new(2, 0).unwrap();
        assert_eq!(indexer.split("ñañú"), vec!["ña", "ñú"]);
    }

    #[test]
    fn test_invalid_settings() {
        assert!(DocumentIndexer::new(0, 0).is_err());
        assert!(DocumentIndexer::new(10, 10).is_err());
        assert!(DocumentIndexer::new(10, 9).is_ok());
    }

    #[test]
    fn test_index_text_ids() {
        let repo = KnowledgeRepository::new();
        let mut metadata = serde_json::Map::new();
        metadata.insert("kind".into(), "memo".into());
        let ids = DocumentIndexer::new(5, 0)
            .unwrap()
            .index_text(&repo, "upload://memo", "0123456789", &metadata);
        assert_eq!(ids, vec!["upload://memo:0", "upload://memo:1"]);
        assert_eq!(repo.get("upload://memo:1").unwrap().content, "56789");
        assert_eq!(repo.get("upload://memo:0").unwrap().metadata["kind"], "memo");
    }
}
