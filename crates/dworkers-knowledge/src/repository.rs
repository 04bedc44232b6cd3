use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A piece of an indexed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// `<source>:<index>` for chunks produced by the indexer.
    pub chunk_id: String,
    /// Where the document came from, e.g. `upload://report.pdf`.
    pub source: String,
    /// Chunk text.
    pub content: String,
    /// Free-form metadata copied from the indexing request.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// In-memory chunk store with keyword search.
///
/// Chunks keep their indexing order; indexing an existing `chunk_id`
/// replaces that chunk in place.
pub struct KnowledgeRepository {
    chunks: RwLock<Vec<DocumentChunk>>,
}

impl KnowledgeRepository {
    /// An empty repository.
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Store `chunk`, replacing any chunk with the same id.
    pub fn index(&self, chunk: DocumentChunk) {
        let mut chunks = self.chunks.write();
        match chunks.iter_mut().find(|c| c.chunk_id == chunk.chunk_id) {
            Some(existing) => *existing = chunk,
            None => chunks.push(chunk),
        }
    }

    /// Look up one chunk.
    pub fn get(&self, chunk_id: &str) -> Option<DocumentChunk> {
        self.chunks
            .read()
            .iter()
            .find(|c| c.chunk_id == chunk_id)
            .cloned()
    }

    /// Chunks whose content contains `query`, ignoring case, in indexing
    /// order and capped at `max_results`.
    pub fn search(&self, query: &str, max_results: usize) -> Vec<DocumentChunk> {
        let query = query.to_lowercase();
        self.chunks
            .read()
            .iter()
            .filter(|c| c.content.to_lowercase().contains(&query))
            .take(max_results)
            .cloned()
            .collect()
    }

    /// Every chunk from `source`, in indexing order.
    pub fn by_source(&self, source: &str) -> Vec<DocumentChunk> {
        self.chunks
            .read()
            .iter()
            .filter(|c| c.source == source)
            .cloned()
            .collect()
    }

    /// Distinct sources, sorted.
    pub fn list_sources(&self) -> Vec<String> {
        self.chunks
            .read()
            .iter()
            .map(|c| c.source.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Search results formatted for a prompt: one `### <source>` section
    /// per chunk, separated by `---`. Empty when nothing matches.
    pub fn context_string(&self, query: &str, max_results: usize) -> String {
        self.search(query, max_results)
            .iter()
            .map(|c| format!("### {}\n{}", c.source, c.content))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    /// `true` when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }

    /// Drop every chunk.
    pub fn clear(&self) {
        self.chunks.write().clear();
    }
}

impl Default for KnowledgeRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn chunk(id: &str, source: &str, content: &str) -> DocumentChunk {
        DocumentChunk {
            chunk_id: id.into(),
            source: source.into(),
            content: content.into(),
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_search_is_case_insensitive_and_capped() {
        let repo = KnowledgeRepository::new();
        repo.index(chunk("a:0", "a", "Churn rose in Q3"));
        repo.index(chunk("b:0", "b", "churn fell in Q4"));
        repo.index(chunk("c:0", "c", "Pricing unchanged"));

        let hits = repo.search("CHURN", 10);
        assert_eq!(
            hits.iter().map(|c| c.chunk_id.as_str()).collect::<Vec<_>>(),
            vec!["a:0", "b:0"]
        );
        assert_eq!(repo.search("churn", 1).len(), 1);
        assert!(repo.search("margin", 10).is_empty());
    }

    #[test]
    fn test_reindex_replaces_in_place() {
        let repo = KnowledgeRepository::new();
        repo.index(chunk("a:0", "a", "old"));
        repo.index(chunk("b:0", "b", "other"));
        repo.index(chunk("a:0", "a", "new"));
        assert_eq!(repo.len(), 2);
        assert_eq!(repo.get("a:0").unwrap().content, "new");
        assert_eq!(repo.search("", 10)[0].chunk_id, "a:0");
    }

    #[test]
    fn test_sources_and_context() {
        let repo = KnowledgeRepository::new();
        repo.index(chunk("z:0", "z-report", "Revenue grew"));
        repo.index(chunk("a:0", "a-memo", "Revenue flat"));
        repo.index(chunk("a:1", "a-memo", "Costs down"));

        assert_eq!(repo.list_sources(), vec!["a-memo", "z-report"]);
        assert_eq!(repo.by_source("a-memo").len(), 2);
        assert_eq!(
            repo.context_string("revenue", 5),
            "### z-report\nRevenue grew\n\n---\n\n### a-memo\nRevenue flat"
        );
        assert_eq!(repo.context_string("headcount", 5), "");

        repo.clear();
        assert!(repo.is_empty());
    }
}
