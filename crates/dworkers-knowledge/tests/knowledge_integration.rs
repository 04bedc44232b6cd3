#![allow(clippy::unwrap_used, clippy::expect_used)]

use dworkers_knowledge::*;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// 1. Index, search, format
// ---------------------------------------------------------------------------

#[test]
fn long_document_is_searchable_across_chunks() {
    let repo = KnowledgeRepository::new();
    let text = format!(
        "{} Loyalty members churn less. {}",
        "x".repeat(40),
        "y".repeat(40)
    );
    let ids = DocumentIndexer::new(30, 10).unwrap().index_text(
        &repo,
        "upload://loyalty.txt",
        &text,
        &serde_json::Map::new(),
    );
    assert!(ids.len() > 1);
    assert_eq!(repo.list_sources(), vec!["upload://loyalty.txt"]);

    let hits = repo.search("loyalty", 10);
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|c| c.source == "upload://loyalty.txt"));

    let context = repo.context_string("loyalty", 1);
    assert!(context.starts_with("### upload://loyalty.txt\n"));
    assert!(!context.contains("---"));
}

#[test]
fn reindexing_a_source_overwrites_its_chunks() {
    let repo = KnowledgeRepository::new();
    let indexer = DocumentIndexer::default();
    let metadata = serde_json::Map::new();
    indexer.index_text(&repo, "memo", "first draft", &metadata);
    indexer.index_text(&repo, "memo", "final version", &metadata);
    assert_eq!(repo.len(), 1);
    assert!(repo.search("draft", 5).is_empty());
    assert_eq!(repo.search("final", 5).len(), 1);
}

// ---------------------------------------------------------------------------
// 2. Concurrent tenants
// ---------------------------------------------------------------------------

#[test]
fn concurrent_indexing_into_one_tenant() {
    let registry = Arc::new(KnowledgeRegistry::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                DocumentIndexer::default().index_text(
                    &registry.repository("acme"),
                    &format!("doc-{i}"),
                    "shared market notes",
                    &serde_json::Map::new(),
                );
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let repo = registry.repository("acme");
    assert_eq!(repo.len(), 8);
    assert_eq!(repo.list_sources().len(), 8);
    assert_eq!(repo.search("MARKET", 3).len(), 3);
}
