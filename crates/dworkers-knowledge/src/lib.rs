//! Document knowledge for dworkers.
//!
//! Raw text is split into overlapping chunks by a [`DocumentIndexer`] and
//! stored in a [`KnowledgeRepository`], one per tenant, reachable through a
//! [`KnowledgeRegistry`]. Search is case-insensitive substring matching.

/// Text chunking.
pub mod indexer;
/// Per-tenant repositories.
pub mod registry;
/// Chunk storage and search.
pub mod repository;

pub use indexer::DocumentIndexer;
pub use registry::KnowledgeRegistry;
pub use repository::{DocumentChunk, KnowledgeRepository};
