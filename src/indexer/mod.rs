//! Ingestion pipeline: text extraction, chunking, selector extraction, and
//! the end-to-end indexer that feeds the knowledge base.

pub mod chunker;
pub mod core;
pub mod extract;
pub mod selectors;
