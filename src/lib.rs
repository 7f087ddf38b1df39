//! # groundqa — Grounded QA Test Generation
//!
//! Indexes free-form requirement documents and a target HTML page into a local
//! vector knowledge base, then generates structured, traceable test cases via
//! retrieval-augmented generation and compiles them into Selenium scripts.
//!
//! Every generated test case passes a grounding gate before it is returned:
//! each step must target an element that was actually discovered on the page,
//! and each citation must point at a source fragment that was actually
//! retrieved for the request. Script synthesis is a deterministic compile from
//! the validated schema — no model in the loop.
//!
//! ## Architecture
//!
//! - **[`config`]** — Configuration loading, validation, and defaults
//! - **[`db`]** — SQLite + sqlite-vec knowledge base (documents, chunks, selectors, search)
//! - **[`embedder`]** — Embedding adapter (remote HTTP service or deterministic mock)
//! - **[`indexer`]** — Text extraction, overlapping chunker, selector extraction, ingestion
//! - **[`llm`]** — Chat-completion client (Groq/OpenAI-compatible or scripted mock)
//! - **[`retriever`]** — Query embedding + top-K search over the knowledge base
//! - **[`testcase`]** — Test-case schema shared by the generator and synthesizer
//! - **[`generator`]** — Grounded test-case generation with the validation gate
//! - **[`synthesizer`]** — Deterministic TestCase → Selenium script compiler

pub mod config;
pub mod db;
pub mod embedder;
pub mod generator;
pub mod indexer;
pub mod llm;
pub mod retriever;
pub mod synthesizer;
pub mod testcase;
