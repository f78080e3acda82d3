//! Core subsystems: provider adapters, router, search, RAG pipeline,
//! verification engine, tool registry, and the seed verifier.

pub mod providers;
pub mod rag;
pub mod router;
pub mod search;
pub mod tools;
pub mod types;
pub mod verification;
pub mod verifier;
