//! # Seedforge
//!
//! A retrieval-augmented reasoning front-end. Seedforge turns an ambiguous
//! user query into a fact-grounded "thinking seed" suitable for downstream
//! planning, in three coupled subsystems:
//!
//! - **LLM router**: selects a healthy provider among several vendors,
//!   dispatches chat completions, tracks health and cost, and falls back
//!   intelligently on failure.
//! - **RAG seed generator**: a plan -> search -> synthesize pipeline with
//!   parallel search fan-out, URL deduplication, and temporal correction of
//!   generated queries.
//! - **Seed verifier**: plans multi-dimensional verification searches,
//!   executes them, scores idea feasibility through LLM-driven semantic
//!   relevance judgment, and enhances the seed with retrieved facts.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use seedforge::config::SeedforgeConfig;
//! use seedforge::core::router::LlmRouter;
//! use seedforge::core::search::WebSearchClient;
//! use seedforge::core::rag::RagSeedGenerator;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SeedforgeConfig::default();
//!     let router = Arc::new(LlmRouter::initialize(&config).await);
//!     let search = Arc::new(WebSearchClient::new(config.rag.clone()));
//!     let generator = RagSeedGenerator::new(Some(router), search, config.rag);
//!
//!     let seed = generator.generate("latest Rust async runtime trends", None).await;
//!     println!("{seed}");
//! }
//! ```
//!
//! Failures never cross the public boundary as panics or errors: the router
//! returns a `ChatResponse` carrying its error payload, the generator
//! degrades to a fallback seed, and the verifier always yields a usable
//! verification context. The one documented exception is the convenience
//! [`core::router::LlmRouter::call`] wrapper, which returns `Result`.

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod config;
pub mod core;
pub mod utils;

pub use crate::config::SeedforgeConfig;
pub use crate::core::rag::RagSeedGenerator;
pub use crate::core::router::LlmRouter;
pub use crate::core::search::WebSearchClient;
pub use crate::core::types;
pub use crate::core::verifier::SeedVerifier;
