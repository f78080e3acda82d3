//! Shared data model: chat messages and responses, the error taxonomy,
//! search and synthesis records, and seed verification contexts.

pub mod chat;
pub mod errors;
pub mod search;
pub mod seed;

pub use chat::{ChatError, ChatMessage, ChatResponse, CompletionOptions, Role, Usage};
pub use errors::{ErrorKind, ProviderError, RouterError, SearchError};
pub use search::{
    SearchDepth, SearchResult, SearchResponse, SearchStrategy, Synthesis, VerificationStatus,
};
pub use seed::{
    IdeaVerificationReport, Priority, SearchDimension, SeedVerificationContext, SourceRef,
    ThinkingSeedContext,
};
