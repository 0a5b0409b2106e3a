pub mod api;
pub mod cleanup;
pub mod config;
pub mod content;
pub mod deck_service;
pub mod enrichment;
pub mod errors;
pub mod llm_providers;
pub mod logging;
pub mod models;
pub mod pdf;
pub mod pipeline;
pub mod prompt;
pub mod rate_limit;
pub mod transcription;

pub use api::{build_cors_layer, create_router, AppState};
pub use config::Config;
pub use deck_service::{DeckResult, DeckService};
pub use errors::{ApiError, ErrorContext, ErrorEnvelope};
pub use models::{Difficulty, Flashcard, GenerationOptions, SourceType};
