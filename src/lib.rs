//! Note-taking service library
//!
//! This library stores short text notes, links notes that mention a date or
//! time to Google Calendar events, and offers LLM-backed writing helpers with
//! a deterministic rule-based fallback.

mod api;
mod assistant;
mod calendar;
mod cli;
mod config;
mod datetime;
mod errors;
mod fallback;
mod helper;
mod llm;
mod note;
mod oauth;
mod service;
mod storage;
mod tokens;
mod types;

// Re-export key components
pub use api::*;
pub use assistant::*;
pub use calendar::*;
pub use cli::*;
pub use config::*;
pub use datetime::*;
pub use errors::*;
pub use fallback::*;
pub use helper::*;
pub use llm::*;
pub use note::*;
pub use oauth::*;
pub use service::*;
pub use storage::*;
pub use tokens::*;
pub use types::*;
