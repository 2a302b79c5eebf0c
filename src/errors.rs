//! Error types for the calnotes application.
//!
//! This module defines the error taxonomy shared by the note store, the
//! calendar reconciler, the LLM adapters and the HTTP layer.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::LlmError;

/// The main error type for the calnotes application.
#[derive(Error, Debug)]
pub enum NotesError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Note was not found when performing an operation.
    #[error("Note not found: {id}")]
    NoteNotFound { id: String },

    /// Note with the same ID already exists.
    #[error("Note already exists: {id}")]
    NoteAlreadyExists { id: String },

    /// A required field is missing or malformed.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// A calendar, OAuth or LLM provider call failed.
    #[error("{service} error: {message}")]
    ExternalService { service: String, message: String },

    /// Missing or invalid credentials/settings for an integration.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Invalid note file format or content.
    #[error("Invalid note format: {message}")]
    InvalidFormat { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// for mutex lock acquisition issues
    #[error("{message}")]
    LockAcquisitionFailed { message: String },
}

impl NotesError {
    pub fn validation(message: impl Into<String>) -> Self {
        NotesError::Validation {
            message: message.into(),
        }
    }

    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        NotesError::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        NotesError::Configuration {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for NotesError {
    fn from(err: reqwest::Error) -> Self {
        let service = err
            .url()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "http".to_string());
        NotesError::ExternalService {
            service,
            message: err.to_string(),
        }
    }
}

impl From<LlmError> for NotesError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::NotConfigured => NotesError::configuration(err.to_string()),
            other => NotesError::external("llm", other.to_string()),
        }
    }
}
