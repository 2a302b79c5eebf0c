//! Core data structures for the calnotes application.
//!
//! This module contains the note record persisted by the store and the
//! shallow patch applied to it on updates.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{next_update_timestamp, normalize_link, NotesError, Result};

/// Color assigned to notes created without one.
pub const DEFAULT_COLOR: &str = "#ffffff";

/// Category assigned when nothing more specific applies.
pub const DEFAULT_CATEGORY: &str = "General";

/// Represents a single note in our system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier for the note
    pub id: String,
    /// Free text content of the note
    pub content: String,
    /// UI color hint (hex)
    pub color: String,
    /// Optional user supplied URL
    pub link: Option<String>,
    /// Short label such as "Work" or "Shopping"
    pub category: String,
    /// Remote calendar event linked to this note
    pub calendar_event_id: Option<String>,
    /// Browser URL of the linked calendar event
    pub calendar_event_url: Option<String>,
    /// Set when creation linked to an event that already existed
    #[serde(default)]
    pub is_duplicate: bool,
    /// When the note was created
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Creates a new note with a fresh id and default color/category
    pub fn new(content: String, color: Option<String>, link: Option<String>) -> Self {
        let now = Utc::now();

        Note {
            id: Uuid::new_v4().to_string(),
            content,
            color: color
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_COLOR.to_string()),
            link: normalize_link(link),
            category: DEFAULT_CATEGORY.to_string(),
            calendar_event_id: None,
            calendar_event_url: None,
            is_duplicate: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks the fields every stored note must satisfy
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(NotesError::validation("note id must not be empty"));
        }
        if self.content.trim().is_empty() {
            return Err(NotesError::validation("content is required"));
        }
        Ok(())
    }

    pub fn is_linked(&self) -> bool {
        self.calendar_event_id.is_some()
    }
}

/// A shallow set of field changes merged over an existing note.
///
/// `None` leaves a field untouched. The nested options on nullable fields
/// distinguish "leave alone" (`None`) from "clear" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotePatch {
    pub content: Option<String>,
    pub color: Option<String>,
    pub link: Option<Option<String>>,
    pub category: Option<String>,
    pub calendar_event_id: Option<Option<String>>,
    pub calendar_event_url: Option<Option<String>>,
    pub is_duplicate: Option<bool>,
}

impl NotePatch {
    /// Patch that only replaces the content
    pub fn content(content: impl Into<String>) -> Self {
        NotePatch {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Patch that records a linked calendar event
    pub fn calendar_link(event_id: String, event_url: Option<String>, duplicate: bool) -> Self {
        NotePatch {
            calendar_event_id: Some(Some(event_id)),
            calendar_event_url: Some(event_url),
            is_duplicate: Some(duplicate),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == NotePatch::default()
    }

    /// Returns a copy of `note` with this patch merged in and `updated_at` bumped
    pub fn merged_into(&self, note: &Note) -> Note {
        let mut merged = note.clone();

        if let Some(content) = &self.content {
            merged.content = content.clone();
        }
        if let Some(color) = &self.color {
            merged.color = color.clone();
        }
        if let Some(link) = &self.link {
            merged.link = normalize_link(link.clone());
        }
        if let Some(category) = &self.category {
            merged.category = category.clone();
        }
        if let Some(event_id) = &self.calendar_event_id {
            merged.calendar_event_id = event_id.clone();
        }
        if let Some(event_url) = &self.calendar_event_url {
            merged.calendar_event_url = event_url.clone();
        }
        if let Some(duplicate) = self.is_duplicate {
            merged.is_duplicate = duplicate;
        }

        merged.updated_at = next_update_timestamp(note.updated_at);
        merged
    }
}
