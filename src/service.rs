//! Note operations as seen by the HTTP layer: persistence first, calendar
//! reconciliation second, with mutations of a single note serialised.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, FixedOffset, Local};
use log::{debug, info};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{
    fallback_categories, CalendarReconciler, EnrichedNote, Note, NotePatch, NoteStorage,
    NotesError, Result,
};

/// Fields accepted when creating a note.
#[derive(Debug, Clone, Default)]
pub struct CreateNote {
    pub content: String,
    pub color: Option<String>,
    pub link: Option<String>,
    /// Explicit category; derived from the content when absent
    pub category: Option<String>,
    /// IANA zone for the calendar event; the configured default otherwise
    pub time_zone: Option<String>,
}

/// Fields accepted when editing a note. `None` leaves a field unchanged and
/// an empty link clears it.
#[derive(Debug, Clone, Default)]
pub struct EditNote {
    pub content: Option<String>,
    pub color: Option<String>,
    pub link: Option<String>,
    pub category: Option<String>,
    pub time_zone: Option<String>,
}

/// Filters for listing notes.
#[derive(Debug, Clone, Default)]
pub struct ListNotes {
    pub category: Option<String>,
    pub query: Option<String>,
    /// Attach advisory calendar matches to unlinked notes
    pub enrich: bool,
}

/// What happened when a note was created.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(Note),
    /// Saved, but linked to an event that already existed
    Duplicate(Note),
}

impl CreateOutcome {
    pub fn note(&self) -> &Note {
        match self {
            CreateOutcome::Created(note) | CreateOutcome::Duplicate(note) => note,
        }
    }

    pub fn into_note(self) -> Note {
        match self {
            CreateOutcome::Created(note) | CreateOutcome::Duplicate(note) => note,
        }
    }
}

/// One async mutex per note id, kept only while someone holds or awaits it.
#[derive(Default)]
struct NoteLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl NoteLocks {
    async fn acquire(&self, note_id: &str) -> Result<NoteLock<'_>> {
        let handle = {
            let mut locks = self
                .inner
                .lock()
                .map_err(|_| NotesError::LockAcquisitionFailed {
                    message: "Failed to acquire note lock table".to_string(),
                })?;
            locks.entry(note_id.to_string()).or_default().clone()
        };
        let guard = handle.clone().lock_owned().await;
        Ok(NoteLock {
            table: self,
            note_id: note_id.to_string(),
            handle,
            _guard: guard,
        })
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

/// Exclusive access to one note id for the lifetime of the value.
struct NoteLock<'a> {
    table: &'a NoteLocks,
    note_id: String,
    handle: Arc<AsyncMutex<()>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for NoteLock<'_> {
    fn drop(&mut self) {
        let Ok(mut locks) = self.table.inner.lock() else {
            return;
        };
        // table entry, this handle and the held guard: nobody else is waiting
        let idle = locks
            .get(&self.note_id)
            .is_some_and(|h| Arc::ptr_eq(h, &self.handle) && Arc::strong_count(h) == 3);
        if idle {
            locks.remove(&self.note_id);
        }
    }
}

pub struct NoteService {
    storage: NoteStorage,
    reconciler: CalendarReconciler,
    locks: NoteLocks,
    default_time_zone: String,
}

impl NoteService {
    pub fn new(
        storage: NoteStorage,
        reconciler: CalendarReconciler,
        default_time_zone: impl Into<String>,
    ) -> Self {
        NoteService {
            storage,
            reconciler,
            locks: NoteLocks::default(),
            default_time_zone: default_time_zone.into(),
        }
    }

    pub fn storage(&self) -> &NoteStorage {
        &self.storage
    }

    pub fn reconciler(&self) -> &CalendarReconciler {
        &self.reconciler
    }

    fn reference_time(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }

    fn time_zone(&self, requested: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|tz| !tz.is_empty())
            .unwrap_or(&self.default_time_zone)
            .to_string()
    }

    /// Stores a new note and links it to a calendar event when its content
    /// names a date or time.
    ///
    /// # Returns
    ///
    /// [`CreateOutcome::Duplicate`] when an equivalent event already existed;
    /// the note is saved and linked either way.
    pub async fn create(&self, request: CreateNote) -> Result<CreateOutcome> {
        if request.content.trim().is_empty() {
            return Err(NotesError::validation("content is required"));
        }

        let mut note = Note::new(request.content, request.color, request.link);
        note.category = request
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| fallback_categories(&note.content));

        let _guard = self.locks.acquire(&note.id).await?;
        let note = self.storage.create_note(note)?;

        let time_zone = self.time_zone(request.time_zone.as_deref());
        let outcome = self
            .reconciler
            .reconcile_new(&note, self.reference_time(), &time_zone)
            .await;

        let Some(patch) = outcome.to_patch() else {
            return Ok(CreateOutcome::Created(note));
        };
        let linked = self.storage.update_note(&note.id, &patch)?;
        if outcome.is_duplicate() {
            info!(
                "Note {} linked to existing event {:?}",
                linked.id, linked.calendar_event_id
            );
            Ok(CreateOutcome::Duplicate(linked))
        } else {
            Ok(CreateOutcome::Created(linked))
        }
    }

    /// Applies an edit and re-syncs the linked event, if any
    pub async fn update(&self, note_id: &str, request: EditNote) -> Result<Note> {
        if let Some(content) = &request.content {
            if content.trim().is_empty() {
                return Err(NotesError::validation("content must not be empty"));
            }
        }

        let patch = NotePatch {
            content: request.content,
            color: request.color,
            link: request.link.map(Some),
            category: request.category,
            ..Default::default()
        };

        let _guard = self.locks.acquire(note_id).await?;
        let note = if patch.is_empty() {
            self.storage.get_note(note_id)?
        } else {
            self.storage.update_note(note_id, &patch)?
        };

        if !note.is_linked() {
            return Ok(note);
        }

        let time_zone = self.time_zone(request.time_zone.as_deref());
        let outcome = self
            .reconciler
            .reconcile_edit(&note, self.reference_time(), &time_zone)
            .await;
        // only a changed link is written back
        match outcome.to_patch() {
            Some(link) => self.storage.update_note(note_id, &link),
            None => Ok(note),
        }
    }

    /// Deletes the note locally, then removes its event best-effort
    pub async fn delete(&self, note_id: &str) -> Result<Note> {
        let _guard = self.locks.acquire(note_id).await?;
        let note = self.storage.delete_note(note_id)?;

        if !self.reconciler.release(&note).await {
            debug!("Remote event of deleted note {} may remain", note_id);
        }

        Ok(note)
    }

    pub fn get(&self, note_id: &str) -> Result<Note> {
        self.storage.get_note(note_id)
    }

    /// Lists notes newest first, optionally filtered and enriched
    pub async fn list(&self, filter: ListNotes) -> Result<Vec<EnrichedNote>> {
        let query = filter
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty());
        let mut notes = match query {
            Some(q) => self.storage.search_notes(q)?,
            None => self.storage.list_notes()?,
        };

        if let Some(category) = filter.category.as_deref().map(str::trim) {
            if !category.is_empty() {
                let wanted = category.to_lowercase();
                notes.retain(|n| n.category.to_lowercase() == wanted);
            }
        }

        if filter.enrich {
            Ok(self.reconciler.enrich(notes).await)
        } else {
            Ok(notes.into_iter().map(EnrichedNote::from).collect())
        }
    }
}
