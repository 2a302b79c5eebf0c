use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use fuzzy_matcher::{skim::SkimMatcherV2, FuzzyMatcher};
use log::{debug, error, info, trace, warn};
use walkdir::WalkDir;

use crate::{load_note_from_file, write_json_atomically, Note, NotePatch, NotesError, Result};

/// Manages the storage and retrieval of notes.
///
/// Every note lives in its own JSON file; an in-memory cache mirrors the
/// files and is only changed after the corresponding write has succeeded.
#[derive(Clone)]
pub struct NoteStorage {
    /// Directory holding the note files
    notes_dir: PathBuf,

    /// In-memory cache of notes, indexed by note ID
    notes_cache: Arc<Mutex<HashMap<String, Note>>>,

    /// Flag indicating if the storage system is ready
    initialized: bool,
}

impl NoteStorage {
    /// Creates a new NoteStorage rooted at `notes_dir`.
    ///
    /// Nothing is read from disk until [`NoteStorage::initialize`] is called.
    pub fn new(notes_dir: impl Into<PathBuf>) -> Self {
        Self {
            notes_dir: notes_dir.into(),
            notes_cache: Arc::new(Mutex::new(HashMap::new())),
            initialized: false,
        }
    }

    /// Ensures the notes directory exists and loads existing notes
    ///
    /// # Returns
    ///
    /// The number of notes loaded in case of success or an error
    pub fn initialize(&mut self) -> Result<usize> {
        if self.initialized {
            return Ok(self.len());
        }

        info!(
            "Initializing NoteStorage with notes_dir={}",
            self.notes_dir.display()
        );

        if !self.notes_dir.exists() {
            debug!(
                "Notes directory does not exist, creating: {}",
                self.notes_dir.display()
            );
            fs::create_dir_all(&self.notes_dir).map_err(|e| {
                error!("Failed to create notes directory: {}", e);
                NotesError::DirectoryError {
                    path: self.notes_dir.clone(),
                }
            })?;
        }

        let loaded = self.load_notes()?;
        self.initialized = true;
        info!("NoteStorage initialization complete ({} notes)", loaded);
        Ok(loaded)
    }

    /// Loads all notes from disk into the in-memory cache
    ///
    /// Files that fail to parse are logged and skipped.
    pub fn load_notes(&self) -> Result<usize> {
        let mut notes_buffer = HashMap::new();
        let mut load_errors = 0usize;

        for entry in WalkDir::new(&self.notes_dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();

            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                match load_note_from_file(path) {
                    Ok(note) => {
                        notes_buffer.insert(note.id.clone(), note);
                    }
                    Err(e) => {
                        warn!("Failed to load note from {}: {}", path.display(), e);
                        load_errors += 1;
                    }
                }
            }
        }

        if load_errors > 0 {
            error!("Encountered {} errors while loading notes", load_errors);
        }

        let notes_count = notes_buffer.len();
        let mut cache = self.lock_cache()?;
        cache.clear();
        cache.extend(notes_buffer);
        info!("Loaded {} notes into cache", notes_count);

        Ok(notes_count)
    }

    /// Stores a brand new note
    ///
    /// # Arguments
    ///
    /// * `note` - The note to create; its id must not exist yet
    ///
    /// # Returns
    ///
    /// The stored note or an error (validation, duplicate id, I/O)
    pub fn create_note(&self, note: Note) -> Result<Note> {
        info!("Creating note: {}", note.id);
        note.validate()?;

        if self.lock_cache()?.contains_key(&note.id) {
            error!("Cannot create note {}: id already exists", note.id);
            return Err(NotesError::NoteAlreadyExists { id: note.id });
        }

        self.save_note(&note)?;
        Ok(note)
    }

    /// Retrieves a note by its ID
    pub fn get_note(&self, note_id: &str) -> Result<Note> {
        debug!("Retrieving note by ID: {}", note_id);

        if let Some(note) = self.lock_cache()?.get(note_id) {
            trace!("Note found in cache: {}", note_id);
            return Ok(note.clone());
        }

        debug!("Note not found: {}", note_id);
        Err(NotesError::NoteNotFound {
            id: note_id.to_string(),
        })
    }

    /// Returns every stored note, newest first
    pub fn list_notes(&self) -> Result<Vec<Note>> {
        let mut notes = self.snapshot()?;
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notes)
    }

    /// Retrieves all notes with a specific category (case-insensitive)
    pub fn get_notes_by_category(&self, category: &str) -> Result<Vec<Note>> {
        info!("Retrieving notes by category: {}", category);
        let wanted = category.trim().to_lowercase();

        let matching: Vec<Note> = self
            .list_notes()?
            .into_iter()
            .filter(|note| note.category.trim().to_lowercase() == wanted)
            .collect();

        info!("Found {} notes in category: {}", matching.len(), category);
        Ok(matching)
    }

    /// Searches note content and category using fuzzy matching
    /// Returns notes sorted by relevance score
    pub fn search_notes(&self, query: &str) -> Result<Vec<Note>> {
        info!("Searching notes with query: '{}'", query);
        let matcher = SkimMatcherV2::default();

        let mut scored: Vec<(i64, Note)> = self
            .snapshot()?
            .into_iter()
            .filter_map(|note| {
                let content_score = matcher.fuzzy_match(&note.content, query);
                let category_score = matcher.fuzzy_match(&note.category, query);
                content_score.max(category_score).map(|score| (score, note))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        debug!("Search matched {} notes", scored.len());
        Ok(scored.into_iter().map(|(_, note)| note).collect())
    }

    /// Updates an existing note by merging `patch` over it
    ///
    /// The merged record is validated and written to disk before the cache
    /// is touched, so a failed update leaves the stored note unchanged.
    ///
    /// # Arguments
    ///
    /// * `note_id` - The ID of the note to update
    /// * `patch` - Fields to replace
    ///
    /// # Returns
    ///
    /// The updated note or an error (e.g., if the note doesn't exist)
    pub fn update_note(&self, note_id: &str, patch: &NotePatch) -> Result<Note> {
        info!("Updating note: {}", note_id);

        let original = self.get_note(note_id).map_err(|e| {
            error!("Cannot update note {}: Note not found", note_id);
            e
        })?;

        let updated = patch.merged_into(&original);
        updated.validate()?;

        self.save_note(&updated)?;
        info!("Note {} successfully updated", note_id);
        Ok(updated)
    }

    /// Deletes a note from storage
    ///
    /// # Returns
    ///
    /// The removed note or an error (e.g., if the note doesn't exist)
    pub fn delete_note(&self, note_id: &str) -> Result<Note> {
        info!("Deleting note: {}", note_id);

        let note_to_delete = self.get_note(note_id).map_err(|e| {
            error!("Cannot delete note {}: Note not found", note_id);
            e
        })?;

        let file_path = self.get_note_path(note_id);
        if file_path.exists() {
            debug!("Deleting note file: {}", file_path.display());
            fs::remove_file(&file_path).map_err(|e| {
                error!("Failed to delete note file {}: {}", file_path.display(), e);
                NotesError::Io(e)
            })?;

            if let Some(parent) = file_path.parent() {
                self.cleanup_empty_directory(parent);
            }
        } else {
            debug!("Note file doesn't exist on disk, only removing from cache");
        }

        self.lock_cache()?.remove(note_id);
        info!("Note {} successfully deleted", note_id);
        Ok(note_to_delete)
    }

    pub fn len(&self) -> usize {
        self.notes_cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the note atomically and then refreshes the cache
    fn save_note(&self, note: &Note) -> Result<()> {
        let file_path = self.get_note_path(&note.id);
        debug!("Saving note {} to {}", note.id, file_path.display());

        write_json_atomically(&file_path, note)?;

        self.lock_cache()?.insert(note.id.clone(), note.clone());
        trace!("Cache updated for note {}", note.id);
        Ok(())
    }

    /// Helper method to get the file path for a note
    fn get_note_path(&self, note_id: &str) -> PathBuf {
        // notes_dir/first_2_chars_of_id/note_id.json
        let id_prefix: String = note_id.chars().take(2).collect();

        self.notes_dir
            .join(id_prefix)
            .join(format!("{}.json", note_id))
    }

    /// Removes `dir_path` if it is an empty shard directory
    fn cleanup_empty_directory(&self, dir_path: &Path) {
        if !dir_path.exists() || dir_path == self.notes_dir {
            return;
        }

        match fs::read_dir(dir_path) {
            Ok(mut entries) => {
                if entries.next().is_none() {
                    debug!("Removing empty directory: {}", dir_path.display());
                    if let Err(e) = fs::remove_dir(dir_path) {
                        warn!(
                            "Failed to remove empty directory {}: {}",
                            dir_path.display(),
                            e
                        );
                    }
                }
            }
            Err(e) => warn!("Failed to read directory {}: {}", dir_path.display(), e),
        }
    }

    fn snapshot(&self) -> Result<Vec<Note>> {
        Ok(self.lock_cache()?.values().cloned().collect())
    }

    fn lock_cache(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Note>>> {
        self.notes_cache
            .lock()
            .map_err(|_| NotesError::LockAcquisitionFailed {
                message: "Failed to acquire lock on notes cache".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn storage() -> (NoteStorage, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut storage = NoteStorage::new(tmp.path().join("notes"));
        storage.initialize().unwrap();
        (storage, tmp)
    }

    #[test]
    fn create_then_get_round_trips() {
        let (storage, _tmp) = storage();
        let note = storage
            .create_note(Note::new("Buy milk".to_string(), None, None))
            .unwrap();

        assert_eq!(storage.get_note(&note.id).unwrap(), note);
        assert_eq!(storage.list_notes().unwrap().len(), 1);
    }

    #[test]
    fn create_rejects_blank_content() {
        let (storage, _tmp) = storage();
        let err = storage
            .create_note(Note::new("   ".to_string(), None, None))
            .unwrap_err();
        assert!(matches!(err, NotesError::Validation { .. }));
        assert!(storage.is_empty());
    }

    #[test]
    fn update_merges_and_bumps_timestamp() {
        let (storage, _tmp) = storage();
        let note = storage
            .create_note(Note::new("draft".to_string(), None, None))
            .unwrap();

        let updated = storage.update_note(&note.id, &NotePatch::content("x")).unwrap();
        assert_eq!(updated.content, "x");
        assert!(updated.updated_at > note.updated_at);
        assert_eq!(updated.created_at, note.created_at);
    }

    #[test]
    fn invalid_update_leaves_note_untouched() {
        let (storage, _tmp) = storage();
        let note = storage
            .create_note(Note::new("keep me".to_string(), None, None))
            .unwrap();

        let patch = NotePatch {
            content: Some(String::new()),
            category: Some("Work".to_string()),
            ..Default::default()
        };
        assert!(storage.update_note(&note.id, &patch).is_err());
        assert_eq!(storage.get_note(&note.id).unwrap(), note);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let (storage, _tmp) = storage();
        assert!(matches!(
            storage.update_note("missing", &NotePatch::content("x")),
            Err(NotesError::NoteNotFound { .. })
        ));
        assert!(matches!(
            storage.delete_note("missing"),
            Err(NotesError::NoteNotFound { .. })
        ));
    }

    #[test]
    fn delete_removes_file_and_shard_directory() {
        let (storage, tmp) = storage();
        let note = storage
            .create_note(Note::new("temporary".to_string(), None, None))
            .unwrap();
        let shard: String = note.id.chars().take(2).collect();
        assert!(tmp.path().join("notes").join(&shard).exists());

        storage.delete_note(&note.id).unwrap();
        assert!(matches!(
            storage.get_note(&note.id),
            Err(NotesError::NoteNotFound { .. })
        ));
        assert!(!tmp.path().join("notes").join(&shard).exists());
    }

    #[test]
    fn notes_survive_reload_and_bad_files_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let notes_dir = tmp.path().join("notes");
        let created = {
            let mut storage = NoteStorage::new(&notes_dir);
            storage.initialize().unwrap();
            storage
                .create_note(Note::new("persisted".to_string(), None, None))
                .unwrap()
        };
        fs::create_dir_all(notes_dir.join("zz")).unwrap();
        fs::write(notes_dir.join("zz").join("broken.json"), "{not json").unwrap();

        let mut reloaded = NoteStorage::new(&notes_dir);
        assert_eq!(reloaded.initialize().unwrap(), 1);
        assert_eq!(reloaded.get_note(&created.id).unwrap(), created);
    }

    #[test]
    fn category_filter_and_search() {
        let (storage, _tmp) = storage();
        let mut shopping = Note::new("Buy milk and eggs".to_string(), None, None);
        shopping.category = "Shopping".to_string();
        storage.create_note(shopping).unwrap();
        storage
            .create_note(Note::new("Quarterly report".to_string(), None, None))
            .unwrap();

        assert_eq!(storage.get_notes_by_category("shopping").unwrap().len(), 1);
        let found = storage.search_notes("report").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].content, "Quarterly report");
    }
}
