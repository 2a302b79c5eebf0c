use std::{
    fs,
    io::Write,
    path::Path,
};

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, trace};
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::{NotesError, Note, Result};

/// Helper method to load a single note from file
pub fn load_note_from_file(path: &Path) -> Result<Note> {
    debug!("Loading note from file: {}", path.display());
    let content = fs::read_to_string(path).map_err(|e| {
        error!("Failed to open note file {}: {}", path.display(), e);
        NotesError::Io(e)
    })?;

    let note: Note = serde_json::from_str(&content)?;

    // Validate note
    if note.id.is_empty() {
        let error_mgs = format!("Note from {} has an empty ID", path.display());
        error!("{}", error_mgs);
        return Err(NotesError::InvalidFormat { message: error_mgs });
    }

    trace!("Successfully loaded note: {}", note.id);
    Ok(note)
}

/// Serializes `value` to pretty JSON and atomically replaces `path` with it.
///
/// The document is written to a temporary file in the target directory and
/// renamed over the destination, so readers never observe a truncated file.
pub fn write_json_atomically<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    if !dir.exists() {
        debug!("Creating parent directory: {}", dir.display());
        fs::create_dir_all(dir).map_err(|e| {
            error!("Failed to create directory {}: {}", dir.display(), e);
            NotesError::Io(e)
        })?;
    }

    let mut temp_file = NamedTempFile::new_in(dir).map_err(|e| {
        error!("Failed to create temporary file: {}", e);
        NotesError::Io(e)
    })?;

    trace!("Serializing document for {}", path.display());
    let json = serde_json::to_string_pretty(value).map_err(|e| {
        error!("Failed to serialize document: {}", e);
        NotesError::Serialization(e)
    })?;

    temp_file.write_all(json.as_bytes()).map_err(|e| {
        error!("Failed to write to temporary file: {}", e);
        NotesError::Io(e)
    })?;
    temp_file.as_file().sync_all().map_err(|e| {
        error!("Failed to flush temporary file: {}", e);
        NotesError::Io(e)
    })?;

    debug!("Performing atomic move of temporary file to {}", path.display());
    temp_file.persist(path).map_err(|e| {
        error!("Failed to persist file {}: {}", path.display(), e.error);
        NotesError::Io(e.error)
    })?;

    Ok(())
}

/// Trims a user supplied link, mapping blank values to `None`
pub fn normalize_link(link: Option<String>) -> Option<String> {
    link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty())
}

/// Returns a modification timestamp strictly later than `previous`
pub fn next_update_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

/// Truncates `text` to at most `max_chars` characters on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[test]
    fn timestamps_strictly_increase() {
        let future = Utc::now() + Duration::seconds(30);
        assert!(next_update_timestamp(future) > future);
    }

    #[test]
    fn atomic_write_replaces_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("doc.json");

        write_json_atomically(&path, &vec![1, 2, 3]).unwrap();
        write_json_atomically(&path, &vec![4]).unwrap();

        let back: Vec<i32> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, vec![4]);
    }
}
