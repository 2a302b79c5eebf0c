//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use tempfile::TempDir;

use calnotes::{
    create_router, AppState, Assistant, CalendarProvider, CalendarReconciler, DuplicatePolicy,
    EventChanges, NewEvent, NoteService, NoteStorage, NotesError, RemoteEvent, Result,
};

/// In-memory calendar that records what the reconciler asked for.
pub struct RecordingCalendar {
    pub authorized: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub events: Mutex<Vec<RemoteEvent>>,
    pub inserted: Mutex<Vec<NewEvent>>,
    pub deletes: AtomicUsize,
}

impl RecordingCalendar {
    pub fn new(authorized: bool) -> Arc<Self> {
        Arc::new(RecordingCalendar {
            authorized: AtomicBool::new(authorized),
            fail_deletes: AtomicBool::new(false),
            events: Mutex::new(Vec::new()),
            inserted: Mutex::new(Vec::new()),
            deletes: AtomicUsize::new(0),
        })
    }

    pub fn insert_count(&self) -> usize {
        self.inserted.lock().unwrap().len()
    }
}

#[async_trait]
impl CalendarProvider for RecordingCalendar {
    fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    async fn search_events(
        &self,
        query: &str,
        time_min: DateTime<FixedOffset>,
        time_max: DateTime<FixedOffset>,
        max_results: usize,
    ) -> Result<Vec<RemoteEvent>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.summary.contains(query))
            .filter(|e| e.start.is_some_and(|s| s >= time_min && s <= time_max))
            .take(max_results)
            .cloned()
            .collect())
    }

    async fn list_upcoming(&self, max_results: usize) -> Result<Vec<RemoteEvent>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .take(max_results)
            .cloned()
            .collect())
    }

    async fn insert_event(&self, event: &NewEvent) -> Result<RemoteEvent> {
        let mut inserted = self.inserted.lock().unwrap();
        inserted.push(event.clone());
        let id = format!("evt{}", inserted.len());
        let remote = RemoteEvent {
            html_link: Some(format!("https://calendar.google.com/event?eid={}", id)),
            id,
            summary: event.summary.clone(),
            start: Some(event.timing.start),
        };
        self.events.lock().unwrap().push(remote.clone());
        Ok(remote)
    }

    async fn patch_event(&self, event_id: &str, changes: &EventChanges) -> Result<RemoteEvent> {
        let mut events = self.events.lock().unwrap();
        let event = events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| NotesError::external("calendar", "not found"))?;
        if let Some(summary) = &changes.summary {
            event.summary = summary.clone();
        }
        Ok(event.clone())
    }

    async fn delete_event(&self, event_id: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(NotesError::external("calendar", "backend error"));
        }
        self.events.lock().unwrap().retain(|e| e.id != event_id);
        Ok(())
    }
}

/// Router over a temp-dir store, the given calendar and no LLM backend.
pub fn router_with(calendar: Option<Arc<RecordingCalendar>>) -> (axum::Router, TempDir) {
    let (state, tmp) = state_with(calendar);
    (create_router(state), tmp)
}

/// Application state behind [`router_with`], for tests that adjust it.
pub fn state_with(calendar: Option<Arc<RecordingCalendar>>) -> (AppState, TempDir) {
    let tmp = TempDir::new().expect("tempdir");
    let mut storage = NoteStorage::new(tmp.path().join("notes"));
    storage.initialize().expect("storage init");

    let provider = calendar.map(|c| c as Arc<dyn CalendarProvider>);
    let reconciler = CalendarReconciler::new(provider, DuplicatePolicy::default(), 15);
    let state = AppState {
        notes: Arc::new(NoteService::new(storage, reconciler, "UTC")),
        assistant: Arc::new(Assistant::default()),
        auth: None,
    };
    (state, tmp)
}

pub fn json_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    match body {
        Some(val) => builder.body(Body::from(val.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
}
