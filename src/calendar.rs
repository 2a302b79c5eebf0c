//! Remote calendar access and the note ↔ event reconciliation workflow.
//!
//! [`CalendarProvider`] abstracts the remote calendar; [`GoogleCalendar`]
//! implements it over the Google Calendar v3 REST API. The
//! [`CalendarReconciler`] decides whether a note creates, reuses, updates or
//! releases a remote event. Every remote failure is logged and degrades to
//! "no remote effect"; it never fails the note operation.

use std::{sync::Arc, time::Duration as StdDuration};

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use fuzzy_matcher::{skim::SkimMatcherV2, FuzzyMatcher};
use log::{debug, info, trace, warn};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{extract_span, CandidateSpan, Config, GoogleAuth, Note, NotePatch, NotesError, Result};

const SUMMARY_MAX_CHARS: usize = 100;
const ENRICH_PREFIX_CHARS: usize = 30;
const ENRICH_UPCOMING_LIMIT: usize = 50;

/// When and in which zone an event happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTiming {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    /// IANA zone name forwarded to the provider
    pub time_zone: String,
}

impl EventTiming {
    pub fn from_span(span: &CandidateSpan, time_zone: &str) -> Self {
        EventTiming {
            start: span.start,
            end: span.end_or_default(),
            time_zone: time_zone.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub summary: String,
    pub description: String,
    pub timing: EventTiming,
    /// Lead time of the single popup reminder
    pub reminder_minutes: u32,
}

/// Fields to change on an existing event; `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventChanges {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub timing: Option<EventTiming>,
}

/// An event as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    pub id: String,
    pub summary: String,
    /// Browser URL of the event
    pub html_link: Option<String>,
    pub start: Option<DateTime<FixedOffset>>,
}

/// Remote calendar operations used by the reconciler.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// True once credentials for the remote calendar exist
    fn is_authorized(&self) -> bool;

    /// Events matching `query` that start between `time_min` and `time_max`
    async fn search_events(
        &self,
        query: &str,
        time_min: DateTime<FixedOffset>,
        time_max: DateTime<FixedOffset>,
        max_results: usize,
    ) -> Result<Vec<RemoteEvent>>;

    /// Events starting from now on, soonest first
    async fn list_upcoming(&self, max_results: usize) -> Result<Vec<RemoteEvent>>;

    async fn insert_event(&self, event: &NewEvent) -> Result<RemoteEvent>;

    async fn patch_event(&self, event_id: &str, changes: &EventChanges) -> Result<RemoteEvent>;

    async fn delete_event(&self, event_id: &str) -> Result<()>;
}

// Google Calendar v3 wire types

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

impl EventDateTime {
    fn at(instant: DateTime<FixedOffset>, time_zone: &str) -> Self {
        EventDateTime {
            date_time: Some(instant.to_rfc3339()),
            date: None,
            time_zone: Some(time_zone.to_string()),
        }
    }

    fn instant(&self) -> Option<DateTime<FixedOffset>> {
        if let Some(dt) = &self.date_time {
            return DateTime::parse_from_rfc3339(dt).ok();
        }
        // all-day events only carry a date
        let date = NaiveDate::parse_from_str(self.date.as_deref()?, "%Y-%m-%d").ok()?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc().fixed_offset())
    }
}

#[derive(Serialize)]
struct ReminderOverride {
    method: &'static str,
    minutes: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Reminders {
    use_default: bool,
    overrides: Vec<ReminderOverride>,
}

#[derive(Serialize, Default)]
struct EventBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<EventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<EventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reminders: Option<Reminders>,
}

#[derive(Deserialize)]
struct EventsListResponse {
    #[serde(default)]
    items: Vec<GoogleEvent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEvent {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    html_link: Option<String>,
    start: Option<EventDateTime>,
}

impl From<GoogleEvent> for RemoteEvent {
    fn from(event: GoogleEvent) -> Self {
        RemoteEvent {
            start: event.start.as_ref().and_then(EventDateTime::instant),
            id: event.id,
            summary: event.summary.unwrap_or_default(),
            html_link: event.html_link,
        }
    }
}

/// Google Calendar v3 client authenticated through [`GoogleAuth`].
pub struct GoogleCalendar {
    client: Client,
    auth: Arc<GoogleAuth>,
    events_url: String,
}

impl GoogleCalendar {
    pub fn new(auth: Arc<GoogleAuth>, timeout: StdDuration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotesError::configuration(format!("HTTP client: {}", e)))?;
        let config = auth.config();
        let events_url = format!(
            "{}/calendars/{}/events",
            config.api_base.trim_end_matches('/'),
            config.calendar_id
        );

        Ok(GoogleCalendar {
            client,
            auth,
            events_url,
        })
    }

    async fn list(&self, params: &[(&str, String)]) -> Result<Vec<RemoteEvent>> {
        let token = self.auth.access_token().await?;
        let resp = self
            .client
            .get(&self.events_url)
            .bearer_auth(token)
            .query(params)
            .send()
            .await?;

        let body: EventsListResponse = expect_success(resp, "event list").await?.json().await?;
        Ok(body
            .items
            .into_iter()
            .filter(|e| e.status.as_deref() != Some("cancelled"))
            .map(RemoteEvent::from)
            .collect())
    }
}

async fn expect_success(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(NotesError::external(
        "google-calendar",
        format!(
            "{} failed: HTTP {}: {}",
            what,
            status,
            crate::truncate_chars(body.trim(), 200)
        ),
    ))
}

#[async_trait]
impl CalendarProvider for GoogleCalendar {
    fn is_authorized(&self) -> bool {
        self.auth.is_authorized()
    }

    async fn search_events(
        &self,
        query: &str,
        time_min: DateTime<FixedOffset>,
        time_max: DateTime<FixedOffset>,
        max_results: usize,
    ) -> Result<Vec<RemoteEvent>> {
        self.list(&[
            ("q", query.to_string()),
            ("timeMin", time_min.to_rfc3339()),
            ("timeMax", time_max.to_rfc3339()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
            ("maxResults", max_results.to_string()),
        ])
        .await
    }

    async fn list_upcoming(&self, max_results: usize) -> Result<Vec<RemoteEvent>> {
        self.list(&[
            ("timeMin", Utc::now().to_rfc3339()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
            ("maxResults", max_results.to_string()),
        ])
        .await
    }

    async fn insert_event(&self, event: &NewEvent) -> Result<RemoteEvent> {
        let body = EventBody {
            summary: Some(event.summary.clone()),
            description: Some(event.description.clone()),
            start: Some(EventDateTime::at(event.timing.start, &event.timing.time_zone)),
            end: Some(EventDateTime::at(event.timing.end, &event.timing.time_zone)),
            reminders: Some(Reminders {
                use_default: false,
                overrides: vec![ReminderOverride {
                    method: "popup",
                    minutes: event.reminder_minutes,
                }],
            }),
        };

        let token = self.auth.access_token().await?;
        let resp = self
            .client
            .post(&self.events_url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let created: GoogleEvent = expect_success(resp, "event insert").await?.json().await?;
        Ok(created.into())
    }

    async fn patch_event(&self, event_id: &str, changes: &EventChanges) -> Result<RemoteEvent> {
        let body = EventBody {
            summary: changes.summary.clone(),
            description: changes.description.clone(),
            start: changes
                .timing
                .as_ref()
                .map(|t| EventDateTime::at(t.start, &t.time_zone)),
            end: changes
                .timing
                .as_ref()
                .map(|t| EventDateTime::at(t.end, &t.time_zone)),
            reminders: None,
        };

        let token = self.auth.access_token().await?;
        let resp = self
            .client
            .patch(format!("{}/{}", self.events_url, event_id))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let updated: GoogleEvent = expect_success(resp, "event patch").await?.json().await?;
        Ok(updated.into())
    }

    async fn delete_event(&self, event_id: &str) -> Result<()> {
        let token = self.auth.access_token().await?;
        let resp = self
            .client
            .delete(format!("{}/{}", self.events_url, event_id))
            .bearer_auth(token)
            .send()
            .await?;

        if resp.status() == StatusCode::GONE || resp.status() == StatusCode::NOT_FOUND {
            debug!("Event {} was already removed", event_id);
            return Ok(());
        }
        expect_success(resp, "event delete").await?;
        Ok(())
    }
}

/// Summary used for a note's event: its first non-empty line, at most 100
/// characters.
pub fn event_summary(content: &str) -> String {
    let line = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("Note");
    crate::truncate_chars(line, SUMMARY_MAX_CHARS)
}

/// Event description: the note content, its link and the note id.
pub fn event_description(note: &Note) -> String {
    let mut description = note.content.trim().to_string();
    if let Some(link) = &note.link {
        description.push_str("\n\nLink: ");
        description.push_str(link);
    }
    description.push_str("\n\nNote ID: ");
    description.push_str(&note.id);
    description
}

/// Parameters of the duplicate-event heuristic.
///
/// An existing event counts as the same one when its summary equals the new
/// summary exactly and it starts within `window` of the candidate span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicatePolicy {
    pub window: Duration,
    pub max_candidates: usize,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        DuplicatePolicy {
            window: Duration::minutes(60),
            max_candidates: 10,
        }
    }
}

impl DuplicatePolicy {
    /// Reads the window and candidate cap, rejecting a negative or
    /// out-of-range window
    pub fn from_config(config: &Config) -> Result<Self> {
        let minutes = config.duplicate_window_minutes;
        let window = Duration::try_minutes(minutes)
            .filter(|_| minutes >= 0)
            .ok_or_else(|| {
                NotesError::configuration(format!(
                    "duplicate_window_minutes out of range: {}",
                    minutes
                ))
            })?;
        Ok(DuplicatePolicy {
            window,
            max_candidates: config.duplicate_max_candidates,
        })
    }
}

/// Result of reconciling one note against the remote calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No date/time, no authorized calendar, or the remote step failed
    Unscheduled,
    /// A linked note whose remote event was left as it is
    Unchanged,
    Linked {
        event_id: String,
        event_url: Option<String>,
        duplicate: bool,
    },
}

impl SyncOutcome {
    /// Patch recording the link on the note, if there is one to record
    pub fn to_patch(&self) -> Option<NotePatch> {
        match self {
            SyncOutcome::Linked {
                event_id,
                event_url,
                duplicate,
            } => Some(NotePatch::calendar_link(
                event_id.clone(),
                event_url.clone(),
                *duplicate,
            )),
            _ => None,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, SyncOutcome::Linked { duplicate: true, .. })
    }
}

/// Calendar event loosely associated with an unlinked note in listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedEvent {
    pub id: String,
    pub summary: String,
    pub url: Option<String>,
    pub start: Option<DateTime<FixedOffset>>,
}

/// A note as returned by listings, with an optional advisory event match.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedNote {
    #[serde(flatten)]
    pub note: Note,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_event: Option<MatchedEvent>,
}

impl From<Note> for EnrichedNote {
    fn from(note: Note) -> Self {
        EnrichedNote {
            note,
            matched_event: None,
        }
    }
}

/// Decides what a note means for the remote calendar.
pub struct CalendarReconciler {
    provider: Option<Arc<dyn CalendarProvider>>,
    policy: DuplicatePolicy,
    reminder_minutes: u32,
}

impl CalendarReconciler {
    pub fn new(
        provider: Option<Arc<dyn CalendarProvider>>,
        policy: DuplicatePolicy,
        reminder_minutes: u32,
    ) -> Self {
        CalendarReconciler {
            provider,
            policy,
            reminder_minutes,
        }
    }

    /// A reconciler that never touches a remote calendar
    pub fn disabled() -> Self {
        CalendarReconciler::new(None, DuplicatePolicy::default(), 15)
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn is_authorized(&self) -> bool {
        self.active().is_some()
    }

    fn active(&self) -> Option<&Arc<dyn CalendarProvider>> {
        self.provider.as_ref().filter(|p| p.is_authorized())
    }

    /// Links a freshly created note to a remote event.
    ///
    /// An existing event with the same summary near the detected time is
    /// reused and reported as a duplicate; otherwise a new event is inserted.
    pub async fn reconcile_new(
        &self,
        note: &Note,
        reference: DateTime<FixedOffset>,
        time_zone: &str,
    ) -> SyncOutcome {
        let Some(provider) = self.active() else {
            trace!("Calendar not authorized, note {} stays unscheduled", note.id);
            return SyncOutcome::Unscheduled;
        };
        let Some(span) = extract_span(&note.content, reference) else {
            debug!("No date/time found in note {}", note.id);
            return SyncOutcome::Unscheduled;
        };

        let summary = event_summary(&note.content);
        match self.find_duplicate(provider.as_ref(), &summary, &span).await {
            Ok(Some(existing)) => {
                info!(
                    "Note {} matches existing event {} ('{}')",
                    note.id, existing.id, summary
                );
                return SyncOutcome::Linked {
                    event_id: existing.id,
                    event_url: existing.html_link,
                    duplicate: true,
                };
            }
            Ok(None) => {}
            Err(e) => {
                // an unchecked duplicate may become a second event, never a wrong link
                warn!(
                    "Duplicate search failed for note {}, creating a new event: {}",
                    note.id, e
                );
            }
        }

        let event = NewEvent {
            summary,
            description: event_description(note),
            timing: EventTiming::from_span(&span, time_zone),
            reminder_minutes: self.reminder_minutes,
        };
        match provider.insert_event(&event).await {
            Ok(created) => {
                info!("Created calendar event {} for note {}", created.id, note.id);
                SyncOutcome::Linked {
                    event_id: created.id,
                    event_url: created.html_link,
                    duplicate: false,
                }
            }
            Err(e) => {
                warn!("Failed to create calendar event for note {}: {}", note.id, e);
                SyncOutcome::Unscheduled
            }
        }
    }

    /// First event in the duplicate window whose summary equals `summary`
    async fn find_duplicate(
        &self,
        provider: &dyn CalendarProvider,
        summary: &str,
        span: &CandidateSpan,
    ) -> Result<Option<RemoteEvent>> {
        let time_min = span.start - self.policy.window;
        let time_max = span.end_or_default() + self.policy.window;
        let candidates = provider
            .search_events(summary, time_min, time_max, self.policy.max_candidates)
            .await?;

        trace!("{} duplicate candidates for '{}'", candidates.len(), summary);
        Ok(candidates
            .into_iter()
            .take(self.policy.max_candidates)
            .find(|event| event.summary == summary))
    }

    /// Re-syncs a linked note after an edit. Unlinked notes are left alone.
    pub async fn reconcile_edit(
        &self,
        note: &Note,
        reference: DateTime<FixedOffset>,
        time_zone: &str,
    ) -> SyncOutcome {
        let Some(event_id) = note.calendar_event_id.as_deref() else {
            return SyncOutcome::Unscheduled;
        };
        let Some(provider) = self.active() else {
            debug!("Calendar not authorized, event {} not updated", event_id);
            return SyncOutcome::Unchanged;
        };

        let changes = EventChanges {
            summary: Some(event_summary(&note.content)),
            description: Some(event_description(note)),
            timing: extract_span(&note.content, reference)
                .map(|span| EventTiming::from_span(&span, time_zone)),
        };
        match provider.patch_event(event_id, &changes).await {
            Ok(updated) => {
                info!("Updated calendar event {} for note {}", updated.id, note.id);
                let event_url = updated.html_link.or_else(|| note.calendar_event_url.clone());
                if updated.id == event_id && event_url == note.calendar_event_url {
                    return SyncOutcome::Unchanged;
                }
                SyncOutcome::Linked {
                    event_id: updated.id,
                    event_url,
                    duplicate: note.is_duplicate,
                }
            }
            Err(e) => {
                warn!("Failed to update calendar event {}: {}", event_id, e);
                SyncOutcome::Unchanged
            }
        }
    }

    /// Best-effort removal of a deleted note's event. Returns whether the
    /// remote event is known to be gone.
    pub async fn release(&self, note: &Note) -> bool {
        let Some(event_id) = note.calendar_event_id.as_deref() else {
            return true;
        };
        let Some(provider) = self.active() else {
            warn!("Calendar not authorized, event {} left in place", event_id);
            return false;
        };

        match provider.delete_event(event_id).await {
            Ok(()) => {
                info!("Deleted calendar event {} for note {}", event_id, note.id);
                true
            }
            Err(e) => {
                warn!("Failed to delete calendar event {}: {}", event_id, e);
                false
            }
        }
    }

    /// Attaches a fuzzy-matched upcoming event to each unlinked note.
    ///
    /// Advisory only: stored calendar fields are never changed and a failed
    /// lookup leaves every note without a match.
    pub async fn enrich(&self, notes: Vec<Note>) -> Vec<EnrichedNote> {
        let Some(provider) = self.active() else {
            return notes.into_iter().map(EnrichedNote::from).collect();
        };
        if notes.iter().all(Note::is_linked) {
            return notes.into_iter().map(EnrichedNote::from).collect();
        }

        let upcoming = match provider.list_upcoming(ENRICH_UPCOMING_LIMIT).await {
            Ok(events) => events,
            Err(e) => {
                warn!("Could not list upcoming events for enrichment: {}", e);
                return notes.into_iter().map(EnrichedNote::from).collect();
            }
        };

        let matcher = SkimMatcherV2::default();
        notes
            .into_iter()
            .map(|note| {
                let matched_event = if note.is_linked() {
                    None
                } else {
                    best_match(&matcher, &note, &upcoming)
                };
                EnrichedNote {
                    note,
                    matched_event,
                }
            })
            .collect()
    }
}

fn best_match(matcher: &SkimMatcherV2, note: &Note, events: &[RemoteEvent]) -> Option<MatchedEvent> {
    let prefix = crate::truncate_chars(note.content.trim(), ENRICH_PREFIX_CHARS).to_lowercase();
    if prefix.is_empty() {
        return None;
    }

    events
        .iter()
        .filter_map(|event| {
            matcher
                .fuzzy_match(&event.summary.to_lowercase(), &prefix)
                .map(|score| (score, event))
        })
        .max_by_key(|(score, _)| *score)
        .map(|(_, event)| MatchedEvent {
            id: event.id.clone(),
            summary: event.summary.clone(),
            url: event.html_link.clone(),
            start: event.start,
        })
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory calendar used by unit tests.

    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    };

    use super::*;

    pub struct FakeCalendar {
        pub authorized: AtomicBool,
        pub failing: AtomicBool,
        pub failing_search: AtomicBool,
        pub events: Mutex<Vec<RemoteEvent>>,
        pub inserts: AtomicUsize,
        pub patches: AtomicUsize,
        pub deletes: AtomicUsize,
    }

    impl FakeCalendar {
        pub fn authorized() -> Arc<Self> {
            Arc::new(FakeCalendar {
                authorized: AtomicBool::new(true),
                failing: AtomicBool::new(false),
                failing_search: AtomicBool::new(false),
                events: Mutex::new(Vec::new()),
                inserts: AtomicUsize::new(0),
                patches: AtomicUsize::new(0),
                deletes: AtomicUsize::new(0),
            })
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn inserts(&self) -> usize {
            self.inserts.load(Ordering::SeqCst)
        }

        pub fn deletes(&self) -> usize {
            self.deletes.load(Ordering::SeqCst)
        }

        pub fn add_event(&self, id: &str, summary: &str, start: DateTime<FixedOffset>) {
            self.events.lock().unwrap().push(RemoteEvent {
                id: id.to_string(),
                summary: summary.to_string(),
                html_link: Some(format!("https://calendar.test/{}", id)),
                start: Some(start),
            });
        }

        fn check(&self) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(NotesError::external("fake-calendar", "unavailable"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CalendarProvider for FakeCalendar {
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
            self.check()?;
            if self.failing_search.load(Ordering::SeqCst) {
                return Err(NotesError::external("fake-calendar", "search unavailable"));
            }
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
            self.check()?;
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
            self.check()?;
            let n = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
            let id = format!("evt-{}", n);
            self.add_event(&id, &event.summary, event.timing.start);
            Ok(self.events.lock().unwrap().last().cloned().unwrap())
        }

        async fn patch_event(&self, event_id: &str, changes: &EventChanges) -> Result<RemoteEvent> {
            self.check()?;
            self.patches.fetch_add(1, Ordering::SeqCst);
            let mut events = self.events.lock().unwrap();
            let event = events
                .iter_mut()
                .find(|e| e.id == event_id)
                .ok_or_else(|| NotesError::external("fake-calendar", "no such event"))?;
            if let Some(summary) = &changes.summary {
                event.summary = summary.clone();
            }
            if let Some(timing) = &changes.timing {
                event.start = Some(timing.start);
            }
            Ok(event.clone())
        }

        async fn delete_event(&self, event_id: &str) -> Result<()> {
            self.check()?;
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.events.lock().unwrap().retain(|e| e.id != event_id);
            Ok(())
        }
    }
}
