//! HTTP API.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    Assistant, AssistOutput, CreateNote, CreateOutcome, EditNote, GoogleAuth, ListNotes, Note,
    NoteService, NotesError,
};

/// Shared handles injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub notes: Arc<NoteService>,
    pub assistant: Arc<Assistant>,
    /// `None` when Google credentials are not configured
    pub auth: Option<Arc<GoogleAuth>>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/notes", get(list_notes).post(create_note))
        .route(
            "/notes/{id}",
            get(get_note).put(update_note).delete(delete_note),
        )
        .route("/ai/suggest", post(suggest))
        .route("/ai/enhance", post(enhance))
        .route("/ai/categorize", post(categorize))
        .route("/ai/summarize", post(summarize))
        .route("/ai/quote", post(quote))
        .route("/auth/google", get(google_auth))
        .route("/auth/google/callback", get(google_callback))
        .route("/google/status", get(google_status))
        .with_state(state)
}

/// [`NotesError`] rendered as `{"error": message}` with a matching status.
#[derive(Debug)]
pub struct ApiError(NotesError);

impl From<NotesError> for ApiError {
    fn from(err: NotesError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(NotesError::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            NotesError::Validation { .. } | NotesError::InvalidFormat { .. } => {
                StatusCode::BAD_REQUEST
            }
            NotesError::NoteNotFound { .. } => StatusCode::NOT_FOUND,
            NotesError::NoteAlreadyExists { .. } => StatusCode::CONFLICT,
            NotesError::Configuration { .. } => StatusCode::SERVICE_UNAVAILABLE,
            NotesError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed with {}: {}", status, self.0);
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn required(value: Option<String>, field: &str) -> ApiResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError(NotesError::validation(format!("{} is required", field))))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

// Notes

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct NoteBody {
    content: Option<String>,
    color: Option<String>,
    link: Option<String>,
    category: Option<String>,
    #[serde(alias = "timeZone")]
    timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListQuery {
    enrich: Option<bool>,
    category: Option<String>,
    q: Option<String>,
}

#[derive(Serialize)]
struct DuplicateBody {
    #[serde(flatten)]
    note: Note,
    message: String,
}

async fn list_notes(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Response> {
    let notes = state
        .notes
        .list(ListNotes {
            category: query.category,
            query: query.q,
            enrich: query.enrich.unwrap_or(false),
        })
        .await?;
    Ok(Json(notes).into_response())
}

async fn create_note(
    State(state): State<AppState>,
    body: std::result::Result<Json<NoteBody>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = body?;
    let content = required(body.content, "content")?;

    let outcome = state
        .notes
        .create(CreateNote {
            content,
            color: body.color,
            link: body.link,
            category: body.category,
            time_zone: body.timezone,
        })
        .await?;

    info!("Created note {}", outcome.note().id);
    match outcome {
        CreateOutcome::Created(note) => Ok((StatusCode::CREATED, Json(note)).into_response()),
        CreateOutcome::Duplicate(note) => {
            let message = "A matching calendar event already exists; the note was linked to it"
                .to_string();
            Ok((StatusCode::CONFLICT, Json(DuplicateBody { note, message })).into_response())
        }
    }
}

async fn get_note(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Note>> {
    Ok(Json(state.notes.get(&id)?))
}

async fn update_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: std::result::Result<Json<NoteBody>, JsonRejection>,
) -> ApiResult<Json<Note>> {
    let Json(body) = body?;
    let content = required(body.content, "content")?;

    let note = state
        .notes
        .update(
            &id,
            EditNote {
                content: Some(content),
                color: body.color,
                link: body.link,
                category: body.category,
                time_zone: body.timezone,
            },
        )
        .await?;
    Ok(Json(note))
}

async fn delete_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.notes.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// AI helpers

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContentBody {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuoteBody {
    mood: Option<String>,
}

fn assist_response(key: &str, output: AssistOutput) -> Json<serde_json::Value> {
    Json(json!({ key: output.text, "source": output.source }))
}

async fn suggest(
    State(state): State<AppState>,
    body: std::result::Result<Json<ContentBody>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let content = required(body?.0.content, "content")?;
    Ok(assist_response("suggestion", state.assistant.suggest(&content).await))
}

async fn enhance(
    State(state): State<AppState>,
    body: std::result::Result<Json<ContentBody>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let content = required(body?.0.content, "content")?;
    Ok(assist_response("enhanced", state.assistant.enhance(&content).await))
}

async fn categorize(
    State(state): State<AppState>,
    body: std::result::Result<Json<ContentBody>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let content = required(body?.0.content, "content")?;
    Ok(assist_response("category", state.assistant.categorize(&content).await))
}

async fn summarize(
    State(state): State<AppState>,
    body: std::result::Result<Json<ContentBody>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let content = required(body?.0.content, "content")?;
    Ok(assist_response("summary", state.assistant.summarize(&content).await))
}

async fn quote(
    State(state): State<AppState>,
    body: std::result::Result<Json<QuoteBody>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(body) = body?;
    Ok(assist_response("quote", state.assistant.quote(body.mood.as_deref()).await))
}

// Google OAuth

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

fn google_auth_handle(state: &AppState) -> ApiResult<&Arc<GoogleAuth>> {
    state
        .auth
        .as_ref()
        .ok_or_else(|| ApiError(NotesError::configuration("Google Calendar is not configured")))
}

async fn google_auth(State(state): State<AppState>) -> ApiResult<Redirect> {
    let url = google_auth_handle(&state)?.authorization_url()?;
    Ok(Redirect::temporary(&url))
}

async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let auth = google_auth_handle(&state)?;
    if let Some(denied) = query.error {
        warn!("Google authorization was denied: {}", denied);
        return Err(ApiError(NotesError::validation(format!(
            "authorization denied: {}",
            denied
        ))));
    }
    let code = required(query.code, "code")?;
    let oauth_state = required(query.state, "state")?;

    auth.exchange_code(&code, &oauth_state).await?;
    info!("Google Calendar authorized");
    Ok(Json(json!({ "authorized": true })))
}

async fn google_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let configured = state.auth.is_some();
    let authorized = state.auth.as_ref().is_some_and(|auth| auth.is_authorized());
    Json(json!({ "authorized": authorized, "configured": configured }))
}
