//! CLI module for the calnotes application
//!
//! This module wires configuration into the note store, the calendar
//! integration and the LLM backend, and runs the selected command.
use std::{sync::Arc, time::Duration};

use log::{info, warn};

use crate::{
    build_backend, create_router, AppState, Assistant, CalendarProvider, CalendarReconciler,
    Commands, Config, DuplicatePolicy, GoogleAuth, GoogleCalendar, Note, NoteService,
    NoteStorage, NotesError, Result, TokenStore,
};

const PREVIEW_CHARS: usize = 100;

/// CLI Application handler - processes CLI commands
pub struct App {
    /// Application configuration
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the CLI application with the given command
    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Serve { bind } => self.serve(bind).await,
            Commands::Status => self.status().await,
            Commands::List {
                category,
                limit,
                json,
            } => self.list_notes(category, limit, json),
        }
    }

    fn open_storage(&self) -> Result<NoteStorage> {
        let mut storage = NoteStorage::new(self.config.notes_dir());
        let loaded = storage.initialize()?;
        info!("Loaded {} notes", loaded);
        Ok(storage)
    }

    /// Google OAuth helper, or `None` when credentials are missing
    fn google_auth(&self) -> Result<Option<Arc<GoogleAuth>>> {
        let tokens = Arc::new(TokenStore::open(self.config.tokens_path())?);
        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        match GoogleAuth::new(self.config.google.clone(), tokens, timeout) {
            Ok(auth) => Ok(Some(Arc::new(auth))),
            Err(NotesError::Configuration { message }) => {
                warn!("Google Calendar integration disabled: {}", message);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn assistant(&self) -> Result<Assistant> {
        match build_backend(&self.config.llm) {
            Ok(backend) => Ok(Assistant::new(backend)),
            Err(NotesError::Configuration { message }) => {
                warn!("LLM backend disabled, using rule-based output: {}", message);
                Ok(Assistant::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Builds the shared state served by the HTTP API
    pub async fn build_state(&self) -> Result<AppState> {
        let storage = self.open_storage()?;
        let auth = self.google_auth()?;

        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        let provider = match &auth {
            Some(auth) => {
                let calendar = GoogleCalendar::new(auth.clone(), timeout)?;
                Some(Arc::new(calendar) as Arc<dyn CalendarProvider>)
            }
            None => None,
        };
        let reconciler = CalendarReconciler::new(
            provider,
            DuplicatePolicy::from_config(&self.config)?,
            self.config.reminder_minutes,
        );

        let assistant = self.assistant()?;
        if let Some(name) = assistant.backend_name() {
            if let Err(e) = assistant.initialize().await {
                warn!("LLM backend {} is not ready: {}", name, e);
            }
        }

        Ok(AppState {
            notes: Arc::new(NoteService::new(
                storage,
                reconciler,
                self.config.default_time_zone.clone(),
            )),
            assistant: Arc::new(assistant),
            auth,
        })
    }

    async fn serve(&self, bind: Option<String>) -> Result<()> {
        let state = self.build_state().await?;
        let address = bind.unwrap_or_else(|| self.config.bind_address.clone());

        let listener = tokio::net::TcpListener::bind(&address).await?;
        info!("Listening on http://{}", listener.local_addr()?);

        axum::serve(listener, create_router(state))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }

    async fn status(&self) -> Result<()> {
        let storage = self.open_storage()?;
        println!("Data directory: {}", self.config.data_dir.display());
        println!("Notes: {}", storage.len());

        let calendar = match self.google_auth()? {
            Some(auth) if auth.is_authorized() => console::style("authorized").green(),
            Some(_) => console::style("configured, not authorized").yellow(),
            None => console::style("not configured").dim(),
        };
        println!("Google Calendar: {}", calendar);

        let assistant = self.assistant()?;
        match assistant.backend_name() {
            Some(name) => match assistant.initialize().await {
                Ok(()) => println!("LLM backend: {} ({})", name, console::style("ready").green()),
                Err(e) => println!("LLM backend: {} ({})", name, console::style(e).red()),
            },
            None => println!("LLM backend: {}", console::style("rule-based fallback").dim()),
        }
        Ok(())
    }

    fn list_notes(&self, category: Option<String>, limit: usize, json: bool) -> Result<()> {
        let storage = self.open_storage()?;
        let mut notes = match category {
            Some(category) => storage.get_notes_by_category(&category)?,
            None => storage.list_notes()?,
        };
        notes.truncate(limit);

        if json {
            println!("{}", serde_json::to_string_pretty(&notes)?);
            return Ok(());
        }
        self.display_notes_text(&notes);
        Ok(())
    }

    /// Display notes in text format
    fn display_notes_text(&self, notes: &[Note]) {
        if notes.is_empty() {
            println!("No notes found matching the criteria.");
            return;
        }

        let term_width = terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(80);

        for (i, note) in notes.iter().enumerate() {
            if i > 0 {
                println!("{}", "-".repeat(term_width.min(50)));
            }

            let created_at = note.created_at.format("%Y-%m-%d %H:%M");
            println!("ID: {} | Created: {}", note.id, created_at);
            println!("Category: {}", console::style(&note.category).cyan());
            if let Some(url) = &note.calendar_event_url {
                let label = if note.is_duplicate {
                    "Event (existing)"
                } else {
                    "Event"
                };
                println!("{}: {}", label, url);
            }

            let preview = content_preview(&note.content, PREVIEW_CHARS);
            if !preview.is_empty() {
                println!("\n{}", preview);
            }
        }

        println!(
            "\nFound {} note{}",
            notes.len(),
            if notes.len() == 1 { "" } else { "s" }
        );
    }
}

/// First non-empty line, cut to `max_chars` with an ellipsis
fn content_preview(content: &str, max_chars: usize) -> String {
    let first_line = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    if first_line.chars().count() > max_chars {
        format!("{}...", crate::truncate_chars(first_line, max_chars))
    } else {
        first_line.to_string()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
