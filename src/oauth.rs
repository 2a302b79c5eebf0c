//! Google OAuth 2.0 authorization-code flow and token refresh.

use std::{collections::HashMap, sync::Arc, sync::Mutex, time::Duration as StdDuration};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use uuid::Uuid;

use crate::{GoogleConfig, NotesError, Result, StoredToken, TokenStore};

/// Provider key under which Google tokens are stored
pub const GOOGLE_PROVIDER: &str = "google";

const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
const REFRESH_MARGIN_SECS: i64 = 60;
/// Consent screens older than this can no longer be completed
const STATE_TTL_SECS: i64 = 600;
const MAX_PENDING_STATES: usize = 32;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Holds the OAuth client configuration and the persisted Google tokens.
pub struct GoogleAuth {
    client: Client,
    config: GoogleConfig,
    tokens: Arc<TokenStore>,
    /// Issued `state` values and when they were issued
    pending_states: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl GoogleAuth {
    /// Builds the OAuth helper after checking that credentials are configured
    pub fn new(config: GoogleConfig, tokens: Arc<TokenStore>, timeout: StdDuration) -> Result<Self> {
        config.check()?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotesError::configuration(format!("HTTP client: {}", e)))?;

        Ok(GoogleAuth {
            client,
            config,
            tokens,
            pending_states: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &GoogleConfig {
        &self.config
    }

    /// Consent-screen URL requesting offline calendar access
    pub fn authorization_url(&self) -> Result<String> {
        let state = Uuid::new_v4().simple().to_string();
        let url = Url::parse_with_params(
            &self.config.auth_url,
            [
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", CALENDAR_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| NotesError::configuration(format!("invalid auth_url: {}", e)))?;

        if let Ok(mut pending) = self.pending_states.lock() {
            let now = Utc::now();
            pending.retain(|_, issued| now - *issued < Duration::seconds(STATE_TTL_SECS));
            if pending.len() >= MAX_PENDING_STATES {
                let oldest = pending
                    .iter()
                    .min_by_key(|(_, issued)| **issued)
                    .map(|(key, _)| key.clone());
                if let Some(oldest) = oldest {
                    pending.remove(&oldest);
                }
            }
            pending.insert(state, now);
        }
        Ok(url.to_string())
    }

    /// True once a token has been obtained for Google
    pub fn is_authorized(&self) -> bool {
        self.tokens.get(GOOGLE_PROVIDER).is_some()
    }

    /// Exchanges an authorization code for tokens and persists them.
    ///
    /// `state` must be an unexpired value issued by
    /// [`GoogleAuth::authorization_url`]; each value is accepted once.
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<StoredToken> {
        if code.trim().is_empty() {
            return Err(NotesError::validation("missing authorization code"));
        }
        let issued = self
            .pending_states
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(state));
        match issued {
            Some(issued) if Utc::now() - issued < Duration::seconds(STATE_TTL_SECS) => {}
            Some(_) => return Err(NotesError::validation("OAuth state expired")),
            None => return Err(NotesError::validation("unknown OAuth state")),
        }

        info!("Exchanging Google authorization code");
        let resp = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        let token = self.read_token_response(resp, None).await?;
        self.tokens.put(GOOGLE_PROVIDER, token.clone())?;
        Ok(token)
    }

    /// Returns a valid access token, refreshing and persisting it when it is
    /// about to expire.
    pub async fn access_token(&self) -> Result<String> {
        let stored = self.tokens.get(GOOGLE_PROVIDER).ok_or_else(|| {
            NotesError::configuration("Google Calendar is not authorized")
        })?;

        if !stored.expires_within(Utc::now(), Duration::seconds(REFRESH_MARGIN_SECS)) {
            return Ok(stored.access_token);
        }

        let Some(refresh_token) = stored.refresh_token.clone() else {
            warn!("Google access token expired and no refresh token is stored");
            return Err(NotesError::external(
                "google-oauth",
                "access token expired and no refresh token is available",
            ));
        };

        debug!("Refreshing Google access token");
        let resp = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let refreshed = self.read_token_response(resp, Some(refresh_token)).await?;
        self.tokens.put(GOOGLE_PROVIDER, refreshed.clone())?;
        Ok(refreshed.access_token)
    }

    async fn read_token_response(
        &self,
        resp: reqwest::Response,
        previous_refresh: Option<String>,
    ) -> Result<StoredToken> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let detail = format_oauth_error(status, &body);
            warn!("Google token endpoint failed: {}", detail);
            return Err(NotesError::external("google-oauth", detail));
        }

        let token: TokenResponse = resp.json().await?;
        let expires_in = token.expires_in.unwrap_or(3600);
        Ok(StoredToken {
            access_token: token.access_token,
            refresh_token: token.refresh_token.or(previous_refresh),
            expires_at: Utc::now() + Duration::seconds(expires_in),
        })
    }
}

fn format_oauth_error(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("HTTP {}", status);
    }

    let summary = match serde_json::from_str::<TokenErrorResponse>(trimmed) {
        Ok(err) => match err.error_description {
            Some(desc) => format!("{} ({})", desc, err.error),
            None => err.error,
        },
        Err(_) => crate::truncate_chars(&trimmed.replace(['\n', '\r'], " "), 240),
    };
    format!("HTTP {}: {}", status, summary)
}
