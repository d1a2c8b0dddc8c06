//! REST remote store
//!
//! Talks to a hosted backend exposing a PostgREST-style record API under
//! `/rest/v1` and a GoTrue-style auth API under `/auth/v1`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::config::RemoteConfig;
use crate::error::{AppError, Result};
use crate::storage::remote::{
    AuthClient, AuthEvent, AuthSession, AuthUser, Filter, RemoteStore, Table,
};

const EVENT_CAPACITY: usize = 64;

/// Token endpoint payload.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)));
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// HTTP-backed implementation of [`RemoteStore`] and [`AuthClient`].
pub struct RestStore {
    client: Client,
    base_url: String,
    anon_key: String,
    session: RwLock<Option<AuthSession>>,
    events: broadcast::Sender<AuthEvent>,
}

impl RestStore {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        if !config.is_configured() {
            return Err(AppError::Config(
                "remote.url and remote.anon_key are required for the REST store".into(),
            ));
        }
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout.max(1)))
            .build()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            session: RwLock::new(None),
            events,
        })
    }

    fn rest_url(&self, table: Table, filters: &[Filter]) -> String {
        let mut url = format!("{}/rest/v1/{}?select=*", self.base_url, table);
        for (column, value) in filter_params(filters) {
            url.push('&');
            url.push_str(&urlencoding::encode(&column));
            url.push('=');
            url.push_str(&urlencoding::encode(&value));
        }
        url
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn access_token(&self) -> Option<String> {
        self.session.read().as_ref().map(|s| s.access_token.clone())
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let bearer = self.access_token().unwrap_or_else(|| self.anon_key.clone());
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    fn store_session(&self, session: AuthSession, event: fn(AuthSession) -> AuthEvent) {
        *self.session.write() = Some(session.clone());
        let _ = self.events.send(event(session));
    }

    fn clear_session(&self) {
        let had_session = self.session.write().take().is_some();
        if had_session {
            let _ = self.events.send(AuthEvent::SignedOut);
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession> {
        let response = self
            .request(Method::POST, &self.auth_url("token?grant_type=refresh_token"))
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let body = read_body(response).await?;
        let token: TokenResponse = serde_json::from_value(body)?;
        Ok(token.into_session())
    }

    async fn post_signup(&self, email: &str, password: &str, metadata: Value) -> Result<Value> {
        let response = self
            .request(Method::POST, &self.auth_url("signup"))
            .json(&json!({ "email": email, "password": password, "data": metadata }))
            .send()
            .await?;
        read_body(response).await
    }
}

/// Render filters as PostgREST query parameters.
fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|filter| match filter {
            Filter::Eq(column, value) => (column.clone(), format!("eq.{}", render_value(value))),
            Filter::In(column, values) => {
                let list = values
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => format!("\"{}\"", s.replace('"', "\\\"")),
                        other => render_value(other),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                (column.clone(), format!("in.({})", list))
            }
        })
        .collect()
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Read a JSON body, turning non-success statuses into [`AppError::Remote`].
async fn read_body(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(remote_error(status, &text));
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

fn remote_error(status: StatusCode, body: &str) -> AppError {
    let message = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["msg", "message", "error_description", "error"]
            .iter()
            .find_map(|key| v.get(*key).and_then(Value::as_str).map(str::to_string))
    });
    AppError::Remote(message.unwrap_or_else(|| {
        if body.trim().is_empty() {
            status.to_string()
        } else {
            body.to_string()
        }
    }))
}

fn is_rejected_grant(status: StatusCode, body: &Value) -> bool {
    if status != StatusCode::BAD_REQUEST {
        return false;
    }
    let field = |key: &str| body.get(key).and_then(Value::as_str).unwrap_or_default();
    field("error") == "invalid_grant" || field("error_code") == "invalid_credentials"
}

fn rows(body: Value) -> Vec<Value> {
    match body {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn select(&self, table: Table, filters: &[Filter]) -> Result<Vec<Value>> {
        let response = self
            .request(Method::GET, &self.rest_url(table, filters))
            .send()
            .await?;
        Ok(rows(read_body(response).await?))
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value> {
        let response = self
            .request(Method::POST, &self.rest_url(table, &[]))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        rows(read_body(response).await?)
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Remote(format!("Insert into {} returned no row", table)))
    }

    async fn update(&self, table: Table, filters: &[Filter], patch: Value) -> Result<Vec<Value>> {
        let response = self
            .request(Method::PATCH, &self.rest_url(table, filters))
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        Ok(rows(read_body(response).await?))
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<u64> {
        let response = self
            .request(Method::DELETE, &self.rest_url(table, filters))
            .header("Prefer", "return=representation")
            .send()
            .await?;
        Ok(rows(read_body(response).await?).len() as u64)
    }
}

#[async_trait]
impl AuthClient for RestStore {
    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<AuthUser> {
        let body = self.post_signup(email, password, metadata).await?;
        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)?;
            let session = token.into_session();
            let user = session.user.clone();
            self.store_session(session, AuthEvent::SignedIn);
            return Ok(user);
        }
        // Email confirmation pending: the body is the bare user.
        Ok(serde_json::from_value(body)?)
    }

    async fn create_user(&self, email: &str, password: &str, metadata: Value) -> Result<AuthUser> {
        let body = self.post_signup(email, password, metadata).await?;
        let user = match body.get("user") {
            Some(user) => user.clone(),
            None => body,
        };
        Ok(serde_json::from_value(user)?)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession> {
        let response = self
            .request(Method::POST, &self.auth_url("token?grant_type=password"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
            if is_rejected_grant(status, &body) {
                return Err(AppError::InvalidCredential);
            }
            return Err(remote_error(status, &text));
        }

        let token: TokenResponse = serde_json::from_str(&text)?;
        let session = token.into_session();
        self.store_session(session.clone(), AuthEvent::SignedIn);
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        if self.access_token().is_none() {
            return Ok(());
        }
        let result = self
            .request(Method::POST, &self.auth_url("logout"))
            .send()
            .await;
        // The local session is dropped even when the server call fails.
        self.clear_session();
        read_body(result?).await.map(|_| ())
    }

    async fn get_session(&self) -> Result<Option<AuthSession>> {
        let current = self.session.read().clone();
        let Some(session) = current else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        let Some(refresh_token) = session.refresh_token.clone() else {
            self.clear_session();
            return Ok(None);
        };
        match self.refresh(&refresh_token).await {
            Ok(refreshed) => {
                self.store_session(refreshed.clone(), AuthEvent::TokenRefreshed);
                Ok(Some(refreshed))
            }
            Err(e) => {
                tracing::warn!("Session refresh failed, signing out: {}", e);
                self.clear_session();
                Ok(None)
            }
        }
    }

    async fn reset_password_for_email(&self, email: &str) -> Result<()> {
        let response = self
            .request(Method::POST, &self.auth_url("recover"))
            .json(&json!({ "email": email }))
            .send()
            .await?;
        read_body(response).await.map(|_| ())
    }

    async fn update_password(&self, new_password: &str) -> Result<()> {
        if self.access_token().is_none() {
            return Err(AppError::Remote("Auth session missing!".to_string()));
        }
        let response = self
            .request(Method::PUT, &self.auth_url("user"))
            .json(&json!({ "password": new_password }))
            .send()
            .await?;
        read_body(response).await.map(|_| ())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
