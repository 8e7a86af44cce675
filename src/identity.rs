//! Who is signed in.
//!
//! [`IdentityProvider`] is the single source of the current user. It is a
//! `watch` cell: every receiver sees the current value as soon as it
//! subscribes and is woken once per actual change. Setting the same user
//! twice is not a change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;

/// Opaque, stable identifier of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Publishes the signed-in user to every synchronizer.
#[derive(Debug)]
pub struct IdentityProvider {
    sender: watch::Sender<Option<UserId>>,
}

impl Default for IdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider {
    /// Creates a provider with nobody signed in.
    pub fn new() -> Self {
        Self {
            sender: watch::Sender::new(None),
        }
    }

    /// Creates a provider that starts out signed in as `user`.
    pub fn with_user(user: impl Into<UserId>) -> Self {
        Self {
            sender: watch::Sender::new(Some(user.into())),
        }
    }

    /// Signs `user` in. Returns `false` if they already were.
    pub fn sign_in(&self, user: impl Into<UserId>) -> bool {
        self.set(Some(user.into()))
    }

    /// Signs out. Returns `false` if nobody was signed in.
    pub fn sign_out(&self) -> bool {
        self.set(None)
    }

    pub fn current(&self) -> Option<UserId> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.sender.subscribe()
    }

    fn set(&self, next: Option<UserId>) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        })
    }
}

/// Errors resolving an identity from the server.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Invalid API key")]
    InvalidKey,
    #[error("Server returned status {0}")]
    Status(u16),
}

#[derive(Deserialize)]
struct MeResponse {
    user_id: String,
}

/// Server health as reported by `GET /health`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerHealth {
    pub status: String,
    pub version: String,
}

/// Resolves the user an API key belongs to via `GET /me`.
pub async fn fetch_identity(
    server_url: &str,
    api_key: &str,
    timeout: Duration,
) -> Result<UserId, IdentityError> {
    let client = http_client(timeout)?;
    let response = client
        .get(build_http_url(server_url, "/me"))
        .header("Authorization", format!("Bearer {}", api_key))
        .send()
        .await
        .map_err(|e| IdentityError::Http(e.to_string()))?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(IdentityError::InvalidKey);
    }
    if !status.is_success() {
        return Err(IdentityError::Status(status.as_u16()));
    }

    let me: MeResponse = response
        .json()
        .await
        .map_err(|e| IdentityError::Http(e.to_string()))?;
    Ok(UserId::new(me.user_id))
}

/// Queries `GET /health`.
pub async fn check_server(
    server_url: &str,
    timeout: Duration,
) -> Result<ServerHealth, IdentityError> {
    let client = http_client(timeout)?;
    let response = client
        .get(build_http_url(server_url, "/health"))
        .send()
        .await
        .map_err(|e| IdentityError::Http(e.to_string()))?;

    if !response.status().is_success() {
        return Err(IdentityError::Status(response.status().as_u16()));
    }

    response
        .json()
        .await
        .map_err(|e| IdentityError::Http(e.to_string()))
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, IdentityError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| IdentityError::Http(e.to_string()))
}

fn build_http_url(server_url: &str, path: &str) -> String {
    // Convert ws(s) to http(s) if needed
    let base_url = if let Some(rest) = server_url.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else if let Some(rest) = server_url.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
        format!("http://{}", server_url)
    } else {
        server_url.to_string()
    };

    format!("{}{}", base_url.trim_end_matches('/'), path)
}
