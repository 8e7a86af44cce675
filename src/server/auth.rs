//! API key authentication.
//!
//! Keys come from the server's YAML config file:
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "u1"
//! ```
//!
//! HTTP clients send `Authorization: Bearer <key>`. WebSocket clients may
//! pass the key as the `key` query parameter instead.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::AppState;

/// API key entry in config
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyEntry {
    pub key: String,
    pub user_id: String,
}

/// Config file structure
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    api_keys: Vec<ApiKeyEntry>,
}

/// Authenticated user info, added to request extensions after auth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

/// API key store - maps key -> AuthUser
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthUser>,
}

impl ApiKeyStore {
    /// Load API keys from config file
    pub fn load(config_path: &Path) -> Self {
        match std::fs::read_to_string(config_path) {
            Ok(contents) => match serde_yaml::from_str::<ConfigFile>(&contents) {
                Ok(config) => {
                    let store = Self::from_entries(config.api_keys);
                    tracing::info!("Loaded {} API key(s)", store.keys.len());
                    store
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
                tracing::warn!("No API keys loaded - all authenticated requests will fail");
                Self::default()
            }
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = ApiKeyEntry>) -> Self {
        let keys = entries
            .into_iter()
            .map(|entry| {
                (
                    entry.key,
                    AuthUser {
                        user_id: entry.user_id,
                    },
                )
            })
            .collect();
        Self { keys }
    }

    /// Validate an API key and return the associated user
    pub fn validate(&self, key: &str) -> Option<AuthUser> {
        self.keys.get(key).cloned()
    }
}

/// Auth error response
#[derive(Serialize)]
struct AuthError {
    error: &'static str,
    message: &'static str,
}

fn unauthorized(error: &'static str, message: &'static str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(AuthError { error, message })).into_response()
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(key) => key.to_string(),
            None => {
                return unauthorized(
                    "invalid_auth",
                    "Authorization header must use Bearer scheme",
                )
            }
        },
        None => match request.uri().query().and_then(key_from_query) {
            Some(key) => key,
            None => return unauthorized("missing_auth", "Authorization header required"),
        },
    };

    match state.api_keys.validate(&api_key) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => unauthorized("invalid_key", "Invalid API key"),
    }
}

fn key_from_query(query: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.strip_prefix("key="))
        .find_map(|value| urlencoding::decode(value).ok())
        .map(|key| key.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_api_keys_from_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "api_keys:\n  - key: \"secret-1\"\n    user_id: \"u1\"\n  - key: \"secret-2\"\n    user_id: \"u2\""
        )
        .unwrap();

        let store = ApiKeyStore::load(file.path());
        assert_eq!(
            store.validate("secret-1"),
            Some(AuthUser {
                user_id: "u1".into()
            })
        );
        assert_eq!(store.validate("secret-2").unwrap().user_id, "u2");
        assert_eq!(store.validate("nope"), None);
    }

    #[test]
    fn test_missing_config_loads_no_keys() {
        let store = ApiKeyStore::load(Path::new("/nonexistent/farmsync/config.yaml"));
        assert!(store.validate("anything").is_none());
    }

    #[test]
    fn test_key_from_query() {
        assert_eq!(key_from_query("key=abc"), Some("abc".to_string()));
        assert_eq!(
            key_from_query("foo=1&key=a%20b%26c"),
            Some("a b&c".to_string())
        );
        assert_eq!(key_from_query("foo=1"), None);
    }
}
