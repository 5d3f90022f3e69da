//! Runtime auth application: injecting credentials into outgoing requests,
//! and the OAuth2 client-credentials token cache.
//!
//! Distinct from [`crate::model::Auth`], which only carries configuration.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use dashmap::DashMap;
use parking_lot::RwLock;
use reqwest::RequestBuilder;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{ApiKeyLocation, Auth};

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        match self.expires_at {
            Some(exp) => Instant::now() < exp,
            None => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Caches OAuth2 client-credentials tokens, keyed by `client_id`, reusing
/// them until the process ends or the token's own `expires_in` elapses.
#[derive(Default)]
pub struct OAuthTokenCache {
    tokens: DashMap<String, Arc<RwLock<CachedToken>>>,
}

impl OAuthTokenCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (and cache) an access token for the given client-credentials
    /// grant, refreshing only once the previous token has expired.
    pub async fn token(
        &self,
        http: &reqwest::Client,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        scope: &str,
    ) -> Result<String> {
        if let Some(entry) = self.tokens.get(client_id) {
            let cached = entry.read().clone();
            if cached.is_valid() {
                return Ok(cached.access_token);
            }
        }

        debug!(client_id, "fetching new OAuth2 client-credentials token");
        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        if !scope.is_empty() {
            form.push(("scope", scope));
        }

        let response = http
            .post(token_url)
            .form(&form)
            .send()
            .await?
            .error_for_status()?;
        let parsed: TokenResponse = response.json().await?;

        let cached = CachedToken {
            access_token: parsed.access_token.clone(),
            expires_at: parsed
                .expires_in
                .map(|secs| Instant::now() + Duration::from_secs(secs)),
        };
        self.tokens
            .insert(client_id.to_string(), Arc::new(RwLock::new(cached)));
        Ok(parsed.access_token)
    }
}

/// Apply `auth` to an in-flight request builder. Only `ApiKeyLocation::Header`
/// is supported for HTTP-family transports; query/cookie placement is
/// rejected per spec.md §4.2.1.
pub async fn apply_http_auth(
    mut request: RequestBuilder,
    auth: &Auth,
    http: &reqwest::Client,
    oauth_cache: &OAuthTokenCache,
) -> Result<RequestBuilder> {
    match auth {
        Auth::ApiKey {
            key,
            var_name,
            location,
        } => match location {
            ApiKeyLocation::Header => {
                request = request.header(var_name, key);
                Ok(request)
            }
            ApiKeyLocation::Query | ApiKeyLocation::Cookie => Err(Error::UnsupportedAuth(
                "api_key location must be header for this transport".to_string(),
            )),
        },
        Auth::Basic { username, password } => {
            let encoded =
                BASE64_STANDARD.encode(format!("{username}:{password}").as_bytes());
            request = request.header("Authorization", format!("Basic {encoded}"));
            Ok(request)
        }
        Auth::OAuth2 {
            token_url,
            client_id,
            client_secret,
            scope,
        } => {
            let token = oauth_cache
                .token(http, token_url, client_id, client_secret, scope)
                .await?;
            request = request.header("Authorization", format!("Bearer {token}"));
            Ok(request)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_token_without_expiry_is_always_valid() {
        let cached = CachedToken {
            access_token: "tok".to_string(),
            expires_at: None,
        };
        assert!(cached.is_valid());
    }

    #[test]
    fn cached_token_past_expiry_is_invalid() {
        let cached = CachedToken {
            access_token: "tok".to_string(),
            expires_at: Some(Instant::now() - Duration::from_secs(1)),
        };
        assert!(!cached.is_valid());
    }
}
