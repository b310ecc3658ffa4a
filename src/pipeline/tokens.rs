//! Credential store — per-provider OAuth tokens backed by the identity
//! backend, with a local JSON cache used only when the backend is
//! unreachable.
//!
//! Expiry values arrive in seconds or milliseconds depending on the
//! upstream source; `normalize_expiry_ms` reconciles them on read.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::pipeline::types::Provider;

// ============================================================================
// Token shapes
// ============================================================================

/// One provider's OAuth token. At most one token per provider is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthToken {
    pub provider: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Epoch expiry, seconds or milliseconds depending on the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<f64>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Epoch values below this are seconds; at or above, milliseconds.
const EXPIRY_MS_THRESHOLD: f64 = 1e12;

/// Normalize a raw expiry to milliseconds-since-epoch.
pub fn normalize_expiry_ms(raw: f64) -> f64 {
    if raw < EXPIRY_MS_THRESHOLD {
        raw * 1000.0
    } else {
        raw
    }
}

/// Valid iff no expiry is set, or the normalized expiry is strictly in the
/// future at `now_ms`.
pub fn is_token_valid_at(token: &OAuthToken, now_ms: f64) -> bool {
    match token.expires_at {
        None => true,
        Some(raw) => now_ms < normalize_expiry_ms(raw),
    }
}

fn now_ms() -> f64 {
    Utc::now().timestamp_millis() as f64
}

// ============================================================================
// TokenStore
// ============================================================================

/// Credential store over the identity backend's token endpoints, falling
/// back to `cache_path` when the backend cannot be reached. The fallback is
/// best-effort; every divergence is logged at warn level.
pub struct TokenStore {
    http: reqwest::Client,
    identity_base_url: String,
    cache_path: PathBuf,
}

impl TokenStore {
    pub fn new(identity_base_url: String) -> Self {
        let cache_path = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("agentbridge")
            .join("oauth_tokens.json");
        Self::with_cache_path(identity_base_url, cache_path)
    }

    pub fn with_cache_path(identity_base_url: String, cache_path: PathBuf) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("failed to build reqwest client");
        Self {
            http,
            identity_base_url,
            cache_path,
        }
    }

    fn tokens_url(&self) -> String {
        format!("{}/api/v1/auth/tokens", self.identity_base_url)
    }

    /// All stored tokens, keyed by provider. Backend first, local cache on
    /// backend failure. An empty map means nothing is connected.
    pub async fn stored_tokens(&self) -> HashMap<String, OAuthToken> {
        match self.fetch_backend_tokens().await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(error = %e, "Token backend unreachable, using local cache");
                self.read_cache().await
            }
        }
    }

    async fn fetch_backend_tokens(&self) -> Result<HashMap<String, OAuthToken>, AppError> {
        let resp = self.http.get(self.tokens_url()).send().await?;
        if !resp.status().is_success() {
            return Err(AppError::Auth(format!(
                "token backend returned HTTP {}",
                resp.status().as_u16()
            )));
        }
        Ok(resp.json().await?)
    }

    /// Idempotent upsert. Backend write preferred; on failure the token
    /// lands in the local cache so the session can still deploy.
    pub async fn store_token(&self, provider: &str, token: OAuthToken) {
        let backend = async {
            let resp = self
                .http
                .post(self.tokens_url())
                .json(&serde_json::json!({ "provider": provider, "token": token }))
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(AppError::Auth(format!(
                    "token backend returned HTTP {}",
                    resp.status().as_u16()
                )));
            }
            Ok::<(), AppError>(())
        };

        if let Err(e) = backend.await {
            tracing::warn!(provider, error = %e, "Failed to store token in backend, caching locally");
            let mut cache = self.read_cache().await;
            cache.insert(provider.to_string(), token);
            self.write_cache(&cache).await;
        }
    }

    pub async fn get_token(&self, provider: &str) -> Option<OAuthToken> {
        self.stored_tokens().await.remove(provider)
    }

    /// Return the stored token when still valid; otherwise exchange the
    /// refresh token if one exists. `None` means the provider must be
    /// treated as disconnected.
    pub async fn refresh_if_needed(&self, provider: &str) -> Option<OAuthToken> {
        let token = self.get_token(provider).await?;
        if is_token_valid_at(&token, now_ms()) {
            return Some(token);
        }

        let refresh_token = token.refresh_token.as_deref()?;
        match self.exchange_refresh_token(provider, refresh_token).await {
            Ok(new_token) => {
                self.store_token(provider, new_token.clone()).await;
                Some(new_token)
            }
            Err(e) => {
                tracing::error!(provider, error = %e, "Token refresh failed");
                None
            }
        }
    }

    async fn exchange_refresh_token(
        &self,
        provider: &str,
        refresh_token: &str,
    ) -> Result<OAuthToken, AppError> {
        let resp = self
            .http
            .post(format!("{}/api/v1/auth/refresh", self.identity_base_url))
            .json(&serde_json::json!({
                "provider": provider,
                "refreshToken": refresh_token,
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::Auth(format!(
                "refresh endpoint returned HTTP {}",
                resp.status().as_u16()
            )));
        }
        Ok(resp.json().await?)
    }

    /// Access tokens usable for deployment, keyed by provider. Invalid
    /// tokens get one refresh attempt; providers that stay invalid are
    /// silently excluded — callers diff against required connections.
    pub async fn valid_tokens_for_deployment(&self) -> HashMap<String, String> {
        let stored = self.stored_tokens().await;
        let now = now_ms();
        let mut valid = HashMap::new();

        for (provider, token) in stored {
            if is_token_valid_at(&token, now) {
                valid.insert(provider, token.access_token);
            } else if let Some(refreshed) = self.refresh_if_needed(&provider).await {
                valid.insert(provider, refreshed.access_token);
            }
        }

        valid
    }

    /// Providers with a currently valid token.
    pub async fn available_providers(&self) -> Vec<String> {
        let now = now_ms();
        let mut providers: Vec<String> = self
            .stored_tokens()
            .await
            .into_iter()
            .filter(|(_, token)| is_token_valid_at(token, now))
            .map(|(provider, _)| provider)
            .collect();
        providers.sort();
        providers
    }

    /// Remove one provider's token, or all of them.
    pub async fn clear(&self, provider: Option<&str>) {
        let mut request = self.http.delete(self.tokens_url());
        if let Some(p) = provider {
            request = request.query(&[("provider", p)]);
        }
        if let Err(e) = request.send().await {
            tracing::warn!(error = %e, "Failed to clear tokens on backend");
        }

        match provider {
            None => {
                if let Err(e) = tokio::fs::remove_file(&self.cache_path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(error = %e, "Failed to remove local token cache");
                    }
                }
            }
            Some(p) => {
                let mut cache = self.read_cache().await;
                if cache.remove(p).is_some() {
                    self.write_cache(&cache).await;
                }
            }
        }
    }

    async fn read_cache(&self) -> HashMap<String, OAuthToken> {
        match tokio::fs::read(&self.cache_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    async fn write_cache(&self, cache: &HashMap<String, OAuthToken>) {
        if let Some(parent) = self.cache_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!(error = %e, "Failed to create token cache directory");
                return;
            }
        }
        match serde_json::to_vec_pretty(cache) {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::write(&self.cache_path, bytes).await {
                    tracing::warn!(error = %e, "Failed to write local token cache");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize token cache"),
        }
    }
}

// ============================================================================
// Identity backend client
// ============================================================================

/// A connected account as reported by the identity backend.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticatedUser {
    pub email: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub expires_at: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct UsersResponse {
    #[serde(default)]
    users: Vec<AuthenticatedUser>,
}

#[derive(Debug, Deserialize)]
struct AuthUrlResponse {
    auth_url: String,
}

/// Thin client for the identity backend's account surface: list connected
/// accounts, fetch an authorize redirect URL, disconnect.
pub struct IdentityClient {
    http: reqwest::Client,
    base_url: String,
}

impl IdentityClient {
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("failed to build reqwest client");
        Self { http, base_url }
    }

    pub async fn list_users(&self) -> Result<Vec<AuthenticatedUser>, AppError> {
        let resp = self
            .http
            .get(format!("{}/auth/users", self.base_url))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::Auth(format!(
                "identity backend returned HTTP {}",
                resp.status().as_u16()
            )));
        }
        let body: UsersResponse = resp.json().await?;
        Ok(body.users)
    }

    /// Redirect URL starting the provider's OAuth flow.
    pub async fn authorize_url(&self, provider: Provider) -> Result<String, AppError> {
        let resp = self
            .http
            .get(format!("{}/api/v1/auth/{}", self.base_url, provider.as_str()))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::Auth(format!(
                "authorize endpoint for {} returned HTTP {}",
                provider,
                resp.status().as_u16()
            )));
        }
        let body: AuthUrlResponse = resp.json().await?;
        Ok(body.auth_url)
    }

    pub async fn disconnect(&self) -> Result<(), AppError> {
        let resp = self
            .http
            .post(format!("{}/auth/clear-tokens", self.base_url))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::Auth(format!(
                "disconnect endpoint returned HTTP {}",
                resp.status().as_u16()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(provider: &str, expires_at: Option<f64>, refresh: Option<&str>) -> OAuthToken {
        OAuthToken {
            provider: provider.into(),
            access_token: format!("{}-access", provider),
            refresh_token: refresh.map(String::from),
            expires_at,
            scopes: vec!["scope.read".into()],
            user_id: None,
        }
    }

    /// Store pointed at an unroutable backend so every call exercises the
    /// local cache fallback.
    fn offline_store(dir: &tempfile::TempDir) -> TokenStore {
        TokenStore::with_cache_path(
            "http://127.0.0.1:1".into(),
            dir.path().join("oauth_tokens.json"),
        )
    }

    #[test]
    fn test_expiry_normalization_boundary() {
        // Below the threshold: seconds, scaled to milliseconds.
        assert_eq!(normalize_expiry_ms(999_999_999_999.0), 999_999_999_999_000.0);
        assert_eq!(normalize_expiry_ms(1_700_000_000.0), 1_700_000_000_000.0);
        // At and above: already milliseconds, unchanged.
        assert_eq!(normalize_expiry_ms(1e12), 1e12);
        assert_eq!(normalize_expiry_ms(1_700_000_000_000.0), 1_700_000_000_000.0);
    }

    #[test]
    fn test_token_without_expiry_is_valid() {
        assert!(is_token_valid_at(&token("google", None, None), now_ms()));
    }

    #[test]
    fn test_seconds_expiry_compared_after_scaling() {
        let now = 1_700_000_000_000.0; // ms
        let expires_in_future_secs = 1_700_000_100.0;
        let expired_secs = 1_699_999_900.0;
        assert!(is_token_valid_at(
            &token("google", Some(expires_in_future_secs), None),
            now
        ));
        assert!(!is_token_valid_at(
            &token("google", Some(expired_secs), None),
            now
        ));
    }

    #[tokio::test]
    async fn test_store_falls_back_to_local_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = offline_store(&dir);

        store.store_token("google", token("google", None, None)).await;
        let stored = store.stored_tokens().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored["google"].access_token, "google-access");
    }

    #[tokio::test]
    async fn test_valid_tokens_excludes_unrefreshable_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = offline_store(&dir);

        store.store_token("google", token("google", None, None)).await;
        // Expired, refresh attempt will fail (backend unreachable).
        store
            .store_token("slack", token("slack", Some(1_000_000_000.0), Some("r")))
            .await;
        // Expired, no refresh token at all.
        store
            .store_token("jira", token("jira", Some(1_000_000_000.0), None))
            .await;

        let valid = store.valid_tokens_for_deployment().await;
        assert_eq!(valid.len(), 1);
        assert_eq!(valid["google"], "google-access");
        assert!(!valid.contains_key("slack"));
        assert!(!valid.contains_key("microsoft"));
    }

    #[tokio::test]
    async fn test_available_providers_filters_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = offline_store(&dir);

        store.store_token("google", token("google", None, None)).await;
        store
            .store_token("slack", token("slack", Some(1_000_000_000.0), None))
            .await;

        assert_eq!(store.available_providers().await, vec!["google".to_string()]);
    }

    #[tokio::test]
    async fn test_clear_single_provider() {
        let dir = tempfile::tempdir().unwrap();
        let store = offline_store(&dir);

        store.store_token("google", token("google", None, None)).await;
        store.store_token("slack", token("slack", None, None)).await;

        store.clear(Some("google")).await;
        let stored = store.stored_tokens().await;
        assert!(!stored.contains_key("google"));
        assert!(stored.contains_key("slack"));

        store.clear(None).await;
        assert!(store.stored_tokens().await.is_empty());
    }
}
