use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::AppError;

/// Runtime configuration, read once at startup. All values are opaque strings
/// to the core; components receive them through `Services::new`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the automation engine (n8n-compatible REST API).
    pub engine_base_url: String,
    /// API key sent as `X-N8N-API-KEY` on every engine call.
    pub engine_api_key: String,
    /// Base URL of the OAuth identity/token backend.
    pub identity_base_url: String,
    /// Base URL of the text-generation backend (OpenAI-compatible).
    pub llm_base_url: String,
    /// API key for the text-generation backend.
    pub llm_api_key: String,
    /// Model identifier requested from the text-generation backend.
    pub llm_model: String,
}

impl AppConfig {
    /// Resolve configuration from runtime env, falling back to `.env` files.
    ///
    /// Only the engine base URL and API key are mandatory; the identity and
    /// text-generation backends fall back to local defaults so a partially
    /// configured dev setup still boots.
    pub fn from_env() -> Result<Self, AppError> {
        let engine_base_url = resolve_var(&["N8N_BASE_URL", "ENGINE_BASE_URL"])
            .ok_or_else(|| {
                AppError::Validation(
                    "Automation engine URL is missing. Set N8N_BASE_URL in the environment or .env."
                        .into(),
                )
            })?;
        let engine_api_key = resolve_var(&["N8N_API_KEY", "ENGINE_API_KEY"]).ok_or_else(|| {
            AppError::Validation(
                "Automation engine API key is missing. Set N8N_API_KEY in the environment or .env."
                    .into(),
            )
        })?;

        Ok(Self {
            engine_base_url: trim_trailing_slash(engine_base_url),
            engine_api_key,
            identity_base_url: trim_trailing_slash(
                resolve_var(&["IDENTITY_BASE_URL", "BACKEND_URL"])
                    .unwrap_or_else(|| "http://localhost:8000".into()),
            ),
            llm_base_url: trim_trailing_slash(
                resolve_var(&["OPENAI_BASE_URL", "LLM_BASE_URL"])
                    .unwrap_or_else(|| "https://api.openai.com/v1".into()),
            ),
            llm_api_key: resolve_var(&["OPENAI_API_KEY", "LLM_API_KEY"]).unwrap_or_default(),
            llm_model: resolve_var(&["LLM_MODEL"]).unwrap_or_else(|| "gpt-4o-mini".into()),
        })
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

/// Return the first non-empty value from runtime env vars, then `.env` files.
fn resolve_var(keys: &[&str]) -> Option<String> {
    env_var_first_nonempty(keys).or_else(|| dotenv_var_first_nonempty(keys))
}

/// Return the first non-empty value from the given environment variable keys.
pub fn env_var_first_nonempty(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(value) = std::env::var(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Return the first non-empty value from the given keys found in `.env` files.
///
/// Searches `.env`, `../.env`, and `../../.env` relative to the working directory.
pub fn dotenv_var_first_nonempty(keys: &[&str]) -> Option<String> {
    let candidates = [
        PathBuf::from(".env"),
        PathBuf::from("../.env"),
        PathBuf::from("../../.env"),
    ];

    for path in candidates {
        if let Ok(iter) = dotenvy::from_path_iter(&path) {
            let map: HashMap<String, String> = iter.flatten().collect();
            for key in keys {
                if let Some(value) = map.get(*key) {
                    if !value.trim().is_empty() {
                        return Some(value.trim().to_string());
                    }
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_trailing_slash() {
        assert_eq!(trim_trailing_slash("http://x/".into()), "http://x");
        assert_eq!(trim_trailing_slash("http://x//".into()), "http://x");
        assert_eq!(trim_trailing_slash("http://x".into()), "http://x");
    }

    #[test]
    fn test_env_var_first_nonempty_skips_blank() {
        std::env::set_var("AGENTBRIDGE_TEST_BLANK", "   ");
        std::env::set_var("AGENTBRIDGE_TEST_SET", "value");
        assert_eq!(
            env_var_first_nonempty(&["AGENTBRIDGE_TEST_BLANK", "AGENTBRIDGE_TEST_SET"]),
            Some("value".into())
        );
    }
}
