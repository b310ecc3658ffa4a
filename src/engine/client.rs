//! HTTP client for the automation engine's public REST API.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::engine::types::*;
use crate::error::AppError;

// ============================================================================
// Helper
// ============================================================================

fn engine_err(e: impl std::fmt::Display) -> AppError {
    AppError::Deployment(e.to_string())
}

// ============================================================================
// EngineClient
// ============================================================================

/// Client wrapping the engine's credential, workflow, and health endpoints.
/// Every API call carries the instance key in `X-N8N-API-KEY`.
pub struct EngineClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl EngineClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");

        Self {
            http,
            base_url,
            api_key,
        }
    }

    // --------------------------------------------------------------------
    // Private HTTP helpers
    // --------------------------------------------------------------------

    fn authed(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("X-N8N-API-KEY", &self.api_key)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, AppError> {
        let resp = req.send().await.map_err(engine_err)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Deployment(format!(
                "engine API error ({}): {}",
                status, body
            )));
        }
        resp.json().await.map_err(engine_err)
    }

    async fn send_ok(&self, req: reqwest::RequestBuilder) -> Result<(), AppError> {
        let resp = req.send().await.map_err(engine_err)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Deployment(format!(
                "engine API error ({}): {}",
                status, body
            )));
        }
        Ok(())
    }

    // --------------------------------------------------------------------
    // Credentials
    // --------------------------------------------------------------------

    /// `GET /api/v1/credentials`
    pub async fn list_credentials(&self) -> Result<Vec<EngineCredential>, AppError> {
        let body: Value = self
            .send_json(self.authed(reqwest::Method::GET, "/api/v1/credentials"))
            .await?;
        Ok(serde_json::from_value(unwrap_data(body))?)
    }

    /// Lookup by exact name. Lookup failures degrade to `None` so a broken
    /// list endpoint falls through to credential creation.
    pub async fn find_credential_by_name(&self, name: &str) -> Option<EngineCredential> {
        match self.list_credentials().await {
            Ok(credentials) => credentials.into_iter().find(|c| c.name == name),
            Err(e) => {
                tracing::warn!(error = %e, "Credential lookup failed, assuming not found");
                None
            }
        }
    }

    /// `POST /api/v1/credentials`
    pub async fn create_credential(&self, body: &Value) -> Result<EngineCredential, AppError> {
        self.send_json(
            self.authed(reqwest::Method::POST, "/api/v1/credentials")
                .json(body),
        )
        .await
    }

    /// `PUT /api/v1/credentials/:id`
    pub async fn update_credential(
        &self,
        id: &str,
        body: &Value,
    ) -> Result<EngineCredential, AppError> {
        self.send_json(
            self.authed(
                reqwest::Method::PUT,
                &format!("/api/v1/credentials/{}", id),
            )
            .json(body),
        )
        .await
    }

    // --------------------------------------------------------------------
    // Workflows
    // --------------------------------------------------------------------

    /// `POST /api/v1/workflows`
    pub async fn create_workflow(&self, body: &Value) -> Result<EngineWorkflow, AppError> {
        self.send_json(
            self.authed(reqwest::Method::POST, "/api/v1/workflows")
                .json(body),
        )
        .await
    }

    /// `GET /api/v1/workflows/:id`
    pub async fn get_workflow(&self, id: &str) -> Result<EngineWorkflow, AppError> {
        self.send_json(self.authed(reqwest::Method::GET, &format!("/api/v1/workflows/{}", id)))
            .await
    }

    /// `PUT /api/v1/workflows/:id` — resubmits the whole graph.
    pub async fn update_workflow(
        &self,
        id: &str,
        workflow: &EngineWorkflow,
    ) -> Result<EngineWorkflow, AppError> {
        self.send_json(
            self.authed(
                reqwest::Method::PUT,
                &format!("/api/v1/workflows/{}", id),
            )
            .json(workflow),
        )
        .await
    }

    /// `POST /api/v1/workflows/:id/activate`
    pub async fn activate_workflow(&self, id: &str) -> Result<(), AppError> {
        self.send_ok(self.authed(
            reqwest::Method::POST,
            &format!("/api/v1/workflows/{}/activate", id),
        ))
        .await
    }

    /// `GET /api/v1/workflows` — tolerates both bare arrays and `{data: []}`.
    pub async fn list_workflows(&self) -> Result<Vec<EngineWorkflow>, AppError> {
        let body: Value = self
            .send_json(self.authed(reqwest::Method::GET, "/api/v1/workflows"))
            .await?;
        Ok(serde_json::from_value(unwrap_data(body))?)
    }

    /// Most recent execution for a workflow, if the executions API is up.
    pub async fn latest_execution(&self, workflow_id: &str) -> Option<Value> {
        let req = self
            .authed(reqwest::Method::GET, "/api/v1/executions")
            .query(&[("workflowId", workflow_id), ("limit", "1")]);
        let body: Value = self.send_json(req).await.ok()?;
        match unwrap_data(body) {
            Value::Array(items) => items.into_iter().next(),
            _ => None,
        }
    }

    // --------------------------------------------------------------------
    // Health
    // --------------------------------------------------------------------

    /// Probe candidate health paths in order: 2xx/304 is up, 404 means try
    /// the next path, any other status reports the instance down, and a
    /// network error moves on to the next candidate.
    pub async fn test_connection(&self) -> bool {
        self.probe_health().await.is_some()
    }

    /// Like `test_connection` but extracts the version from the first
    /// healthy response when the body is JSON.
    pub async fn instance_info(&self) -> InstanceInfo {
        match self.probe_health().await {
            Some(body) => InstanceInfo {
                version: body
                    .as_ref()
                    .and_then(|v| v.get("version"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                is_connected: true,
            },
            None => InstanceInfo {
                version: "unknown".into(),
                is_connected: false,
            },
        }
    }

    /// Returns `Some(parsed body)` for the first healthy path, `None` when
    /// the instance is down. Sequential, short-circuits on first success.
    async fn probe_health(&self) -> Option<Option<Value>> {
        for path in HEALTH_PATHS {
            tracing::debug!(path, "Probing engine health");
            let result = self.authed(reqwest::Method::GET, path).send().await;
            let resp = match result {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(path, error = %e, "Health probe attempt failed");
                    continue;
                }
            };
            let status = resp.status();
            if status.is_success() || status == reqwest::StatusCode::NOT_MODIFIED {
                return Some(resp.json().await.ok());
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                // Public API disabled for this path; try the next one.
                continue;
            }
            tracing::warn!(path, status = %status, "Engine health probe rejected");
            return None;
        }
        None
    }
}

/// Unwrap the engine's optional `{data: ...}` envelope.
fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_data_envelope() {
        let wrapped = serde_json::json!({"data": [{"id": "1"}]});
        assert_eq!(unwrap_data(wrapped), serde_json::json!([{"id": "1"}]));

        let bare = serde_json::json!([{"id": "1"}]);
        assert_eq!(unwrap_data(bare.clone()), bare);
    }
}
