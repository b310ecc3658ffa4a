//! Deployment orchestrator — resolves credentials, rewrites the graph's
//! credential references, submits it inactive, then activates it.
//!
//! One state machine per orchestrator: idle → preparing → deploying →
//! success | error. Failed attempts stay failed; a new `deploy` call is the
//! only retry path, and nothing created engine-side is rolled back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::engine::client::EngineClient;
use crate::engine::types::*;
use crate::error::AppError;
use crate::pipeline::types::Provider;

// ============================================================================
// Credential/token plumbing
// ============================================================================

/// Access token for an engine credential type. Tokens are keyed by provider
/// (`google`, ...) while specs carry engine types (`googleOAuth2Api`, ...),
/// so the provider mapping is consulted first, then the raw type key.
fn access_token_for_type<'a>(
    oauth_tokens: &'a HashMap<String, String>,
    credential_type: &str,
) -> Option<&'a str> {
    Provider::ALL
        .iter()
        .find(|p| p.credential_type() == credential_type)
        .and_then(|p| oauth_tokens.get(p.as_str()))
        .or_else(|| oauth_tokens.get(credential_type))
        .map(String::as_str)
}

/// Rewrite node credential references from names to `{id, name}` using the
/// resolved mapping. References to unmapped names are left exactly as they
/// were; the engine rejects them at activation, which callers surface.
/// Returns the rewritten graph and the names left unresolved.
fn prepare_workflow_graph(
    graph: &Value,
    credential_ids: &HashMap<String, String>,
) -> (Value, Vec<String>) {
    let mut prepared = graph.clone();
    let mut unresolved = Vec::new();

    if let Some(nodes) = prepared.get_mut("nodes").and_then(Value::as_array_mut) {
        for node in nodes {
            let Some(credentials) = node.get_mut("credentials").and_then(Value::as_object_mut)
            else {
                continue;
            };
            for reference in credentials.values_mut() {
                let name = match reference {
                    Value::String(name) => name.clone(),
                    // Already an {id, name} object; nothing to rewrite.
                    _ => continue,
                };
                match credential_ids.get(&name) {
                    Some(id) => {
                        *reference = serde_json::json!({ "id": id, "name": name });
                    }
                    None => {
                        if !unresolved.contains(&name) {
                            unresolved.push(name);
                        }
                    }
                }
            }
        }
    }

    (prepared, unresolved)
}

// ============================================================================
// DeployOrchestrator
// ============================================================================

pub struct DeployOrchestrator {
    client: Arc<EngineClient>,
    state: Mutex<DeployState>,
}

impl DeployOrchestrator {
    pub fn new(client: Arc<EngineClient>) -> Self {
        Self {
            client,
            state: Mutex::new(DeployState::Idle),
        }
    }

    pub fn state(&self) -> DeployState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: DeployState) {
        tracing::debug!(state = state.as_str(), "Deployment state");
        *self.state.lock().unwrap() = state;
    }

    /// Deploy a workflow graph. Failures come back as `success=false` with a
    /// descriptive message rather than as errors; partial engine-side state
    /// (created credentials, an inactive workflow) is never rolled back.
    pub async fn deploy(
        &self,
        workflow_name: &str,
        workflow_graph: &Value,
        credential_specs: &HashMap<String, CredentialSpec>,
        oauth_tokens: &HashMap<String, String>,
    ) -> DeployOutcome {
        self.set_state(DeployState::Preparing);

        let (credential_ids, failed) = self
            .setup_credentials(credential_specs, oauth_tokens)
            .await;
        if !failed.is_empty() {
            self.set_state(DeployState::Error);
            return DeployOutcome {
                workflow_id: String::new(),
                success: false,
                message: format!(
                    "Failed to deploy workflow: could not resolve credentials: {}",
                    failed.join(", ")
                ),
            };
        }

        let (prepared, unresolved) = prepare_workflow_graph(workflow_graph, &credential_ids);
        if !unresolved.is_empty() {
            tracing::warn!(
                unresolved = ?unresolved,
                "Workflow references credentials with no spec entry"
            );
        }

        self.set_state(DeployState::Deploying);
        let body = serde_json::json!({
            "name": workflow_name,
            // Created inactive; activation is a separate explicit step.
            "active": false,
            "nodes": prepared.get("nodes").cloned().unwrap_or(Value::Array(vec![])),
            "connections": prepared.get("connections").cloned().unwrap_or(Value::Object(Default::default())),
            "settings": prepared.get("settings").cloned().unwrap_or(Value::Object(Default::default())),
            "staticData": prepared.get("staticData").cloned().unwrap_or(Value::Null),
            "tags": WORKFLOW_TAGS,
        });

        let created = match self.client.create_workflow(&body).await {
            Ok(workflow) => workflow,
            Err(e) => {
                self.set_state(DeployState::Error);
                return DeployOutcome {
                    workflow_id: String::new(),
                    success: false,
                    message: with_unresolved_note(
                        format!("Failed to deploy workflow: {}", e),
                        &unresolved,
                    ),
                };
            }
        };

        if let Err(e) = self.client.activate_workflow(&created.id).await {
            self.set_state(DeployState::Error);
            return DeployOutcome {
                workflow_id: created.id.clone(),
                success: false,
                message: with_unresolved_note(
                    format!(
                        "Workflow \"{}\" was created (id {}) but activation failed: {}. \
                         The inactive workflow was not removed.",
                        workflow_name, created.id, e
                    ),
                    &unresolved,
                ),
            };
        }

        self.set_state(DeployState::Success);
        tracing::info!(workflow_id = %created.id, "Workflow deployed and activated");
        DeployOutcome {
            workflow_id: created.id,
            success: true,
            message: format!("Workflow \"{}\" deployed successfully", workflow_name),
        }
    }

    /// Upsert every credential spec by name. Per-credential failures are
    /// logged and collected; the rest still resolve.
    async fn setup_credentials(
        &self,
        credential_specs: &HashMap<String, CredentialSpec>,
        oauth_tokens: &HashMap<String, String>,
    ) -> (HashMap<String, String>, Vec<String>) {
        let mut credential_ids = HashMap::new();
        let mut failed = Vec::new();

        for (name, spec) in credential_specs {
            let mut data = spec.data.clone();
            if !data.is_object() {
                data = Value::Object(Default::default());
            }
            if let Some(token) = access_token_for_type(oauth_tokens, &spec.credential_type) {
                data["accessToken"] = Value::String(token.to_string());
            }
            let body = serde_json::json!({
                "name": name,
                "type": spec.credential_type,
                "data": data,
                "nodesAccess": spec.nodes_access,
            });

            let result = match self.client.find_credential_by_name(name).await {
                Some(existing) => self
                    .client
                    .update_credential(&existing.id, &body)
                    .await
                    .map(|c| c.id),
                None => self.client.create_credential(&body).await.map(|c| c.id),
            };

            match result {
                Ok(id) => {
                    credential_ids.insert(name.clone(), id);
                }
                Err(e) => {
                    let err = AppError::CredentialResolution(format!("{}: {}", name, e));
                    tracing::error!(credential = %name, error = %err, "Failed to set up credential");
                    failed.push(name.clone());
                }
            }
        }

        (credential_ids, failed)
    }

    /// Replace the `prompt` and `systemMessage` parameters of one node and
    /// resubmit the whole graph. Fetch-modify-resubmit with no version
    /// check: two concurrent updates race and the last write wins.
    pub async fn update_agent_prompt(
        &self,
        workflow_id: &str,
        node_id: &str,
        new_prompt: &str,
    ) -> Result<String, AppError> {
        let mut workflow = self.client.get_workflow(workflow_id).await?;

        let mut touched = false;
        for node in &mut workflow.nodes {
            if node.id != node_id {
                continue;
            }
            if node.parameters.contains_key("prompt") {
                node.parameters
                    .insert("prompt".into(), Value::String(new_prompt.to_string()));
                touched = true;
            }
            if node.parameters.contains_key("systemMessage") {
                node.parameters
                    .insert("systemMessage".into(), Value::String(new_prompt.to_string()));
                touched = true;
            }
        }
        if !touched {
            return Err(AppError::NotFound(format!(
                "node {} has no prompt parameters in workflow {}",
                node_id, workflow_id
            )));
        }

        self.client.update_workflow(workflow_id, &workflow).await?;
        Ok(format!(
            "Agent prompt updated successfully in workflow {}",
            workflow_id
        ))
    }

    /// Active flag plus the latest execution. Lookup failures degrade to
    /// inactive so status polling never throws.
    pub async fn workflow_status(&self, workflow_id: &str) -> WorkflowStatus {
        match self.client.get_workflow(workflow_id).await {
            Ok(workflow) => WorkflowStatus {
                active: workflow.active,
                last_execution: self.client.latest_execution(workflow_id).await,
            },
            Err(e) => {
                tracing::error!(workflow_id, error = %e, "Failed to get workflow status");
                WorkflowStatus {
                    active: false,
                    last_execution: None,
                }
            }
        }
    }
}

fn with_unresolved_note(mut message: String, unresolved: &[String]) -> String {
    if !unresolved.is_empty() {
        message.push_str(&format!(
            " (unresolved credential references: {})",
            unresolved.join(", ")
        ));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_access_token_resolved_by_provider_mapping() {
        let tokens = tokens(&[("google", "g-token"), ("slack", "s-token")]);
        assert_eq!(
            access_token_for_type(&tokens, "googleOAuth2Api"),
            Some("g-token")
        );
        assert_eq!(
            access_token_for_type(&tokens, "slackOAuth2Api"),
            Some("s-token")
        );
        assert_eq!(access_token_for_type(&tokens, "atlassianOAuth2Api"), None);
    }

    #[test]
    fn test_access_token_falls_back_to_type_key() {
        let tokens = tokens(&[("customApi", "c-token")]);
        assert_eq!(access_token_for_type(&tokens, "customApi"), Some("c-token"));
    }

    fn sample_graph() -> Value {
        serde_json::json!({
            "nodes": [
                {
                    "id": "gmail-trigger",
                    "type": "n8n-nodes-base.gmailTrigger",
                    "position": [240, 300],
                    "parameters": {},
                    "credentials": { "googleOAuth2Api": "gmail-cred" }
                },
                {
                    "id": "slack-send",
                    "type": "n8n-nodes-base.slack",
                    "position": [460, 300],
                    "parameters": {},
                    "credentials": { "slackOAuth2Api": "slack-cred" }
                },
                {
                    "id": "plain",
                    "type": "n8n-nodes-base.function",
                    "position": [680, 300],
                    "parameters": {}
                }
            ],
            "connections": {}
        })
    }

    #[test]
    fn test_prepare_rewrites_mapped_references() {
        let mut ids = HashMap::new();
        ids.insert("gmail-cred".to_string(), "cred-1".to_string());
        ids.insert("slack-cred".to_string(), "cred-2".to_string());

        let (prepared, unresolved) = prepare_workflow_graph(&sample_graph(), &ids);
        assert!(unresolved.is_empty());
        assert_eq!(
            prepared["nodes"][0]["credentials"]["googleOAuth2Api"],
            serde_json::json!({"id": "cred-1", "name": "gmail-cred"})
        );
        assert_eq!(
            prepared["nodes"][1]["credentials"]["slackOAuth2Api"],
            serde_json::json!({"id": "cred-2", "name": "slack-cred"})
        );
    }

    #[test]
    fn test_prepare_leaves_unmapped_references_untouched() {
        let mut ids = HashMap::new();
        ids.insert("gmail-cred".to_string(), "cred-1".to_string());

        let (prepared, unresolved) = prepare_workflow_graph(&sample_graph(), &ids);
        assert_eq!(unresolved, vec!["slack-cred".to_string()]);
        // The unmapped reference stays a plain name for the engine to reject.
        assert_eq!(
            prepared["nodes"][1]["credentials"]["slackOAuth2Api"],
            serde_json::json!("slack-cred")
        );
    }

    #[test]
    fn test_unresolved_note_appended() {
        let message = with_unresolved_note(
            "Failed to deploy workflow: engine API error".into(),
            &["slack-cred".to_string()],
        );
        assert!(message.contains("unresolved credential references: slack-cred"));
    }
}
