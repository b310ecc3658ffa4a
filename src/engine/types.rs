//! Wire types for the automation engine's REST surface.
//!
//! Workflow graphs are dynamic on the engine side; nodes carry a generic
//! parameters bag and unknown fields round-trip untouched through the
//! flattened `extra` maps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fixed tags applied to every workflow this system creates.
pub const WORKFLOW_TAGS: [&str; 2] = ["auto-generated", "ai-created"];

/// Health-check paths probed in order. Public API deployments often 404 on
/// the first entries.
pub const HEALTH_PATHS: [&str; 3] = ["/healthz", "/health", "/api/v1/health"];

// ============================================================================
// Workflow graph
// ============================================================================

/// One node of an engine workflow. Only the structurally required fields are
/// modeled; node-kind-specific configuration stays inside `parameters` and
/// unknown kinds pass through unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub position: Value,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Pre-deployment: `{credentialType: "name"}`. Post-rewrite:
    /// `{credentialType: {"id": ..., "name": ...}}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An engine-side workflow as returned by the workflows API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineWorkflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub connections: Value,
    #[serde(default)]
    pub settings: Value,
    #[serde(default)]
    pub static_data: Value,
    #[serde(default)]
    pub tags: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Credentials
// ============================================================================

/// Caller-supplied spec for one named engine credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSpec {
    #[serde(rename = "type")]
    pub credential_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub nodes_access: Vec<Value>,
}

/// An engine-side credential record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineCredential {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub credential_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub nodes_access: Vec<Value>,
}

// ============================================================================
// Deployment
// ============================================================================

/// Per-attempt deployment state. Terminal states require a fresh `deploy`
/// call; there are no automatic retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployState {
    Idle,
    Preparing,
    Deploying,
    Success,
    Error,
}

impl DeployState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployState::Idle => "idle",
            DeployState::Preparing => "preparing",
            DeployState::Deploying => "deploying",
            DeployState::Success => "success",
            DeployState::Error => "error",
        }
    }
}

/// Outcome of one deployment attempt. Failures are reported here rather
/// than as errors so the UI can render the message directly.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutcome {
    pub workflow_id: String,
    pub success: bool,
    pub message: String,
}

/// Engine workflow status joined with its most recent execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_execution: Option<Value>,
}

/// Connectivity probe result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    pub version: String,
    pub is_connected: bool,
}
