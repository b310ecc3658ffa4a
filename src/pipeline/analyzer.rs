//! Intent Analyzer — turns free-text automation intent into structured
//! requirements via a text-generation backend, with a degraded-mode fallback
//! when the backend rejects our credentials.

use async_trait::async_trait;

use crate::error::AppError;

use super::parser::{extract_json_by_key, strip_code_fences};
use super::prompts;
use super::types::{
    Complexity, ConnectionRequirement, PromptAnalysis, TemplateValidation, WorkflowRequirement,
};

// ============================================================================
// Text-generation backend seam
// ============================================================================

/// One completion request: fixed system instructions plus a user prompt.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: &'static str,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Abstraction over the text-generation backend.
///
/// Implementations map authorization failures to `AppError::Auth` and all
/// other transport/status failures to `AppError::AnalysisBackend`, so the
/// analyzer can apply its documented auth-failure fallback.
#[async_trait]
pub trait TextGenBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AppError>;
}

/// OpenAI-compatible chat-completions backend.
pub struct OpenAiBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("failed to build reqwest client");
        Self {
            http,
            base_url,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl TextGenBackend for OpenAiBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AppError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::AnalysisBackend(format!("request failed: {}", e)))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AppError::Auth(format!(
                "text-generation backend rejected credentials (HTTP {})",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(AppError::AnalysisBackend(format!(
                "text-generation backend returned HTTP {}",
                status.as_u16()
            )));
        }

        let payload: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AppError::AnalysisBackend(format!("invalid response body: {}", e)))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::AnalysisBackend("no response content from backend".into()))
    }
}

// ============================================================================
// LLM-only complexity correction
// ============================================================================

/// Substrings that mark a task as implementable with a single LLM step.
/// Matched case-insensitively against name + description.
const LLM_ONLY_SIGNALS: &[&str] = &["summariz", "categor", "classif", "extract", "tag"];

/// True when the requirement text describes an LLM-only task (summarize,
/// categorize, classify, extract, tag). Intentionally a plain substring
/// check — inspectable and overridable, never a semantic classifier.
pub fn is_llm_only_task(text: &str) -> bool {
    let lower = text.to_lowercase();
    LLM_ONLY_SIGNALS.iter().any(|signal| lower.contains(signal))
}

/// Force `simple` complexity for LLM-only tasks. Applied after generation —
/// the backend's complexity estimate is not trusted for this class of task.
fn correct_complexity(requirements: &mut WorkflowRequirement) {
    let text = format!("{} {}", requirements.name, requirements.description);
    if is_llm_only_task(&text) && requirements.estimated_complexity != Complexity::Simple {
        tracing::debug!(
            name = %requirements.name,
            was = requirements.estimated_complexity.as_str(),
            "Reclassifying LLM-only task as simple"
        );
        requirements.estimated_complexity = Complexity::Simple;
    }
}

// ============================================================================
// IntentAnalyzer
// ============================================================================

pub struct IntentAnalyzer {
    backend: Box<dyn TextGenBackend>,
}

impl IntentAnalyzer {
    pub fn new(backend: Box<dyn TextGenBackend>) -> Self {
        Self { backend }
    }

    /// Analyze a user prompt into a `PromptAnalysis`.
    ///
    /// Backend authorization failures do not propagate: the UI pipeline must
    /// keep working without a configured backend key, so those produce a
    /// low-confidence placeholder instead. Every other backend failure is
    /// fatal to this call.
    pub async fn analyze(
        &self,
        prompt: &str,
        conversation_context: Option<&str>,
    ) -> Result<PromptAnalysis, AppError> {
        let request = CompletionRequest {
            system: prompts::ANALYSIS_SYSTEM_PROMPT,
            user: prompts::build_analysis_prompt(prompt, conversation_context),
            temperature: 0.3,
            max_tokens: 1500,
        };

        let content = match self.backend.complete(request).await {
            Ok(content) => content,
            Err(AppError::Auth(reason)) => {
                tracing::warn!(reason = %reason, "Analysis backend auth failure, using local fallback");
                return Ok(auth_fallback_analysis(prompt));
            }
            Err(e) => return Err(e),
        };

        let mut analysis = parse_analysis(&content)?;
        correct_complexity(&mut analysis.requirements);
        Ok(analysis)
    }

    /// Secondary analysis: derive provider/services/scopes tuples from the
    /// prompt. Used only when the primary analysis did not already populate
    /// `requiredConnections`.
    pub async fn extract_connection_requirements(
        &self,
        prompt: &str,
    ) -> Result<Vec<ConnectionRequirement>, AppError> {
        let request = CompletionRequest {
            system: prompts::CONNECTION_EXTRACTION_SYSTEM_PROMPT,
            user: prompts::build_connection_extraction_prompt(prompt),
            temperature: 0.3,
            max_tokens: 800,
        };
        let content = self.backend.complete(request).await?;
        let stripped = strip_code_fences(&content);
        serde_json::from_str(&stripped).map_err(|e| {
            AppError::AnalysisFormat(format!("connection requirements not valid JSON: {}", e))
        })
    }

    /// Ask the backend for a ready-to-deploy workflow graph. Markdown fences
    /// are stripped before parsing; anything still unparsable is a
    /// `TemplateSynthesis` failure and is not retried here.
    pub async fn generate_workflow_template(
        &self,
        requirements: &WorkflowRequirement,
    ) -> Result<serde_json::Value, AppError> {
        let request = CompletionRequest {
            system: prompts::SYNTHESIS_SYSTEM_PROMPT,
            user: prompts::build_synthesis_prompt(requirements),
            temperature: 0.1,
            max_tokens: 2000,
        };
        let content = self.backend.complete(request).await?;
        let stripped = strip_code_fences(&content);
        serde_json::from_str(&stripped).map_err(|e| {
            tracing::error!(error = %e, "Synthesized workflow graph is not valid JSON");
            AppError::TemplateSynthesis(format!("generated graph is not valid JSON: {}", e))
        })
    }

    /// Advisory check of a synthesized graph. The verdict is informational;
    /// the caller decides whether to proceed on invalid.
    pub async fn validate_workflow_template(
        &self,
        graph: &serde_json::Value,
    ) -> Result<TemplateValidation, AppError> {
        let request = CompletionRequest {
            system: prompts::VALIDATION_SYSTEM_PROMPT,
            user: prompts::build_validation_prompt(graph),
            temperature: 0.1,
            max_tokens: 500,
        };
        let content = self.backend.complete(request).await?;
        let stripped = strip_code_fences(&content);
        serde_json::from_str(&stripped)
            .map_err(|e| AppError::AnalysisFormat(format!("validation verdict not valid JSON: {}", e)))
    }
}

/// Parse backend output into a `PromptAnalysis`, tolerating prose or fence
/// wrappers around the JSON object.
fn parse_analysis(content: &str) -> Result<PromptAnalysis, AppError> {
    let stripped = strip_code_fences(content);
    if let Ok(analysis) = serde_json::from_str::<PromptAnalysis>(&stripped) {
        return Ok(analysis);
    }
    let val = extract_json_by_key(content, &["requirements"]).ok_or_else(|| {
        AppError::AnalysisFormat("backend response contains no analysis JSON object".into())
    })?;
    serde_json::from_value(val)
        .map_err(|e| AppError::AnalysisFormat(format!("analysis JSON has wrong shape: {}", e)))
}

/// Placeholder returned when the backend rejects our credentials: low
/// confidence, no connections, explicitly labeled so the UI can tell the
/// user what happened without blocking the flow.
fn auth_fallback_analysis(prompt: &str) -> PromptAnalysis {
    PromptAnalysis {
        requirements: WorkflowRequirement {
            name: "Workflow Draft".into(),
            description: format!("Draft plan for: {}", prompt),
            required_connections: vec![],
            estimated_complexity: Complexity::Simple,
            suggested_template: None,
            additional_notes: Some(
                "Generated with local fallback due to missing/invalid text-generation API key."
                    .into(),
            ),
            strategy: Some("Use available integrations and an LLM step to achieve the goal.".into()),
            follow_up_questions: vec![],
            clarifications: vec![],
        },
        confidence: 0.1,
        reasoning: "Fallback used because the text-generation backend rejected credentials".into(),
        needs_clarification: false,
        suggested_questions: vec![],
    }
}
