//! Workflow synthesizer — narrow "give me a graph for this requirement"
//! seam between analysis and deployment, so the orchestrator never depends
//! on the full analyzer surface.

use std::sync::Arc;

use crate::error::AppError;

use super::analyzer::IntentAnalyzer;
use super::types::{TemplateValidation, WorkflowRequirement};

pub struct WorkflowSynthesizer {
    analyzer: Arc<IntentAnalyzer>,
}

impl WorkflowSynthesizer {
    pub fn new(analyzer: Arc<IntentAnalyzer>) -> Self {
        Self { analyzer }
    }

    /// Produce a ready-to-deploy workflow graph for approved requirements.
    pub async fn synthesize(
        &self,
        requirements: &WorkflowRequirement,
    ) -> Result<serde_json::Value, AppError> {
        let graph = self.analyzer.generate_workflow_template(requirements).await?;
        tracing::info!(workflow = %requirements.name, "Workflow graph synthesized");
        Ok(graph)
    }

    /// Advisory validation of a synthesized graph.
    pub async fn validate(
        &self,
        graph: &serde_json::Value,
    ) -> Result<TemplateValidation, AppError> {
        self.analyzer.validate_workflow_template(graph).await
    }
}
