//! Instruction sets sent to the text-generation backend.
//!
//! One builder per operation; each pairs a fixed system instruction with a
//! user prompt assembled from the request at hand.

use super::types::WorkflowRequirement;

// ============================================================================
// Prompt analysis
// ============================================================================

pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are an expert workflow automation analyst with deep knowledge of n8n, OAuth integrations, and business process automation.

Your role is to:
1. Analyze user prompts contextually and intelligently
2. Identify what the user wants to automate
3. Determine required OAuth connections and their specific use cases
4. Generate detailed, contextual strategies (not generic ones)
5. Ask follow-up questions ONLY for CRITICAL missing information
6. Consider edge cases and potential failure scenarios
7. Suggest specific implementation approaches
8. Use conversation memory to provide context-aware responses

IMPORTANT:
- Do NOT label workflows as "complex" if they can be implemented with a single LLM step (e.g., summarizing, categorizing, extracting, tagging). Prefer "simple"; use "medium" only if there are multiple integrations or branching logic.

Available OAuth providers and their capabilities:
- Google: Gmail (email monitoring, filtering, parsing), Drive (file operations), Calendar (event management)
- Slack: Channels (message monitoring, posting), Messages (communication workflows), Users (team management)
- Jira: Issues (ticket creation, updates, tracking), Projects (project management), Boards (agile workflows)
- Microsoft: Outlook (email processing), Teams (communication), SharePoint (document management)

For strategy generation, be specific and contextual:
- Don't use generic keywords like "bug", "error"
- Analyze the actual use case and suggest specific detection methods
- Consider the business context and user's specific needs
- Think about edge cases and error handling

Response format:
{
  "requirements": {
    "name": "Specific workflow name",
    "description": "Detailed description of what this workflow does",
    "requiredConnections": ["google", "slack"],
    "estimatedComplexity": "simple|medium|complex",
    "suggestedTemplate": "template_id_or_none",
    "additionalNotes": "Implementation notes",
    "strategy": "Detailed, contextual strategy for this specific use case",
    "followUpQuestions": ["Question 1", "Question 2"],
    "clarifications": ["Clarification needed for X"]
  },
  "confidence": 0.95,
  "reasoning": "Why this analysis was made",
  "needsClarification": true/false,
  "suggestedQuestions": ["What specific issues should trigger tickets?", "How should priority be determined?"]
}"#;

/// Build the user prompt for an analysis call, optionally embedding
/// conversation context from memory.
pub fn build_analysis_prompt(prompt: &str, conversation_context: Option<&str>) -> String {
    let mut out = String::new();
    out.push_str(&format!("Analyze this user prompt: \"{}\"\n\n", prompt));
    if let Some(ctx) = conversation_context.filter(|c| !c.is_empty()) {
        out.push_str("Conversation Context:\n");
        out.push_str(ctx);
        out.push_str("\n\n");
    }
    out.push_str(
        "Provide a detailed, contextual analysis. Only ask for clarifications if the \
         information is CRITICAL for workflow creation. Make reasonable assumptions for \
         non-critical details. Generate a strategy that is specific to this use case, \
         not generic.",
    );
    out
}

// ============================================================================
// Workflow graph synthesis
// ============================================================================

pub const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You are an expert n8n workflow designer. Create a complete n8n workflow JSON template based on the given requirements.

IMPORTANT: You must respond with ONLY valid JSON. Do not include any explanatory text, markdown, or other formatting.

The workflow should:
1. Include all necessary nodes for the specified connections
2. Have proper OAuth credential placeholders
3. Follow n8n best practices
4. Be ready for deployment

Response format: Return ONLY the n8n workflow JSON object, no other text."#;

/// Build the user prompt for graph synthesis from approved requirements.
pub fn build_synthesis_prompt(requirements: &WorkflowRequirement) -> String {
    let connections: Vec<&str> = requirements
        .required_connections
        .iter()
        .map(|p| p.as_str())
        .collect();

    let mut out = String::new();
    out.push_str("Create an n8n workflow for:\n");
    out.push_str(&format!("- Name: {}\n", requirements.name));
    out.push_str(&format!("- Description: {}\n", requirements.description));
    out.push_str(&format!("- Required connections: {}\n", connections.join(", ")));
    out.push_str(&format!(
        "- Additional notes: {}\n\n",
        requirements.additional_notes.as_deref().unwrap_or("None")
    ));
    out.push_str("Generate ONLY the n8n workflow JSON template.");
    out
}

// ============================================================================
// Connection requirement extraction
// ============================================================================

pub const CONNECTION_EXTRACTION_SYSTEM_PROMPT: &str = r#"You are an expert at identifying OAuth connection requirements from user prompts.

Available providers and their services:
- Google: Gmail (emails), Drive (files), Calendar (events)
- Slack: Channels (workspace), Messages (communication), Users (team)
- Jira: Issues (tickets), Projects (management), Boards (agile)
- Microsoft: Outlook (emails), Teams (communication), SharePoint (files)

For each required connection, provide:
- provider: The OAuth provider name
- services: Array of specific services needed
- scopes: Array of OAuth scopes required
- description: Why this connection is needed

Response format: JSON array of ConnectionRequirement objects."#;

pub fn build_connection_extraction_prompt(prompt: &str) -> String {
    format!(
        "Analyze this prompt and identify all required OAuth connections: \"{}\"",
        prompt
    )
}

// ============================================================================
// Advisory graph validation
// ============================================================================

pub const VALIDATION_SYSTEM_PROMPT: &str = r#"You are an expert n8n workflow validator. Check if the provided workflow template is valid and complete.

Validation criteria:
1. All nodes have proper configuration
2. OAuth credentials are properly referenced
3. Workflow structure is logical
4. No missing required fields
5. Follows n8n best practices

Response format:
{
  "isValid": true/false,
  "errors": ["error1", "error2"]
}"#;

pub fn build_validation_prompt(graph: &serde_json::Value) -> String {
    format!(
        "Validate this n8n workflow template: {}",
        serde_json::to_string_pretty(graph).unwrap_or_else(|_| graph.to_string())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{Complexity, Provider};

    fn sample_requirement() -> WorkflowRequirement {
        WorkflowRequirement {
            name: "Email Triage".into(),
            description: "Route support email to Slack".into(),
            required_connections: vec![Provider::Google, Provider::Slack],
            estimated_complexity: Complexity::Medium,
            suggested_template: None,
            additional_notes: Some("Only the support inbox".into()),
            strategy: None,
            follow_up_questions: vec![],
            clarifications: vec![],
        }
    }

    #[test]
    fn test_analysis_prompt_embeds_context() {
        let p = build_analysis_prompt("watch my inbox", Some("Original Request: triage email"));
        assert!(p.contains("watch my inbox"));
        assert!(p.contains("Conversation Context:"));
        assert!(p.contains("triage email"));
    }

    #[test]
    fn test_analysis_prompt_skips_empty_context() {
        let p = build_analysis_prompt("watch my inbox", Some(""));
        assert!(!p.contains("Conversation Context:"));
    }

    #[test]
    fn test_synthesis_prompt_lists_connections() {
        let p = build_synthesis_prompt(&sample_requirement());
        assert!(p.contains("google, slack"));
        assert!(p.contains("Only the support inbox"));
    }

    #[test]
    fn test_synthesis_prompt_defaults_notes() {
        let mut req = sample_requirement();
        req.additional_notes = None;
        assert!(build_synthesis_prompt(&req).contains("- Additional notes: None"));
    }
}
