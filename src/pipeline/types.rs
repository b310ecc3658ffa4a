use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Providers
// ============================================================================

/// An external OAuth-authenticated service the dashboard can connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Slack,
    Jira,
    Microsoft,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Google,
        Provider::Slack,
        Provider::Jira,
        Provider::Microsoft,
    ];

    /// Parse a provider identifier. Returns `None` for anything outside the
    /// known set — generated requirements are filtered through this so the
    /// `requiredConnections ⊆ known providers` invariant holds structurally.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "google" => Some(Provider::Google),
            "slack" => Some(Provider::Slack),
            "jira" => Some(Provider::Jira),
            "microsoft" => Some(Provider::Microsoft),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Slack => "slack",
            Provider::Jira => "jira",
            Provider::Microsoft => "microsoft",
        }
    }

    /// Display name with the same capitalization the dashboard shows.
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Google => "Google",
            Provider::Slack => "Slack",
            Provider::Jira => "Jira",
            Provider::Microsoft => "Microsoft",
        }
    }

    /// Engine-side credential type for this provider's OAuth connection.
    pub fn credential_type(&self) -> &'static str {
        match self {
            Provider::Google => "googleOAuth2Api",
            Provider::Slack => "slackOAuth2Api",
            Provider::Jira => "atlassianOAuth2Api",
            Provider::Microsoft => "microsoftOAuth2Api",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Provider {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Provider::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown provider '{}'", s)))
    }
}

/// Deserialize a provider list leniently: entries outside the known provider
/// set are dropped instead of failing the whole analysis.
pub fn deserialize_known_providers<'de, D>(deserializer: D) -> Result<Vec<Provider>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<String> = Vec::deserialize(deserializer)?;
    let mut providers = Vec::new();
    for entry in raw {
        match Provider::parse(&entry) {
            Some(p) if !providers.contains(&p) => providers.push(p),
            Some(_) => {}
            None => tracing::debug!(provider = %entry, "Dropping unknown provider from analysis"),
        }
    }
    Ok(providers)
}

// ============================================================================
// Complexity
// ============================================================================

/// Estimated workflow complexity. Ordered: simple < medium < complex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    fn ordinal(&self) -> u8 {
        match self {
            Complexity::Simple => 0,
            Complexity::Medium => 1,
            Complexity::Complex => 2,
        }
    }

    /// Ordinal distance used by template scoring: 0 = exact, 1 = one level
    /// apart (simple↔medium, medium↔complex), 2 = opposite ends.
    pub fn distance(&self, other: Complexity) -> u8 {
        self.ordinal().abs_diff(other.ordinal())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Medium => "medium",
            Complexity::Complex => "complex",
        }
    }
}

// ============================================================================
// Analysis results
// ============================================================================

/// Structured automation intent derived from free text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRequirement {
    pub name: String,
    pub description: String,
    #[serde(default, deserialize_with = "deserialize_known_providers")]
    pub required_connections: Vec<Provider>,
    #[serde(default)]
    pub estimated_complexity: Complexity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
    #[serde(default)]
    pub clarifications: Vec<String>,
}

/// A `WorkflowRequirement` with provenance. Immutable once returned;
/// re-analysis after clarification answers supersedes rather than mutates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptAnalysis {
    pub requirements: WorkflowRequirement,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default)]
    pub suggested_questions: Vec<String>,
}

/// Secondary analysis output: one OAuth connection the workflow needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRequirement {
    pub provider: String,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// Result of the full analysis pipeline, handed back to the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowAnalysisResult {
    pub analysis: PromptAnalysis,
    pub project_plan: String,
    pub required_connections: Vec<Provider>,
    pub estimated_complexity: Complexity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_template: Option<String>,
    pub logs: Vec<String>,
}

/// Advisory verdict on a synthesized workflow graph. Non-fatal; the caller
/// decides whether to proceed on invalid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateValidation {
    pub is_valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse_known_set() {
        assert_eq!(Provider::parse("Google"), Some(Provider::Google));
        assert_eq!(Provider::parse(" slack "), Some(Provider::Slack));
        assert_eq!(Provider::parse("github"), None);
        assert_eq!(Provider::parse(""), None);
    }

    #[test]
    fn test_complexity_distance() {
        assert_eq!(Complexity::Simple.distance(Complexity::Simple), 0);
        assert_eq!(Complexity::Simple.distance(Complexity::Medium), 1);
        assert_eq!(Complexity::Medium.distance(Complexity::Complex), 1);
        assert_eq!(Complexity::Simple.distance(Complexity::Complex), 2);
    }

    #[test]
    fn test_requirement_drops_unknown_providers() {
        let json = r#"{
            "name": "Email triage",
            "description": "Sort support email",
            "requiredConnections": ["google", "hubspot", "slack", "google"],
            "estimatedComplexity": "medium"
        }"#;
        let req: WorkflowRequirement = serde_json::from_str(json).unwrap();
        assert_eq!(
            req.required_connections,
            vec![Provider::Google, Provider::Slack]
        );
        assert_eq!(req.estimated_complexity, Complexity::Medium);
    }

    #[test]
    fn test_analysis_tolerates_missing_optionals() {
        let json = r#"{
            "requirements": {"name": "X", "description": "Y"},
            "confidence": 0.8
        }"#;
        let analysis: PromptAnalysis = serde_json::from_str(json).unwrap();
        assert!(!analysis.needs_clarification);
        assert!(analysis.suggested_questions.is_empty());
        assert!(analysis.requirements.required_connections.is_empty());
    }
}
