//! Template catalog — seeded, in-memory store of reusable workflow graphs
//! with weighted scoring against analyzed requirements.
//!
//! Scoring is pure arithmetic over fixed weights (connections 0.4,
//! complexity 0.3, text similarity 0.3) and fully deterministic: equal
//! inputs and catalog state always yield the same match.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{Complexity, Provider, WorkflowRequirement};

// ============================================================================
// Catalog shapes
// ============================================================================

/// One stored workflow template: metadata plus an opaque engine graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub complexity: Complexity,
    pub required_connections: Vec<Provider>,
    /// Ready-to-deploy engine graph, kept opaque to the catalog.
    pub graph: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A scored catalog hit. `score` is in [0, 1]; results at or below the 0.3
/// floor are discarded before this is ever constructed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMatch {
    pub template: WorkflowTemplate,
    pub score: f64,
    pub reasoning: String,
}

/// Minimum total score for a candidate to count as a match.
const MATCH_SCORE_FLOOR: f64 = 0.3;

// ============================================================================
// Text similarity
// ============================================================================

/// Word-overlap similarity: shared words over the size of the combined
/// vocabulary. Crude on purpose; catalog text is short and keyword-heavy.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let words_a: Vec<&str> = a.split_whitespace().collect();
    let words_b: Vec<&str> = b.split_whitespace().collect();

    let common = words_a.iter().filter(|w| words_b.contains(w)).count();
    let total: std::collections::HashSet<&&str> =
        words_a.iter().chain(words_b.iter()).collect();

    if total.is_empty() {
        0.0
    } else {
        common as f64 / total.len() as f64
    }
}

// ============================================================================
// TemplateCatalog
// ============================================================================

/// In-memory catalog, seeded with the builtin templates at construction.
pub struct TemplateCatalog {
    templates: Vec<WorkflowTemplate>,
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self {
            templates: builtin_templates(),
        }
    }

    pub fn all(&self) -> &[WorkflowTemplate] {
        &self.templates
    }

    pub fn get_by_id(&self, id: &str) -> Option<&WorkflowTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn list_by_category(&self, category: &str) -> Vec<&WorkflowTemplate> {
        self.templates
            .iter()
            .filter(|t| t.category == category)
            .collect()
    }

    /// Templates requiring at least one of the given connections.
    pub fn list_by_connections(&self, connections: &[Provider]) -> Vec<&WorkflowTemplate> {
        self.templates
            .iter()
            .filter(|t| {
                connections
                    .iter()
                    .any(|c| t.required_connections.contains(c))
            })
            .collect()
    }

    /// Substring search across name, description, tags, and category.
    pub fn search(&self, query: &str) -> Vec<&WorkflowTemplate> {
        let q = query.to_lowercase();
        self.templates
            .iter()
            .filter(|t| {
                t.name.to_lowercase().contains(&q)
                    || t.description.to_lowercase().contains(&q)
                    || t.tags.iter().any(|tag| tag.to_lowercase().contains(&q))
                    || t.category.to_lowercase().contains(&q)
            })
            .collect()
    }

    pub fn categories(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for t in &self.templates {
            if !seen.contains(&t.category) {
                seen.push(t.category.clone());
            }
        }
        seen
    }

    pub fn tags(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for tag in self.templates.iter().flat_map(|t| &t.tags) {
            if !seen.contains(tag) {
                seen.push(tag.clone());
            }
        }
        seen
    }

    pub fn create(
        &mut self,
        name: String,
        description: String,
        category: String,
        tags: Vec<String>,
        complexity: Complexity,
        required_connections: Vec<Provider>,
        graph: serde_json::Value,
    ) -> &WorkflowTemplate {
        let now = Utc::now();
        self.templates.push(WorkflowTemplate {
            id: Uuid::new_v4().to_string(),
            name,
            description,
            category,
            tags,
            complexity,
            required_connections,
            graph,
            created_at: now,
            updated_at: now,
        });
        self.templates.last().unwrap()
    }

    /// Apply an in-place edit to a stored template, refreshing `updated_at`.
    /// Returns `None` when no template has the given id.
    pub fn update(
        &mut self,
        id: &str,
        apply: impl FnOnce(&mut WorkflowTemplate),
    ) -> Option<&WorkflowTemplate> {
        let template = self.templates.iter_mut().find(|t| t.id == id)?;
        apply(template);
        template.updated_at = Utc::now();
        Some(&*template)
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.templates.len();
        self.templates.retain(|t| t.id != id);
        self.templates.len() < before
    }

    /// Score every template against the requirement and return the highest
    /// scorer above the floor. Ties resolve to the earliest catalog entry,
    /// so repeated calls over the same state return the same template.
    pub fn find_best_match(&self, requirements: &WorkflowRequirement) -> Option<TemplateMatch> {
        let mut best: Option<TemplateMatch> = None;

        for template in &self.templates {
            let (score, reasoning) = score_template(template, requirements);
            if score <= MATCH_SCORE_FLOOR {
                continue;
            }
            let beats_current = best.as_ref().map_or(true, |b| score > b.score);
            if beats_current {
                best = Some(TemplateMatch {
                    template: template.clone(),
                    score,
                    reasoning,
                });
            }
        }

        if let Some(m) = &best {
            tracing::debug!(template = %m.template.id, score = m.score, "Matched catalog template");
        }
        best
    }
}

/// Weighted score for one candidate: connection overlap ×0.4, complexity
/// 0.3 exact / 0.2 one level apart, mean name+description similarity ×0.3.
fn score_template(
    template: &WorkflowTemplate,
    requirements: &WorkflowRequirement,
) -> (f64, String) {
    let mut score = 0.0;
    let mut reasoning: Vec<String> = Vec::new();

    let overlap = requirements
        .required_connections
        .iter()
        .filter(|c| template.required_connections.contains(c))
        .count();
    // A requirement with no connections contributes nothing here rather
    // than dividing by zero.
    if !requirements.required_connections.is_empty() {
        score += (overlap as f64 / requirements.required_connections.len() as f64) * 0.4;
    }
    reasoning.push(format!(
        "Connection match: {}/{}",
        overlap,
        requirements.required_connections.len()
    ));

    match template
        .complexity
        .distance(requirements.estimated_complexity)
    {
        0 => {
            score += 0.3;
            reasoning.push("Complexity match".into());
        }
        1 => {
            score += 0.2;
            reasoning.push("Complexity close match".into());
        }
        _ => {}
    }

    let name_sim = text_similarity(
        &requirements.name.to_lowercase(),
        &template.name.to_lowercase(),
    );
    let desc_sim = text_similarity(
        &requirements.description.to_lowercase(),
        &template.description.to_lowercase(),
    );
    let similarity = ((name_sim + desc_sim) / 2.0) * 0.3;
    score += similarity;
    reasoning.push(format!(
        "Name/description similarity: {}%",
        (similarity * 100.0).round() as i64
    ));

    (score, reasoning.join(", "))
}

// ============================================================================
// Builtin seed templates
// ============================================================================

fn builtin_templates() -> Vec<WorkflowTemplate> {
    let now = Utc::now();
    let seed = |id: &str,
                name: &str,
                description: &str,
                category: &str,
                tags: &[&str],
                complexity: Complexity,
                connections: &[Provider],
                graph: serde_json::Value| WorkflowTemplate {
        id: id.into(),
        name: name.into(),
        description: description.into(),
        category: category.into(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        complexity,
        required_connections: connections.to_vec(),
        graph,
        created_at: now,
        updated_at: now,
    };

    vec![
        seed(
            "email-summarizer",
            "Email Summarizer",
            "Automatically summarize emails and send summaries to Slack",
            "communication",
            &["email", "slack", "summarization", "automation"],
            Complexity::Medium,
            &[Provider::Google, Provider::Slack],
            serde_json::json!({
                "name": "Email Summarizer",
                "nodes": [
                    {
                        "id": "gmail-trigger",
                        "type": "n8n-nodes-base.gmailTrigger",
                        "position": [240, 300],
                        "parameters": {
                            "authentication": "oAuth2",
                            "resource": "message",
                            "operation": "getAll",
                            "returnAll": false,
                            "limit": 10
                        }
                    },
                    {
                        "id": "openai-summarize",
                        "type": "n8n-nodes-base.openAi",
                        "position": [460, 300],
                        "parameters": {
                            "authentication": "apiKey",
                            "resource": "chat",
                            "operation": "completion",
                            "model": "gpt-3.5-turbo",
                            "messages": {
                                "values": [
                                    {
                                        "role": "system",
                                        "content": "Summarize the following email in 2-3 sentences:"
                                    },
                                    {
                                        "role": "user",
                                        "content": "={{ $json.snippet }}"
                                    }
                                ]
                            }
                        }
                    },
                    {
                        "id": "slack-send",
                        "type": "n8n-nodes-base.slack",
                        "position": [680, 300],
                        "parameters": {
                            "authentication": "oAuth2",
                            "resource": "message",
                            "operation": "post",
                            "channel": "general",
                            "text": "📧 Email Summary: {{ $json.choices[0].message.content }}"
                        }
                    }
                ],
                "connections": {
                    "gmail-trigger": {
                        "main": [[{ "node": "openai-summarize", "type": "main", "index": 0 }]]
                    },
                    "openai-summarize": {
                        "main": [[{ "node": "slack-send", "type": "main", "index": 0 }]]
                    }
                }
            }),
        ),
        seed(
            "jira-slack-notifications",
            "Jira to Slack Notifications",
            "Send Jira issue updates to Slack channels",
            "project-management",
            &["jira", "slack", "notifications", "project"],
            Complexity::Simple,
            &[Provider::Jira, Provider::Slack],
            serde_json::json!({
                "name": "Jira to Slack Notifications",
                "nodes": [
                    {
                        "id": "jira-webhook",
                        "type": "n8n-nodes-base.webhook",
                        "position": [240, 300],
                        "parameters": {
                            "httpMethod": "POST",
                            "path": "jira-webhook",
                            "responseMode": "responseNode"
                        }
                    },
                    {
                        "id": "slack-notify",
                        "type": "n8n-nodes-base.slack",
                        "position": [460, 300],
                        "parameters": {
                            "authentication": "oAuth2",
                            "resource": "message",
                            "operation": "post",
                            "channel": "general",
                            "text": "🔔 Jira Update: {{ $json.issue.key }} - {{ $json.issue.fields.summary }}"
                        }
                    }
                ],
                "connections": {
                    "jira-webhook": {
                        "main": [[{ "node": "slack-notify", "type": "main", "index": 0 }]]
                    }
                }
            }),
        ),
        seed(
            "calendar-slack-reminders",
            "Calendar to Slack Reminders",
            "Send calendar event reminders to Slack",
            "scheduling",
            &["calendar", "slack", "reminders", "scheduling"],
            Complexity::Simple,
            &[Provider::Google, Provider::Slack],
            serde_json::json!({
                "name": "Calendar to Slack Reminders",
                "nodes": [
                    {
                        "id": "google-calendar-trigger",
                        "type": "n8n-nodes-base.googleCalendarTrigger",
                        "position": [240, 300],
                        "parameters": {
                            "authentication": "oAuth2",
                            "calendar": "primary",
                            "event": "eventCreated"
                        }
                    },
                    {
                        "id": "slack-reminder",
                        "type": "n8n-nodes-base.slack",
                        "position": [460, 300],
                        "parameters": {
                            "authentication": "oAuth2",
                            "resource": "message",
                            "operation": "post",
                            "channel": "general",
                            "text": "📅 Event Reminder: {{ $json.summary }} at {{ $json.start.dateTime }}"
                        }
                    }
                ],
                "connections": {
                    "google-calendar-trigger": {
                        "main": [[{ "node": "slack-reminder", "type": "main", "index": 0 }]]
                    }
                }
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirement(
        name: &str,
        description: &str,
        connections: &[Provider],
        complexity: Complexity,
    ) -> WorkflowRequirement {
        WorkflowRequirement {
            name: name.into(),
            description: description.into(),
            required_connections: connections.to_vec(),
            estimated_complexity: complexity,
            suggested_template: None,
            additional_notes: None,
            strategy: None,
            follow_up_questions: vec![],
            clarifications: vec![],
        }
    }

    #[test]
    fn test_catalog_seeds_builtin_templates() {
        let catalog = TemplateCatalog::new();
        assert_eq!(catalog.all().len(), 3);
        assert!(catalog.get_by_id("email-summarizer").is_some());
        assert!(catalog.get_by_id("nope").is_none());
    }

    #[test]
    fn test_find_best_match_prefers_connection_and_text_overlap() {
        let catalog = TemplateCatalog::new();
        let req = requirement(
            "email summarizer",
            "summarize emails and send summaries to slack",
            &[Provider::Google, Provider::Slack],
            Complexity::Medium,
        );
        let m = catalog.find_best_match(&req).unwrap();
        assert_eq!(m.template.id, "email-summarizer");
        assert!(m.score > MATCH_SCORE_FLOOR);
    }

    #[test]
    fn test_find_best_match_is_deterministic() {
        let catalog = TemplateCatalog::new();
        let req = requirement(
            "jira notifications",
            "send jira issue updates to slack",
            &[Provider::Jira, Provider::Slack],
            Complexity::Simple,
        );
        let first = catalog.find_best_match(&req).unwrap();
        for _ in 0..10 {
            let again = catalog.find_best_match(&req).unwrap();
            assert_eq!(again.template.id, first.template.id);
            assert_eq!(again.score, first.score);
        }
    }

    #[test]
    fn test_find_best_match_discards_low_scores() {
        let catalog = TemplateCatalog::new();
        // No connection overlap, no text overlap, opposite complexity.
        let req = requirement(
            "ledger reconciliation",
            "reconcile quarterly ledgers against erp exports",
            &[Provider::Microsoft],
            Complexity::Complex,
        );
        assert!(catalog.find_best_match(&req).is_none());
    }

    #[test]
    fn test_score_handles_empty_connections() {
        let catalog = TemplateCatalog::new();
        let req = requirement("untitled", "do something", &[], Complexity::Medium);
        // Must not panic or produce NaN; complexity alone (0.3) sits at the
        // floor and is discarded.
        assert!(catalog.find_best_match(&req).is_none());
    }

    #[test]
    fn test_text_similarity_bounds() {
        assert_eq!(text_similarity("", ""), 0.0);
        assert_eq!(text_similarity("a b c", "a b c"), 1.0);
        assert!(text_similarity("email summary", "email digest") > 0.0);
        assert_eq!(text_similarity("alpha", "beta"), 0.0);
    }

    #[test]
    fn test_search_and_listings() {
        let catalog = TemplateCatalog::new();
        assert_eq!(catalog.search("slack").len(), 3);
        assert_eq!(catalog.search("jira").len(), 1);
        assert_eq!(catalog.list_by_category("scheduling").len(), 1);
        assert_eq!(
            catalog.list_by_connections(&[Provider::Google]).len(),
            2
        );
        assert_eq!(catalog.categories().len(), 3);
        assert!(catalog.tags().contains(&"summarization".to_string()));
    }

    #[test]
    fn test_update_refreshes_updated_at() {
        let mut catalog = TemplateCatalog::new();
        let before = catalog.get_by_id("email-summarizer").unwrap().updated_at;

        let updated = catalog
            .update("email-summarizer", |t| {
                t.description = "Summarize and post email digests to Slack".into();
                t.tags.push("digest".into());
            })
            .unwrap();
        assert_eq!(
            updated.description,
            "Summarize and post email digests to Slack"
        );
        assert!(updated.updated_at >= before);
        assert!(catalog
            .get_by_id("email-summarizer")
            .unwrap()
            .tags
            .contains(&"digest".to_string()));

        assert!(catalog.update("missing", |_| {}).is_none());
    }

    #[test]
    fn test_create_and_delete() {
        let mut catalog = TemplateCatalog::new();
        let id = catalog
            .create(
                "Outlook Digest".into(),
                "Daily Outlook digest to Teams".into(),
                "communication".into(),
                vec!["outlook".into()],
                Complexity::Simple,
                vec![Provider::Microsoft],
                serde_json::json!({"name": "Outlook Digest", "nodes": []}),
            )
            .id
            .clone();
        assert_eq!(catalog.all().len(), 4);
        assert!(catalog.delete(&id));
        assert!(!catalog.delete(&id));
        assert_eq!(catalog.all().len(), 3);
    }
}
