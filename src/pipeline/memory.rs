//! Conversation memory — append-only session log of user/agent turns and
//! prior analyses, used to build context for follow-up analysis.
//!
//! One live session per store. `initialize` replaces any prior memory
//! wholesale; `clear` drops it and rotates the session id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::Provider;

// ============================================================================
// Memory shapes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    User,
    Agent,
    System,
}

/// Optional annotations on a transcript entry: whether it answers a
/// clarification question, which question, and which entry it replies to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_to: Option<String>,
}

/// One turn in the conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub id: String,
    pub kind: EntryKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EntryMetadata>,
}

/// Snapshot of one completed analysis, retained for context building.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMemory {
    pub prompt: String,
    pub strategy: String,
    #[serde(default)]
    pub clarifications: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityPreference {
    Simple,
    Medium,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomationStyle {
    Conservative,
    Balanced,
    Aggressive,
}

/// Preferences inferred from transcript text. Recomputed on demand by
/// `extract_preferences`, never incrementally maintained.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub preferred_connections: Vec<Provider>,
    pub complexity_preference: ComplexityPreference,
    pub automation_style: AutomationStyle,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            preferred_connections: Vec::new(),
            complexity_preference: ComplexityPreference::Medium,
            automation_style: AutomationStyle::Balanced,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Success,
    Error,
    Pending,
}

/// Deployment-side state mirrored into memory for context building.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_workflow_id: Option<String>,
    #[serde(default)]
    pub deployed_workflows: Vec<String>,
    #[serde(default)]
    pub active_connections: Vec<Provider>,
    pub last_deployment_status: DeploymentStatus,
    #[serde(default)]
    pub deployment_messages: Vec<String>,
}

impl Default for WorkflowContext {
    fn default() -> Self {
        Self {
            current_workflow_id: None,
            deployed_workflows: Vec::new(),
            active_connections: Vec::new(),
            last_deployment_status: DeploymentStatus::Pending,
            deployment_messages: Vec::new(),
        }
    }
}

/// The full per-session memory. `conversation_history` is append-only and
/// `last_updated` is non-decreasing across mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMemory {
    pub session_id: String,
    pub original_prompt: String,
    pub conversation_history: Vec<ConversationEntry>,
    pub analysis_results: Vec<AnalysisMemory>,
    pub user_preferences: UserPreferences,
    pub workflow_context: WorkflowContext,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

// ============================================================================
// Follow-up detection
// ============================================================================

/// Continuation markers checked by `is_follow_up`. Substring matching over
/// the lowercased message; a heuristic with accepted false positives.
const FOLLOW_UP_INDICATORS: &[&str] = &[
    "what about",
    "how about",
    "can you also",
    "additionally",
    "also",
    "and",
    "but",
    "however",
    "what if",
    "suppose",
    "imagine",
    "let's say",
    "consider",
    "think about",
    "regarding",
    "concerning",
    "about that",
    "for that",
    "with that",
    "in that case",
];

/// True when the message contains any continuation marker. Does not consider
/// history; callers pair this with a non-empty transcript check.
pub fn contains_follow_up_indicator(message: &str) -> bool {
    let lower = message.to_lowercase();
    FOLLOW_UP_INDICATORS
        .iter()
        .any(|indicator| lower.contains(indicator))
}

/// True when any transcript line contains any of the given keywords.
fn transcript_mentions(history: &[String], keywords: &[&str]) -> bool {
    history
        .iter()
        .any(|line| keywords.iter().any(|kw| line.contains(kw)))
}

// ============================================================================
// ConversationMemory store
// ============================================================================

/// Owns the live session memory. Constructed once and passed by reference;
/// there is no process-global instance.
pub struct ConversationMemory {
    session_id: String,
    memory: Option<SessionMemory>,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self {
            session_id: new_session_id(),
            memory: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Start a fresh session memory, replacing any prior one outright.
    pub fn initialize(&mut self, original_prompt: &str) -> &SessionMemory {
        let now = Utc::now();
        self.memory = Some(SessionMemory {
            session_id: self.session_id.clone(),
            original_prompt: original_prompt.to_string(),
            conversation_history: Vec::new(),
            analysis_results: Vec::new(),
            user_preferences: UserPreferences::default(),
            workflow_context: WorkflowContext::default(),
            created_at: now,
            last_updated: now,
        });
        tracing::debug!(session = %self.session_id, "Initialized conversation memory");
        self.memory.as_ref().unwrap()
    }

    /// Append a conversation turn. No-op when no session is initialized.
    pub fn add_entry(&mut self, kind: EntryKind, content: impl Into<String>) {
        self.push_entry(kind, content.into(), None);
    }

    /// Append a conversation turn with annotations, e.g. an answer to a
    /// specific clarification question.
    pub fn add_entry_with_metadata(
        &mut self,
        kind: EntryKind,
        content: impl Into<String>,
        metadata: EntryMetadata,
    ) {
        self.push_entry(kind, content.into(), Some(metadata));
    }

    fn push_entry(&mut self, kind: EntryKind, content: String, metadata: Option<EntryMetadata>) {
        let Some(memory) = self.memory.as_mut() else {
            return;
        };
        let now = Utc::now();
        memory.conversation_history.push(ConversationEntry {
            id: format!("entry_{}", Uuid::new_v4()),
            kind,
            content,
            timestamp: now,
            metadata,
        });
        memory.last_updated = memory.last_updated.max(now);
    }

    /// Append an analysis snapshot. Prior snapshots are retained.
    pub fn store_analysis(&mut self, snapshot: AnalysisMemory) {
        let Some(memory) = self.memory.as_mut() else {
            return;
        };
        memory.analysis_results.push(snapshot);
        memory.last_updated = memory.last_updated.max(Utc::now());
    }

    /// Merge updated preference fields into memory.
    pub fn update_preferences(&mut self, preferences: UserPreferences) {
        let Some(memory) = self.memory.as_mut() else {
            return;
        };
        memory.user_preferences = preferences;
        memory.last_updated = memory.last_updated.max(Utc::now());
    }

    /// Record deployment-side state for context building.
    pub fn update_workflow_context(&mut self, update: impl FnOnce(&mut WorkflowContext)) {
        let Some(memory) = self.memory.as_mut() else {
            return;
        };
        update(&mut memory.workflow_context);
        memory.last_updated = memory.last_updated.max(Utc::now());
    }

    /// Deterministic context string fed verbatim to the Intent Analyzer.
    pub fn get_context(&self) -> String {
        let Some(memory) = self.memory.as_ref() else {
            return String::new();
        };

        let mut lines: Vec<String> = Vec::new();
        lines.push(format!("Original Request: {}", memory.original_prompt));
        lines.push(String::new());
        lines.push("Conversation History:".into());
        for entry in &memory.conversation_history {
            let speaker = match entry.kind {
                EntryKind::User => "User",
                _ => "Agent",
            };
            lines.push(format!("{}: {}", speaker, entry.content));
        }
        lines.push(String::new());
        lines.push("Previous Analysis Results:".into());
        for result in &memory.analysis_results {
            lines.push(format!(
                "- {} ({})",
                result.strategy,
                result.timestamp.format("%H:%M:%S")
            ));
        }
        lines.push(String::new());
        lines.push("User Preferences:".into());
        lines.push(format!(
            "- Preferred Connections: {}",
            memory
                .user_preferences
                .preferred_connections
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
        lines.push(format!(
            "- Complexity Preference: {}",
            serde_variant(&memory.user_preferences.complexity_preference)
        ));
        lines.push(format!(
            "- Automation Style: {}",
            serde_variant(&memory.user_preferences.automation_style)
        ));
        lines.push(String::new());
        lines.push("Workflow Context:".into());
        lines.push(format!(
            "- Deployed Workflows: {}",
            memory.workflow_context.deployed_workflows.len()
        ));
        lines.push(format!(
            "- Active Connections: {}",
            memory
                .workflow_context
                .active_connections
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
        lines.push(format!(
            "- Last Deployment: {}",
            serde_variant(&memory.workflow_context.last_deployment_status)
        ));

        lines.join("\n")
    }

    /// Follow-up iff the session has at least one prior entry AND the message
    /// carries a continuation marker.
    pub fn is_follow_up(&self, message: &str) -> bool {
        let has_history = self
            .memory
            .as_ref()
            .is_some_and(|m| !m.conversation_history.is_empty());
        has_history && contains_follow_up_indicator(message)
    }

    /// Context for a follow-up message: the full session context plus the
    /// most recent analysis strategy, when one exists.
    pub fn follow_up_context(&self, message: &str) -> String {
        let context = self.get_context();
        let Some(recent) = self
            .memory
            .as_ref()
            .and_then(|m| m.analysis_results.last())
        else {
            return context;
        };
        format!(
            "{}\n\nCurrent Workflow Context:\n{}\n\nUser's follow-up: {}",
            context, recent.strategy, message
        )
    }

    /// Rescan the transcript for preference keywords. Purely additive and
    /// heuristic; degrades to defaults on no hits.
    pub fn extract_preferences(&self) -> UserPreferences {
        let Some(memory) = self.memory.as_ref() else {
            return UserPreferences::default();
        };

        let history: Vec<String> = memory
            .conversation_history
            .iter()
            .map(|e| e.content.to_lowercase())
            .collect();

        let mut preferences = UserPreferences::default();

        for (provider, keywords) in [
            (Provider::Google, &["gmail", "email"][..]),
            (Provider::Slack, &["slack", "message"][..]),
            (Provider::Jira, &["jira", "ticket"][..]),
            (Provider::Microsoft, &["microsoft", "outlook"][..]),
        ] {
            if transcript_mentions(&history, keywords) {
                preferences.preferred_connections.push(provider);
            }
        }

        if transcript_mentions(&history, &["simple", "basic"]) {
            preferences.complexity_preference = ComplexityPreference::Simple;
        } else if transcript_mentions(&history, &["complex", "advanced"]) {
            preferences.complexity_preference = ComplexityPreference::Complex;
        }

        if transcript_mentions(&history, &["conservative", "safe"]) {
            preferences.automation_style = AutomationStyle::Conservative;
        } else if transcript_mentions(&history, &["aggressive", "automated"]) {
            preferences.automation_style = AutomationStyle::Aggressive;
        }

        preferences
    }

    /// Most recent entries, newest first.
    pub fn recent_entries(&self, count: usize) -> Vec<&ConversationEntry> {
        let Some(memory) = self.memory.as_ref() else {
            return Vec::new();
        };
        memory
            .conversation_history
            .iter()
            .rev()
            .take(count)
            .collect()
    }

    /// Short human-readable session summary for diagnostics.
    pub fn summary(&self) -> String {
        let Some(memory) = self.memory.as_ref() else {
            return "No conversation memory available.".into();
        };
        let duration = (Utc::now() - memory.created_at).num_seconds();
        format!(
            "Session: {}\nDuration: {}s\nMessages: {}\nAnalyses: {}\nWorkflows: {}",
            memory.session_id,
            duration,
            memory.conversation_history.len(),
            memory.analysis_results.len(),
            memory.workflow_context.deployed_workflows.len()
        )
    }

    pub fn session(&self) -> Option<&SessionMemory> {
        self.memory.as_ref()
    }

    /// Drop the session and rotate the session id.
    pub fn clear(&mut self) {
        self.memory = None;
        self.session_id = new_session_id();
        tracing::debug!(session = %self.session_id, "Conversation memory cleared");
    }
}

fn new_session_id() -> String {
    format!("session_{}", Uuid::new_v4())
}

/// Lowercase serde variant name for an enum with `rename_all = "lowercase"`.
fn serde_variant<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_with_entries(entries: &[&str]) -> ConversationMemory {
        let mut mem = ConversationMemory::new();
        mem.initialize("automate my inbox");
        for entry in entries {
            mem.add_entry(EntryKind::User, *entry);
        }
        mem
    }

    #[test]
    fn test_history_is_append_only_and_last_updated_monotonic() {
        let mut mem = memory_with_entries(&[]);
        let mut prev_len = 0;
        let mut prev_updated = mem.session().unwrap().last_updated;
        for i in 0..50 {
            mem.add_entry(EntryKind::User, format!("message {}", i));
            let session = mem.session().unwrap();
            assert!(session.conversation_history.len() > prev_len);
            assert!(session.last_updated >= prev_updated);
            prev_len = session.conversation_history.len();
            prev_updated = session.last_updated;
        }
    }

    #[test]
    fn test_entry_metadata_round_trips_and_is_omitted_when_absent() {
        let mut mem = memory_with_entries(&["which channel should alerts go to?"]);
        let question_id = mem.session().unwrap().conversation_history[0].id.clone();
        mem.add_entry_with_metadata(
            EntryKind::User,
            "#ops, please",
            EntryMetadata {
                clarification: Some(true),
                question_index: Some(0),
                response_to: Some(question_id.clone()),
            },
        );

        let session = mem.session().unwrap();
        let plain = &session.conversation_history[0];
        let reply = &session.conversation_history[1];

        let metadata = reply.metadata.as_ref().unwrap();
        assert_eq!(metadata.clarification, Some(true));
        assert_eq!(metadata.question_index, Some(0));
        assert_eq!(metadata.response_to.as_deref(), Some(question_id.as_str()));

        // Entries without annotations serialize without a metadata key at all.
        let serialized = serde_json::to_value(plain).unwrap();
        assert!(serialized.get("metadata").is_none());
        let serialized = serde_json::to_value(reply).unwrap();
        assert_eq!(serialized["metadata"]["clarification"], true);
        assert_eq!(serialized["metadata"]["questionIndex"], 0);
        assert!(serialized["metadata"].get("responseTo").is_some());
    }

    #[test]
    fn test_initialize_replaces_prior_memory() {
        let mut mem = memory_with_entries(&["first session message"]);
        mem.initialize("brand new prompt");
        let session = mem.session().unwrap();
        assert!(session.conversation_history.is_empty());
        assert_eq!(session.original_prompt, "brand new prompt");
    }

    #[test]
    fn test_follow_up_requires_history() {
        let empty = memory_with_entries(&[]);
        assert!(!empty.is_follow_up("what about slack?"));

        let with_history = memory_with_entries(&["set up email triage"]);
        assert!(with_history.is_follow_up("what about slack?"));
        assert!(with_history.is_follow_up("HOWEVER, skip weekends"));
        assert!(!with_history.is_follow_up("deploy it"));
    }

    #[test]
    fn test_extract_preferences_from_transcript() {
        let mem = memory_with_entries(&[
            "I want Gmail alerts in Slack",
            "keep it simple and safe please",
        ]);
        let prefs = mem.extract_preferences();
        assert_eq!(
            prefs.preferred_connections,
            vec![Provider::Google, Provider::Slack]
        );
        assert_eq!(prefs.complexity_preference, ComplexityPreference::Simple);
        assert_eq!(prefs.automation_style, AutomationStyle::Conservative);
    }

    #[test]
    fn test_extract_preferences_defaults_without_hits() {
        let mem = memory_with_entries(&["do the thing"]);
        let prefs = mem.extract_preferences();
        assert!(prefs.preferred_connections.is_empty());
        assert_eq!(prefs.complexity_preference, ComplexityPreference::Medium);
        assert_eq!(prefs.automation_style, AutomationStyle::Balanced);
    }

    #[test]
    fn test_context_is_deterministic() {
        let mem = memory_with_entries(&["watch my inbox", "post to #support"]);
        let a = mem.get_context();
        let b = mem.get_context();
        assert_eq!(a, b);
        assert!(a.contains("Original Request: automate my inbox"));
        assert!(a.contains("User: watch my inbox"));
        assert!(a.contains("Last Deployment: pending"));
    }

    #[test]
    fn test_follow_up_context_includes_latest_strategy() {
        let mut mem = memory_with_entries(&["triage email"]);
        mem.store_analysis(AnalysisMemory {
            prompt: "triage email".into(),
            strategy: "Poll Gmail, route by label".into(),
            clarifications: vec![],
            timestamp: Utc::now(),
        });
        let ctx = mem.follow_up_context("what about attachments?");
        assert!(ctx.contains("Poll Gmail, route by label"));
        assert!(ctx.contains("User's follow-up: what about attachments?"));
    }

    #[test]
    fn test_recent_entries_newest_first() {
        let mem = memory_with_entries(&["one", "two", "three"]);
        let recent = mem.recent_entries(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "three");
        assert_eq!(recent[1].content, "two");
    }

    #[test]
    fn test_clear_rotates_session_id() {
        let mut mem = memory_with_entries(&["hello"]);
        let old_id = mem.session_id().to_string();
        mem.clear();
        assert!(mem.session().is_none());
        assert_ne!(mem.session_id(), old_id);
    }
}
