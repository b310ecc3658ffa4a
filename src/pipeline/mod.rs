//! Analysis pipeline: prompt in, project plan and structured requirements
//! out, with conversation memory threaded through.

pub mod analyzer;
pub mod memory;
pub mod parser;
pub mod prompts;
pub mod synthesizer;
pub mod templates;
pub mod tokens;
pub mod types;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::error::AppError;

use analyzer::IntentAnalyzer;
use memory::{AnalysisMemory, ConversationMemory, EntryKind};
use templates::TemplateCatalog;
use types::{
    Complexity, ConnectionRequirement, PromptAnalysis, Provider, WorkflowAnalysisResult,
    WorkflowRequirement,
};

// ============================================================================
// Project plan text
// ============================================================================

/// Human-readable plan presented for approval before synthesis.
fn generate_project_plan(
    requirements: &WorkflowRequirement,
    connections: &[ConnectionRequirement],
) -> String {
    let integrations = connections
        .iter()
        .map(|c| format!("• {} ({})", c.provider, c.services.join(", ")))
        .collect::<Vec<_>>()
        .join("\n");
    let required = requirements
        .required_connections
        .iter()
        .map(|p| format!("• {}", p.as_str()))
        .collect::<Vec<_>>()
        .join("\n");
    let strategy = requirements
        .strategy
        .clone()
        .unwrap_or_else(|| generate_fallback_strategy(requirements));

    let mut plan = format!(
        "I'll help you build {}. Here's my project plan:\n\n\
         What I'll Build:\n{}\n\n\
         Integrations:\n{}\n\n\
         Capabilities:\n{}\n\n\
         Required Connections:\n{}\n\n\
         Strategy:\n{}\n",
        requirements.name,
        requirements.description,
        integrations,
        generate_capabilities(requirements),
        required,
        strategy,
    );

    if !requirements.follow_up_questions.is_empty() {
        plan.push_str("\nQuestions for Clarification:\n");
        for q in &requirements.follow_up_questions {
            plan.push_str(&format!("• {}\n", q));
        }
    }
    if let Some(notes) = &requirements.additional_notes {
        plan.push_str(&format!("\nAdditional Notes: {}\n", notes));
    }
    plan.push_str("\nPlease approve if this plan looks good to you, and I'll start building the architecture!");
    plan
}

/// Per-provider capability bullets plus the fixed AI capabilities.
fn generate_capabilities(requirements: &WorkflowRequirement) -> String {
    let mut capabilities: Vec<&str> = Vec::new();
    for provider in &requirements.required_connections {
        match provider {
            Provider::Google => capabilities.extend([
                "• Access and process Gmail emails",
                "• Manage Google Drive files",
                "• Handle Google Calendar events",
            ]),
            Provider::Slack => capabilities.extend([
                "• Send and receive Slack messages",
                "• Manage Slack channels",
                "• Handle Slack user interactions",
            ]),
            Provider::Jira => capabilities.extend([
                "• Create and manage Jira issues",
                "• Track project progress",
                "• Handle Jira workflows",
            ]),
            Provider::Microsoft => capabilities.extend([
                "• Process Outlook emails",
                "• Manage Teams communications",
                "• Handle SharePoint documents",
            ]),
        }
    }
    capabilities.extend([
        "• Natural language processing and understanding",
        "• Intelligent data analysis and insights",
        "• Automated workflow execution",
    ]);
    capabilities.join("\n")
}

/// Strategy bullets used when the analyzer did not supply one.
fn generate_fallback_strategy(requirements: &WorkflowRequirement) -> String {
    let mut strategy: Vec<&str> = Vec::new();
    for provider in &requirements.required_connections {
        strategy.push(match provider {
            Provider::Google => "• Monitor and process email data from Gmail",
            Provider::Jira => "• Create and manage tickets in Jira",
            Provider::Slack => "• Send notifications and messages via Slack",
            Provider::Microsoft => "• Process data from Microsoft services",
        });
    }
    strategy.push("• Use AI to intelligently process and analyze data");
    strategy.push("• Handle edge cases and error scenarios");
    strategy.join("\n")
}

// ============================================================================
// WorkflowPipeline
// ============================================================================

/// Drives one analysis session end to end. A second `analyze_user_prompt`
/// while one is in flight is rejected with a placeholder result so memory
/// writes never interleave.
pub struct WorkflowPipeline {
    analyzer: Arc<IntentAnalyzer>,
    catalog: Arc<Mutex<TemplateCatalog>>,
    memory: Mutex<ConversationMemory>,
    logs: Mutex<Vec<String>>,
    analyzing: AtomicBool,
}

/// Clears the in-flight flag when the analysis scope exits, on every path.
struct AnalysisGuard<'a>(&'a AtomicBool);

impl Drop for AnalysisGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl WorkflowPipeline {
    pub fn new(analyzer: Arc<IntentAnalyzer>, catalog: Arc<Mutex<TemplateCatalog>>) -> Self {
        Self {
            analyzer,
            catalog,
            memory: Mutex::new(ConversationMemory::new()),
            logs: Mutex::new(Vec::new()),
            analyzing: AtomicBool::new(false),
        }
    }

    fn add_log(&self, message: impl AsRef<str>) {
        let entry = format!("[{}] {}", Utc::now().to_rfc3339(), message.as_ref());
        tracing::info!("{}", message.as_ref());
        self.logs.lock().unwrap().push(entry);
    }

    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().unwrap().clone()
    }

    pub fn clear_logs(&self) {
        self.logs.lock().unwrap().clear();
    }

    pub fn memory(&self) -> &Mutex<ConversationMemory> {
        &self.memory
    }

    /// Full analysis flow: analyze intent, resolve connection requirements,
    /// build the project plan, consult the template catalog, and record
    /// everything in conversation memory.
    pub async fn analyze_user_prompt(
        &self,
        user_prompt: &str,
    ) -> Result<WorkflowAnalysisResult, AppError> {
        if self
            .analyzing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.add_log("Another analysis is in progress, skipping duplicate request.");
            return Ok(pending_placeholder(self.logs()));
        }
        let _guard = AnalysisGuard(&self.analyzing);

        self.add_log(format!("Starting workflow analysis for prompt: {}", user_prompt));

        // Conversation context comes from memory; a follow-up message gets
        // the richer context including the latest strategy.
        let context = {
            let mut mem = self.memory.lock().unwrap();
            if mem.session().is_none() {
                mem.initialize(user_prompt);
            }
            let context = if mem.is_follow_up(user_prompt) {
                Some(mem.follow_up_context(user_prompt))
            } else if mem
                .session()
                .is_some_and(|s| !s.conversation_history.is_empty())
            {
                Some(mem.get_context())
            } else {
                None
            };
            mem.add_entry(EntryKind::User, user_prompt);
            context
        };

        self.add_log("Step 1: Analyzing prompt with LLM...");
        let analysis = match self.analyzer.analyze(user_prompt, context.as_deref()).await {
            Ok(analysis) => analysis,
            Err(e) => {
                self.add_log(format!("Workflow analysis failed: {}", e));
                return Err(e);
            }
        };
        self.add_log(format!(
            "LLM analysis completed. Confidence: {}",
            analysis.confidence
        ));

        self.add_log("Step 2: Extracting connection requirements...");
        let connections = if !analysis.requirements.required_connections.is_empty() {
            derive_connection_requirements(&analysis.requirements.required_connections)
        } else {
            self.analyzer
                .extract_connection_requirements(user_prompt)
                .await?
        };

        self.add_log("Step 3: Generating project plan...");
        let project_plan = generate_project_plan(&analysis.requirements, &connections);
        self.add_log("Project plan generated successfully");

        // Catalog match fills in a suggestion when the analyzer left none.
        let suggested_template = match &analysis.requirements.suggested_template {
            Some(id) => Some(id.clone()),
            None => {
                let matched = self
                    .catalog
                    .lock()
                    .unwrap()
                    .find_best_match(&analysis.requirements);
                if let Some(m) = &matched {
                    self.add_log(format!(
                        "Matched catalog template '{}' (score {:.2})",
                        m.template.id, m.score
                    ));
                }
                matched.map(|m| m.template.id)
            }
        };

        // Graph generation keys off any template suggestion, whether the
        // analyzer named one or the catalog match above filled it in.
        if suggested_template.is_some() {
            self.add_log("Step 4: Generating n8n workflow template...");
            match self
                .analyzer
                .generate_workflow_template(&analysis.requirements)
                .await
            {
                Ok(_) => self.add_log("n8n workflow template generated successfully"),
                Err(e) => self.add_log(format!("Warning: Failed to generate n8n template: {}", e)),
            }
        } else {
            self.add_log("Step 4: No n8n template generation needed");
        }

        let required_connections: Vec<Provider> =
            if !analysis.requirements.required_connections.is_empty() {
                analysis.requirements.required_connections.clone()
            } else {
                connections
                    .iter()
                    .filter_map(|c| Provider::parse(&c.provider))
                    .collect()
            };

        {
            let mut mem = self.memory.lock().unwrap();
            mem.add_entry(EntryKind::Agent, project_plan.clone());
            mem.store_analysis(AnalysisMemory {
                prompt: user_prompt.to_string(),
                strategy: analysis
                    .requirements
                    .strategy
                    .clone()
                    .unwrap_or_else(|| generate_fallback_strategy(&analysis.requirements)),
                clarifications: analysis.requirements.clarifications.clone(),
                timestamp: Utc::now(),
            });
            let prefs = mem.extract_preferences();
            mem.update_preferences(prefs);
        }

        Ok(WorkflowAnalysisResult {
            estimated_complexity: analysis.requirements.estimated_complexity,
            suggested_template,
            analysis,
            project_plan,
            required_connections,
            logs: self.logs(),
        })
    }

    /// Reset the session: memory cleared, logs dropped, new session id.
    pub fn reset_session(&self) {
        self.memory.lock().unwrap().clear();
        self.clear_logs();
    }
}

/// Connection requirements derived locally from providers the analysis
/// already named, skipping the secondary backend call.
fn derive_connection_requirements(providers: &[Provider]) -> Vec<ConnectionRequirement> {
    providers
        .iter()
        .map(|p| ConnectionRequirement {
            provider: p.display_name().to_string(),
            services: vec![],
            scopes: vec![],
            description: format!("Connection required for {}", p.as_str()),
        })
        .collect()
}

/// Result handed back when an analysis is already in flight.
fn pending_placeholder(logs: Vec<String>) -> WorkflowAnalysisResult {
    WorkflowAnalysisResult {
        analysis: PromptAnalysis {
            requirements: WorkflowRequirement {
                name: "Pending Analysis".into(),
                description: "Analysis in progress".into(),
                required_connections: vec![],
                estimated_complexity: Complexity::Simple,
                suggested_template: None,
                additional_notes: None,
                strategy: None,
                follow_up_questions: vec![],
                clarifications: vec![],
            },
            confidence: 0.0,
            reasoning: String::new(),
            needs_clarification: false,
            suggested_questions: vec![],
        },
        project_plan: String::new(),
        required_connections: vec![],
        estimated_complexity: Complexity::Simple,
        suggested_template: None,
        logs,
    }
}
