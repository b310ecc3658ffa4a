//! agentbridge — prompt-to-deployment orchestration for an n8n-compatible
//! automation engine.
//!
//! Free-text automation intent goes in; a structured requirement, an
//! approvable project plan, a synthesized workflow graph, and finally an
//! activated engine-side workflow come out. OAuth tokens for the workflow's
//! integrations are resolved through the identity backend along the way.

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod pipeline;

use std::sync::{Arc, Mutex};

use config::AppConfig;
use engine::{DeployOrchestrator, EngineClient};
use pipeline::analyzer::{IntentAnalyzer, OpenAiBackend};
use pipeline::synthesizer::WorkflowSynthesizer;
use pipeline::templates::TemplateCatalog;
use pipeline::tokens::{IdentityClient, TokenStore};
use pipeline::WorkflowPipeline;

/// All long-lived components, constructed once per process and passed by
/// reference to consumers. There is no global mutable state.
pub struct Services {
    pub config: AppConfig,
    pub engine: Arc<EngineClient>,
    pub deployer: DeployOrchestrator,
    pub analyzer: Arc<IntentAnalyzer>,
    pub synthesizer: WorkflowSynthesizer,
    pub pipeline: WorkflowPipeline,
    pub catalog: Arc<Mutex<TemplateCatalog>>,
    pub tokens: TokenStore,
    pub identity: IdentityClient,
}

impl Services {
    pub fn new(config: AppConfig) -> Self {
        let engine = Arc::new(EngineClient::new(
            config.engine_base_url.clone(),
            config.engine_api_key.clone(),
        ));
        let analyzer = Arc::new(IntentAnalyzer::new(Box::new(OpenAiBackend::new(
            config.llm_base_url.clone(),
            config.llm_api_key.clone(),
            config.llm_model.clone(),
        ))));
        let catalog = Arc::new(Mutex::new(TemplateCatalog::new()));

        Self {
            deployer: DeployOrchestrator::new(engine.clone()),
            synthesizer: WorkflowSynthesizer::new(analyzer.clone()),
            pipeline: WorkflowPipeline::new(analyzer.clone(), catalog.clone()),
            tokens: TokenStore::new(config.identity_base_url.clone()),
            identity: IdentityClient::new(config.identity_base_url.clone()),
            engine,
            analyzer,
            catalog,
            config,
        }
    }
}
