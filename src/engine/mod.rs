//! Automation engine integration: REST client, deployment orchestration,
//! and the wire types they share.

pub mod client;
pub mod deploy;
pub mod types;

pub use client::EngineClient;
pub use deploy::DeployOrchestrator;
