//! Lead Relay - Automated Lead-Form Submission
//!
//! Drives a scripted browser interaction against a third-party lead-generation
//! form, routing each attempt through a residential proxy exit keyed to a zip
//! code. When a proxy exit cannot connect, the orchestrator widens a
//! nearest-neighbor search around the prospect's zip code and retries with new
//! candidates, up to a bounded attempt budget.

pub mod browser;
pub mod geo;
pub mod proxy;
pub mod submit;

pub use geo::{ZipDatabase, ZipNeighbors};
pub use proxy::{ProxyEndpoint, ProxySettings, SettingsError, ZipRoutingScheme};
pub use submit::{
    FormSubmitter, FormTarget, Orchestrator, OrchestratorConfig, OutcomeKind, Prospect,
    SubmitForm, SubmitOutcome, Verdict,
};

/// Application result type
pub type Result<T> = anyhow::Result<T>;
