//! Lead form submission pipeline
//!
//! `prospect` validates the inbound lead, `form` drives the staged browser
//! automation for one attempt, `outcome` classifies how an attempt ended,
//! and `orchestrator` wraps attempts in the proxy-rotation retry loop.

pub mod form;
pub mod orchestrator;
pub mod outcome;
pub mod prospect;

pub use form::{FormSubmitter, FormTarget, SubmitForm};
pub use orchestrator::{Orchestrator, OrchestratorConfig, Verdict};
pub use outcome::{OutcomeKind, SubmitOutcome};
pub use prospect::Prospect;
