//! Attempt outcome taxonomy and driver error classification
//!
//! Classification is a keyword heuristic over driver error text, looking for
//! proxy/tunnel/timeout signatures. It is an approximation, not a precise
//! error code: ambiguous errors fall through to the stage-appropriate
//! fallback. The rest of the system only ever sees the classified outcome,
//! never raw error text.

use crate::browser::BrowserError;
use serde::Serialize;
use std::fmt;

/// Substrings that mark a driver error as proxy connectivity trouble
const PROXY_ERROR_SIGNATURES: [&str; 3] = ["proxy", "tunnel", "epipe"];

/// Kind of a classified attempt outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    ProxyConnectFail,
    NavigationFail,
    AutomationFail,
    UnknownFail,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeKind::Success => write!(f, "SUCCESS"),
            OutcomeKind::ProxyConnectFail => write!(f, "PROXY_CONNECT_FAIL"),
            OutcomeKind::NavigationFail => write!(f, "NAVIGATION_FAIL"),
            OutcomeKind::AutomationFail => write!(f, "AUTOMATION_FAIL"),
            OutcomeKind::UnknownFail => write!(f, "UNKNOWN_FAIL"),
        }
    }
}

/// Classified result of one form submission attempt.
///
/// Produced exactly once per attempt by the form driver; consumed exactly
/// once by the orchestrator's retry policy. A lead identifier captured
/// before the submit click rides along on late failures because partial
/// completion is diagnostically valuable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Success {
        lead_id: Option<String>,
    },
    ProxyConnectFail {
        detail: String,
    },
    NavigationFail {
        detail: String,
    },
    AutomationFail {
        detail: String,
        lead_id: Option<String>,
    },
    UnknownFail {
        detail: String,
        lead_id: Option<String>,
    },
}

impl SubmitOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            SubmitOutcome::Success { .. } => OutcomeKind::Success,
            SubmitOutcome::ProxyConnectFail { .. } => OutcomeKind::ProxyConnectFail,
            SubmitOutcome::NavigationFail { .. } => OutcomeKind::NavigationFail,
            SubmitOutcome::AutomationFail { .. } => OutcomeKind::AutomationFail,
            SubmitOutcome::UnknownFail { .. } => OutcomeKind::UnknownFail,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SubmitOutcome::Success { .. })
    }

    pub fn lead_id(&self) -> Option<&str> {
        match self {
            SubmitOutcome::Success { lead_id }
            | SubmitOutcome::AutomationFail { lead_id, .. }
            | SubmitOutcome::UnknownFail { lead_id, .. } => lead_id.as_deref(),
            _ => None,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            SubmitOutcome::Success { .. } => None,
            SubmitOutcome::ProxyConnectFail { detail }
            | SubmitOutcome::NavigationFail { detail }
            | SubmitOutcome::AutomationFail { detail, .. }
            | SubmitOutcome::UnknownFail { detail, .. } => Some(detail),
        }
    }
}

fn has_proxy_signature(err: &BrowserError) -> bool {
    let text = err.to_string().to_lowercase();
    PROXY_ERROR_SIGNATURES.iter().any(|sig| text.contains(sig))
}

fn has_timeout_signature(err: &BrowserError) -> bool {
    matches!(err, BrowserError::Timeout(..)) || err.to_string().to_lowercase().contains("timeout")
}

/// Classify a stage-1 launch error. Ambiguous errors default to unknown.
pub(crate) fn classify_launch(err: &BrowserError) -> SubmitOutcome {
    if has_proxy_signature(err) || has_timeout_signature(err) {
        SubmitOutcome::ProxyConnectFail {
            detail: format!("proxy launch failed: {}", err),
        }
    } else {
        SubmitOutcome::UnknownFail {
            detail: format!("browser launch failed: {}", err),
            lead_id: None,
        }
    }
}

/// Classify a stage-2 proxy verification error.
pub(crate) fn classify_verify(err: &BrowserError) -> SubmitOutcome {
    if has_proxy_signature(err) || has_timeout_signature(err) {
        SubmitOutcome::ProxyConnectFail {
            detail: format!("proxy verification failed: {}", err),
        }
    } else {
        SubmitOutcome::NavigationFail {
            detail: format!("proxy verification navigation failed: {}", err),
        }
    }
}

/// Classify a stage-3 navigation error.
pub(crate) fn classify_navigation(err: &BrowserError) -> SubmitOutcome {
    if has_proxy_signature(err) {
        SubmitOutcome::ProxyConnectFail {
            detail: format!("navigation via proxy failed: {}", err),
        }
    } else if has_timeout_signature(err) {
        SubmitOutcome::NavigationFail {
            detail: format!("navigation timed out: {}", err),
        }
    } else {
        SubmitOutcome::NavigationFail {
            detail: format!("navigation failed: {}", err),
        }
    }
}
