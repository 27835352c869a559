//! Submission retry orchestration
//!
//! One orchestration run drives the attempt loop for a single prospect:
//! pick a candidate zip, derive a proxy identity for it, run the form driver,
//! then decide between stopping and widening the nearby-zip search. Only a
//! proxy connectivity failure is retryable; a different egress IP cannot fix
//! a broken page or automation step. The nearby search always re-centers on
//! the prospect's original zip so candidates stay geographically meaningful.

use crate::geo::ZipNeighbors;
use crate::proxy::{ProxyEndpoint, ProxySettings, ZipRoutingScheme};
use crate::submit::form::SubmitForm;
use crate::submit::outcome::{OutcomeKind, SubmitOutcome};
use crate::submit::prospect::Prospect;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default attempt budget per run
const DEFAULT_ATTEMPT_BUDGET: u32 = 5;

/// Default initial nearby-search radius in miles
const DEFAULT_INITIAL_RADIUS_MILES: u32 = 5;

/// Radius increase applied after each geo expansion
const DEFAULT_RADIUS_STEP_MILES: u32 = 5;

/// Neighbors requested per geo expansion
const DEFAULT_NEIGHBORS_PER_EXPANSION: usize = 3;

/// Retry policy knobs for one orchestration run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub attempt_budget: u32,
    pub initial_radius_miles: u32,
    pub radius_step_miles: u32,
    pub neighbors_per_expansion: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            attempt_budget: DEFAULT_ATTEMPT_BUDGET,
            initial_radius_miles: DEFAULT_INITIAL_RADIUS_MILES,
            radius_step_miles: DEFAULT_RADIUS_STEP_MILES,
            neighbors_per_expansion: DEFAULT_NEIGHBORS_PER_EXPANSION,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attempt_budget(mut self, budget: u32) -> Self {
        self.attempt_budget = budget;
        self
    }

    pub fn with_initial_radius_miles(mut self, radius: u32) -> Self {
        self.initial_radius_miles = radius;
        self
    }

    pub fn with_radius_step_miles(mut self, step: u32) -> Self {
        self.radius_step_miles = step;
        self
    }

    pub fn with_neighbors_per_expansion(mut self, count: usize) -> Self {
        self.neighbors_per_expansion = count;
        self
    }
}

/// Terminal result of one orchestration run. Exactly one per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub status: OutcomeKind,
    pub message: String,
    pub lead_id: Option<String>,
    pub zip_used: Option<String>,
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeKind::Success
    }

    fn from_outcome(outcome: &SubmitOutcome, zip: &str) -> Self {
        let message = match outcome {
            SubmitOutcome::Success {
                lead_id: Some(lead_id),
            } => format!(
                "Form submitted successfully with lead ID {} (used zip {})",
                lead_id, zip
            ),
            SubmitOutcome::Success { lead_id: None } => format!(
                "Form likely submitted successfully but no lead identifier was captured (used zip {})",
                zip
            ),
            other => format!(
                "Submission failed: {} (attempted zip: {})",
                other.detail().unwrap_or("unknown error"),
                zip
            ),
        };
        Self {
            status: outcome.kind(),
            message,
            lead_id: outcome.lead_id().map(String::from),
            zip_used: Some(zip.to_string()),
        }
    }

    fn no_candidates(original_zip: &str) -> Self {
        Self {
            status: OutcomeKind::UnknownFail,
            message: format!(
                "No suitable candidate zip code found for {}; no submission attempts were made.",
                original_zip
            ),
            lead_id: None,
            zip_used: None,
        }
    }
}

/// Per-run retry bookkeeping. Exclusively owned by one orchestration run;
/// a zip code is attempted at most once per run.
#[derive(Debug)]
struct RetryState {
    queue: VecDeque<String>,
    tried: HashSet<String>,
    radius_miles: u32,
    attempts_used: u32,
    attempt_budget: u32,
}

impl RetryState {
    fn new(initial_zip: &str, attempt_budget: u32, radius_miles: u32) -> Self {
        Self {
            queue: VecDeque::from([initial_zip.to_string()]),
            tried: HashSet::new(),
            radius_miles,
            attempts_used: 0,
            attempt_budget,
        }
    }

    /// Enqueue candidates that are neither tried nor already queued.
    /// Returns how many were actually added.
    fn enqueue_new(&mut self, candidates: Vec<String>) -> usize {
        let mut added = 0;
        for candidate in candidates {
            if !self.tried.contains(&candidate) && !self.queue.contains(&candidate) {
                self.queue.push_back(candidate);
                added += 1;
            }
        }
        added
    }
}

/// Retry engine tying together the geo lookup, the proxy identity
/// derivation, and the form driver.
pub struct Orchestrator<S, G> {
    driver: S,
    geo: Option<G>,
    proxy: Option<ProxySettings>,
    scheme: ZipRoutingScheme,
    config: OrchestratorConfig,
}

impl<S: SubmitForm, G: ZipNeighbors> Orchestrator<S, G> {
    pub fn new(driver: S, geo: Option<G>, proxy: Option<ProxySettings>) -> Self {
        Self {
            driver,
            geo,
            proxy,
            scheme: ZipRoutingScheme::default(),
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_scheme(mut self, scheme: ZipRoutingScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Run the full attempt sequence for one prospect and produce the final
    /// verdict.
    pub async fn run(&self, prospect: &Prospect) -> Verdict {
        let mut state = RetryState::new(
            &prospect.zip,
            self.config.attempt_budget,
            self.config.initial_radius_miles,
        );
        self.drive(prospect, &mut state).await
    }

    async fn drive(&self, prospect: &Prospect, state: &mut RetryState) -> Verdict {
        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            zip = %prospect.zip,
            budget = state.attempt_budget,
            proxied = self.proxy.is_some(),
            "starting submission run"
        );

        let mut verdict: Option<Verdict> = None;

        while state.attempts_used < state.attempt_budget {
            let Some(current_zip) = state.queue.pop_front() else {
                warn!(%run_id, "no more candidate zip codes left in the queue");
                if let Some(v) = verdict.as_mut() {
                    v.message = format!(
                        "No suitable candidate zip codes remain after {} attempt(s). {}",
                        state.attempts_used, v.message
                    );
                }
                break;
            };
            // Skips do not consume an attempt slot.
            if !state.tried.insert(current_zip.clone()) {
                debug!(%run_id, zip = %current_zip, "skipping already tried zip code");
                continue;
            }
            state.attempts_used += 1;
            info!(
                %run_id,
                attempt = state.attempts_used,
                budget = state.attempt_budget,
                zip = %current_zip,
                "attempt starting"
            );

            let endpoint = self
                .proxy
                .as_ref()
                .map(|settings| ProxyEndpoint::for_zip(settings, &self.scheme, &current_zip));
            match &endpoint {
                Some(endpoint) => info!(%run_id, endpoint = %endpoint, "routing attempt through proxy"),
                None => warn!(%run_id, zip = %current_zip, "proxy not configured, attempting without proxy"),
            }

            let outcome = self.driver.submit(prospect, endpoint.as_ref()).await;
            info!(%run_id, status = %outcome.kind(), "attempt finished");
            verdict = Some(Verdict::from_outcome(&outcome, &current_zip));

            match outcome.kind() {
                OutcomeKind::Success => break,
                OutcomeKind::ProxyConnectFail => {
                    if state.attempts_used >= state.attempt_budget {
                        if let Some(v) = verdict.as_mut() {
                            v.message = format!(
                                "Failed after {} attempts. Could not connect via proxy near zip {}. Last error for zip {}: {}",
                                state.attempt_budget,
                                prospect.zip,
                                current_zip,
                                outcome.detail().unwrap_or("unknown error"),
                            );
                        }
                        break;
                    }
                    let Some(geo) = self.geo.as_ref() else {
                        warn!(%run_id, "cannot search for nearby zips, search engine unavailable");
                        if let Some(v) = verdict.as_mut() {
                            v.message = "Proxy connection failed and the nearby zip code search engine is unavailable.".to_string();
                        }
                        break;
                    };
                    // Always re-center on the prospect's original zip code,
                    // not the candidate that just failed.
                    let radius = state.radius_miles;
                    let neighbors = geo
                        .nearby(
                            &prospect.zip,
                            f64::from(radius),
                            self.config.neighbors_per_expansion,
                        )
                        .await;
                    let added = state.enqueue_new(neighbors);
                    info!(%run_id, radius, added, "nearby zip expansion complete");
                    state.radius_miles += self.config.radius_step_miles;
                }
                OutcomeKind::NavigationFail
                | OutcomeKind::AutomationFail
                | OutcomeKind::UnknownFail => {
                    // Not retryable: a proxy swap cannot fix a broken page or
                    // automation step.
                    break;
                }
            }
        }

        let verdict = verdict.unwrap_or_else(|| Verdict::no_candidates(&prospect.zip));
        info!(
            %run_id,
            status = %verdict.status,
            lead_id = verdict.lead_id.as_deref().unwrap_or("-"),
            "submission run finished"
        );
        verdict
    }
}
