//! Form automation driver
//!
//! Drives one fixed multi-stage interaction against the target page: launch,
//! optional proxy verification, navigation, field readiness, fill, consent,
//! lead-identifier capture, submit, and post-submit confirmation. Strictly
//! sequential with a bounded timeout at every stage; each failure is
//! classified into a [`SubmitOutcome`] at the stage where it happened.

use crate::browser::{Browser, ElementState, LaunchOptions, Page, WaitUntil};
use crate::proxy::ProxyEndpoint;
use crate::submit::outcome::{classify_launch, classify_navigation, classify_verify, SubmitOutcome};
use crate::submit::prospect::Prospect;
use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default target page
pub const DEFAULT_TARGET_URL: &str = "https://elderlyhealthquotes.com/medicareplans/";

/// Default IP-echo endpoint used for proxy verification
pub const DEFAULT_VERIFY_URL: &str = "https://api.ipify.org/";

// Stage timeout budgets. Stage numbers refer to the fixed interaction
// sequence documented on [`FormSubmitter`].
const VERIFY_NAV_TIMEOUT: Duration = Duration::from_secs(30);
const VERIFY_READ_TIMEOUT: Duration = Duration::from_secs(5);
const NAV_DOM_TIMEOUT: Duration = Duration::from_secs(60);
const NAV_LOAD_TIMEOUT: Duration = Duration::from_secs(30);
const NAV_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const FIELD_VISIBLE_TIMEOUT: Duration = Duration::from_secs(30);
const LEAD_ATTACHED_TIMEOUT: Duration = Duration::from_secs(15);
const CONSENT_ATTACHED_TIMEOUT: Duration = Duration::from_secs(10);
const SUBMIT_ATTACHED_TIMEOUT: Duration = Duration::from_secs(10);
const FILL_TIMEOUT: Duration = Duration::from_secs(10);
const CONSENT_VISIBLE_TIMEOUT: Duration = Duration::from_secs(10);
const CONSENT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const CONSENT_SETTLE: Duration = Duration::from_millis(500);
const LEAD_READ_TIMEOUT: Duration = Duration::from_secs(5);
const PRE_SUBMIT_SETTLE: Duration = Duration::from_secs(1);
const SUBMIT_CLICK_TIMEOUT: Duration = Duration::from_secs(15);
const CONFIRM_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Target page configuration: URL plus the CSS selectors of the form.
///
/// Selectors are configuration data for the third-party page, not part of
/// the automation logic; defaults match the current markup.
#[derive(Debug, Clone)]
pub struct FormTarget {
    pub url: String,
    pub verify_url: String,
    /// Selector whose text content holds the echoed IP on the verify page
    pub ip_echo: String,
    pub name_input: String,
    pub phone_input: String,
    pub zip_input: String,
    pub lead_id_input: String,
    pub consent_checkbox: String,
    pub submit_button: String,
}

impl Default for FormTarget {
    fn default() -> Self {
        Self {
            url: DEFAULT_TARGET_URL.to_string(),
            verify_url: DEFAULT_VERIFY_URL.to_string(),
            ip_echo: "pre".to_string(),
            name_input: "input[name=\"fname\"]".to_string(),
            phone_input: "input[name=\"phoneno\"]".to_string(),
            zip_input: "input[name=\"zipcode\"]".to_string(),
            lead_id_input: "input[name=\"universal_leadid\"]".to_string(),
            consent_checkbox: "#leadid_tcpa_disclosure".to_string(),
            submit_button: "input[name=\"finish\"]".to_string(),
        }
    }
}

impl FormTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn with_verify_url(mut self, url: &str) -> Self {
        self.verify_url = url.to_string();
        self
    }
}

/// One attempt of the form interaction for a (prospect, proxy) pair.
///
/// The orchestrator depends on this trait, never on a concrete driver, so
/// tests can script outcomes directly.
#[async_trait]
pub trait SubmitForm: Send + Sync {
    async fn submit(&self, prospect: &Prospect, proxy: Option<&ProxyEndpoint>) -> SubmitOutcome;
}

/// Form automation driver over an injected browser capability.
pub struct FormSubmitter<B> {
    browser: B,
    target: FormTarget,
    options: LaunchOptions,
}

impl<B: Browser> FormSubmitter<B> {
    pub fn new(browser: B) -> Self {
        Self {
            browser,
            target: FormTarget::default(),
            options: LaunchOptions::default(),
        }
    }

    pub fn with_target(mut self, target: FormTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_options(mut self, options: LaunchOptions) -> Self {
        self.options = options;
        self
    }

    /// Best-effort diagnostic snapshot; never raises.
    async fn capture_snapshot(&self, page: &mut dyn Page, label: &str) {
        let file = format!("{}_{}.png", label, Utc::now().format("%Y%m%dT%H%M%SZ"));
        match page.screenshot(Path::new(&file)).await {
            Ok(()) => info!(file = %file, "diagnostic screenshot saved"),
            Err(e) => warn!(error = %e, "could not capture diagnostic screenshot"),
        }
    }

    /// Stages 2-9, run against an already launched page. The caller owns the
    /// page and releases it whatever this returns.
    async fn run_stages(
        &self,
        page: &mut dyn Page,
        prospect: &Prospect,
        proxied: bool,
    ) -> SubmitOutcome {
        let target = &self.target;

        // Stage 2: verify the proxy actually carries traffic before touching
        // the target page.
        if proxied {
            info!(url = %target.verify_url, "verifying proxy connection");
            if let Err(e) = page
                .goto(&target.verify_url, WaitUntil::Load, VERIFY_NAV_TIMEOUT)
                .await
            {
                error!(error = %e, "proxy verification failed");
                return classify_verify(&e);
            }
            match page.text_content(&target.ip_echo, VERIFY_READ_TIMEOUT).await {
                Ok(ip) => info!(ip = %ip.trim(), "proxy verification succeeded"),
                Err(e) => {
                    error!(error = %e, "proxy verification read failed");
                    return classify_verify(&e);
                }
            }
        }

        // Stage 3: navigate and wait for DOM-ready, then full load, then
        // best-effort network idle.
        info!(url = %target.url, "navigating to target page");
        if let Err(e) = page
            .goto(&target.url, WaitUntil::DomContentLoaded, NAV_DOM_TIMEOUT)
            .await
        {
            error!(error = %e, "navigation to target page failed");
            return classify_navigation(&e);
        }
        if let Err(e) = page
            .wait_for_load_state(WaitUntil::Load, NAV_LOAD_TIMEOUT)
            .await
        {
            error!(error = %e, "load event wait failed");
            return classify_navigation(&e);
        }
        // Idle timeout is non-fatal; many ad-heavy pages never go quiet.
        if let Err(e) = page
            .wait_for_load_state(WaitUntil::NetworkIdle, NAV_IDLE_TIMEOUT)
            .await
        {
            warn!(error = %e, "network idle wait timed out, proceeding anyway");
        }

        // Stage 4: confirm the form actually rendered.
        let required: [(&str, ElementState, Duration); 6] = [
            (&target.name_input, ElementState::Visible, FIELD_VISIBLE_TIMEOUT),
            (&target.phone_input, ElementState::Visible, FIELD_VISIBLE_TIMEOUT),
            (&target.zip_input, ElementState::Visible, FIELD_VISIBLE_TIMEOUT),
            (&target.lead_id_input, ElementState::Attached, LEAD_ATTACHED_TIMEOUT),
            (&target.consent_checkbox, ElementState::Attached, CONSENT_ATTACHED_TIMEOUT),
            (&target.submit_button, ElementState::Attached, SUBMIT_ATTACHED_TIMEOUT),
        ];
        for (selector, state, timeout) in required {
            if let Err(e) = page.wait_for_selector(selector, state, timeout).await {
                error!(selector = %selector, error = %e, "required form element missing");
                return SubmitOutcome::AutomationFail {
                    detail: format!("page did not load required form element {}: {}", selector, e),
                    lead_id: None,
                };
            }
        }

        // Stage 5: fill the visible fields.
        let fields: [(&str, &str); 3] = [
            (&target.name_input, &prospect.full_name),
            (&target.phone_input, &prospect.phone),
            (&target.zip_input, &prospect.zip),
        ];
        for (selector, value) in fields {
            if let Err(e) = page.fill(selector, value, FILL_TIMEOUT).await {
                error!(selector = %selector, error = %e, "failed to fill form field");
                return SubmitOutcome::AutomationFail {
                    detail: format!("failed to fill form field {}: {}", selector, e),
                    lead_id: None,
                };
            }
        }
        info!("form fields filled");

        // Stage 6: consent checkbox, then a short settle.
        if let Err(e) = page
            .wait_for_selector(&target.consent_checkbox, ElementState::Visible, CONSENT_VISIBLE_TIMEOUT)
            .await
        {
            error!(error = %e, "consent checkbox never became visible");
            return SubmitOutcome::AutomationFail {
                detail: format!("failed to check consent box: {}", e),
                lead_id: None,
            };
        }
        if let Err(e) = page
            .check(&target.consent_checkbox, CONSENT_CHECK_TIMEOUT)
            .await
        {
            error!(error = %e, "could not check consent box");
            return SubmitOutcome::AutomationFail {
                detail: format!("failed to check consent box: {}", e),
                lead_id: None,
            };
        }
        tokio::time::sleep(CONSENT_SETTLE).await;

        // Stage 7: read the lead identifier immediately before submitting.
        // The page regenerates this value while it loads, so an earlier read
        // would go stale.
        let lead_id = match page.input_value(&target.lead_id_input, LEAD_READ_TIMEOUT).await {
            Ok(value) if value.trim().is_empty() => {
                error!("lead identifier value is empty right before submit");
                self.capture_snapshot(page, "lead_id_empty_before_submit").await;
                return SubmitOutcome::AutomationFail {
                    detail: "lead identifier value was empty before submit".to_string(),
                    lead_id: None,
                };
            }
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "could not read lead identifier before submit");
                return SubmitOutcome::AutomationFail {
                    detail: format!("could not extract lead identifier before submit: {}", e),
                    lead_id: None,
                };
            }
        };
        info!(lead_id = %lead_id, "lead identifier captured before submit");

        // Stage 8: settle, then click submit. The identifier captured above
        // rides along on any failure from here on.
        tokio::time::sleep(PRE_SUBMIT_SETTLE).await;
        if let Err(e) = page.click(&target.submit_button, SUBMIT_CLICK_TIMEOUT).await {
            error!(error = %e, "submit click failed");
            if matches!(e, crate::browser::BrowserError::Timeout(..)) {
                self.capture_snapshot(page, "submit_click_timeout").await;
            }
            return SubmitOutcome::AutomationFail {
                detail: format!("failed to click submit control: {}", e),
                lead_id: Some(lead_id),
            };
        }
        info!("submit control clicked");

        // Stage 9: let the submission settle.
        if let Err(e) = page
            .wait_for_load_state(WaitUntil::NetworkIdle, CONFIRM_IDLE_TIMEOUT)
            .await
        {
            error!(error = %e, "post-submit settle failed");
            return SubmitOutcome::AutomationFail {
                detail: format!("submission completion wait failed: {}", e),
                lead_id: Some(lead_id),
            };
        }

        info!(lead_id = %lead_id, "form submission succeeded");
        SubmitOutcome::Success {
            lead_id: Some(lead_id),
        }
    }
}

#[async_trait]
impl<B: Browser> SubmitForm for FormSubmitter<B> {
    async fn submit(&self, prospect: &Prospect, proxy: Option<&ProxyEndpoint>) -> SubmitOutcome {
        match proxy {
            Some(endpoint) => info!(endpoint = %endpoint, "launching browser via proxy"),
            None => info!("launching browser without proxy"),
        }

        // Stage 1: launch an isolated session.
        let mut page = match self.browser.launch(&self.options, proxy).await {
            Ok(page) => page,
            Err(e) => {
                error!(error = %e, "browser launch failed");
                return classify_launch(&e);
            }
        };

        let outcome = self.run_stages(page.as_mut(), prospect, proxy.is_some()).await;

        // The session is released on every exit path, classified or not.
        page.close().await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{Browser, BrowserError};
    use crate::proxy::{ProxyEndpoint, ProxySettings, ZipRoutingScheme};
    use crate::submit::outcome::OutcomeKind;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Failure injected at a specific point of the fake page
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Fault {
        Tunnel,
        Timeout,
        Missing,
        Plain,
    }

    fn fault_err(fault: Fault, what: &str) -> BrowserError {
        match fault {
            Fault::Tunnel => {
                BrowserError::Navigation(format!("net::ERR_TUNNEL_CONNECTION_FAILED {}", what))
            }
            Fault::Timeout => BrowserError::Timeout(Duration::from_secs(1), what.to_string()),
            Fault::Missing => BrowserError::ElementNotFound(what.to_string()),
            Fault::Plain => BrowserError::Action(format!("unexpected failure in {}", what)),
        }
    }

    #[derive(Default, Clone)]
    struct PageScript {
        /// url -> fault for goto
        goto_faults: HashMap<String, Fault>,
        /// selector -> fault for wait_for_selector
        wait_faults: HashMap<String, Fault>,
        /// selector -> fault for fill
        fill_faults: HashMap<String, Fault>,
        check_fault: Option<Fault>,
        click_fault: Option<Fault>,
        /// 1-based NetworkIdle wait call that should fail (1 = navigation
        /// idle, 2 = post-submit confirm)
        fail_idle_call: Option<usize>,
        /// None = read error; Some("") = empty value
        lead_value: Option<String>,
    }

    impl PageScript {
        fn with_lead(lead: &str) -> Self {
            Self {
                lead_value: Some(lead.to_string()),
                ..Self::default()
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        closed: AtomicBool,
        idle_calls: AtomicUsize,
        screenshots: Mutex<Vec<PathBuf>>,
        filled: Mutex<Vec<(String, String)>>,
        clicked: AtomicBool,
    }

    struct FakePage {
        script: PageScript,
        recorder: Arc<Recorder>,
    }

    #[async_trait]
    impl Page for FakePage {
        async fn goto(
            &mut self,
            url: &str,
            _wait_until: WaitUntil,
            _timeout: Duration,
        ) -> Result<(), BrowserError> {
            match self.script.goto_faults.get(url) {
                Some(fault) => Err(fault_err(*fault, url)),
                None => Ok(()),
            }
        }

        async fn wait_for_load_state(
            &mut self,
            state: WaitUntil,
            timeout: Duration,
        ) -> Result<(), BrowserError> {
            if state == WaitUntil::NetworkIdle {
                let call = self.recorder.idle_calls.fetch_add(1, Ordering::SeqCst) + 1;
                if self.script.fail_idle_call == Some(call) {
                    return Err(BrowserError::Timeout(timeout, "network idle".to_string()));
                }
            }
            Ok(())
        }

        async fn wait_for_selector(
            &mut self,
            selector: &str,
            _state: ElementState,
            _timeout: Duration,
        ) -> Result<(), BrowserError> {
            match self.script.wait_faults.get(selector) {
                Some(fault) => Err(fault_err(*fault, selector)),
                None => Ok(()),
            }
        }

        async fn fill(
            &mut self,
            selector: &str,
            value: &str,
            _timeout: Duration,
        ) -> Result<(), BrowserError> {
            if let Some(fault) = self.script.fill_faults.get(selector) {
                return Err(fault_err(*fault, selector));
            }
            self.recorder
                .filled
                .lock()
                .unwrap()
                .push((selector.to_string(), value.to_string()));
            Ok(())
        }

        async fn check(&mut self, selector: &str, _timeout: Duration) -> Result<(), BrowserError> {
            match self.script.check_fault {
                Some(fault) => Err(fault_err(fault, selector)),
                None => Ok(()),
            }
        }

        async fn click(&mut self, selector: &str, _timeout: Duration) -> Result<(), BrowserError> {
            if let Some(fault) = self.script.click_fault {
                return Err(fault_err(fault, selector));
            }
            self.recorder.clicked.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn input_value(
            &mut self,
            selector: &str,
            _timeout: Duration,
        ) -> Result<String, BrowserError> {
            match &self.script.lead_value {
                Some(value) => Ok(value.clone()),
                None => Err(BrowserError::Action(format!("could not read {}", selector))),
            }
        }

        async fn text_content(
            &mut self,
            _selector: &str,
            _timeout: Duration,
        ) -> Result<String, BrowserError> {
            Ok("203.0.113.7".to_string())
        }

        async fn screenshot(&mut self, path: &Path) -> Result<(), BrowserError> {
            self.recorder
                .screenshots
                .lock()
                .unwrap()
                .push(path.to_path_buf());
            Ok(())
        }

        async fn close(&mut self) {
            self.recorder.closed.store(true, Ordering::SeqCst);
        }
    }

    struct FakeBrowser {
        script: PageScript,
        launch_fault: Option<Fault>,
        recorder: Arc<Recorder>,
    }

    impl FakeBrowser {
        fn new(script: PageScript) -> Self {
            Self {
                script,
                launch_fault: None,
                recorder: Arc::new(Recorder::default()),
            }
        }
    }

    #[async_trait]
    impl Browser for FakeBrowser {
        async fn launch(
            &self,
            _options: &LaunchOptions,
            _proxy: Option<&ProxyEndpoint>,
        ) -> Result<Box<dyn Page>, BrowserError> {
            if let Some(fault) = self.launch_fault {
                return Err(match fault {
                    Fault::Timeout => fault_err(fault, "launch"),
                    Fault::Tunnel => BrowserError::Launch("proxy tunnel refused".to_string()),
                    _ => BrowserError::Launch("chrome crashed".to_string()),
                });
            }
            Ok(Box::new(FakePage {
                script: self.script.clone(),
                recorder: Arc::clone(&self.recorder),
            }))
        }
    }

    fn prospect() -> Prospect {
        Prospect::new("Jane Doe", "5551234567", "30303")
    }

    fn proxy_endpoint() -> ProxyEndpoint {
        let settings = ProxySettings {
            host: "gw.example.com".to_string(),
            port: 823,
            base_user: "acct".to_string(),
            pass: "secret".to_string(),
        };
        ProxyEndpoint::for_zip(&settings, &ZipRoutingScheme::default(), "30303")
    }

    fn submitter(script: PageScript) -> (FormSubmitter<FakeBrowser>, Arc<Recorder>) {
        let browser = FakeBrowser::new(script);
        let recorder = Arc::clone(&browser.recorder);
        (FormSubmitter::new(browser), recorder)
    }

    #[tokio::test]
    async fn test_full_success_path() {
        let (submitter, recorder) = submitter(PageScript::with_lead("LID-123"));
        let outcome = submitter.submit(&prospect(), None).await;

        assert_eq!(
            outcome,
            SubmitOutcome::Success {
                lead_id: Some("LID-123".to_string())
            }
        );
        assert!(recorder.clicked.load(Ordering::SeqCst));
        assert!(recorder.closed.load(Ordering::SeqCst));
        let filled = recorder.filled.lock().unwrap();
        assert_eq!(filled.len(), 3);
        assert_eq!(filled[0].1, "Jane Doe");
        assert_eq!(filled[1].1, "5551234567");
        assert_eq!(filled[2].1, "30303");
    }

    #[tokio::test]
    async fn test_launch_proxy_error_classified() {
        let mut browser = FakeBrowser::new(PageScript::with_lead("LID-1"));
        browser.launch_fault = Some(Fault::Tunnel);
        let submitter = FormSubmitter::new(browser);
        let outcome = submitter.submit(&prospect(), Some(&proxy_endpoint())).await;
        assert_eq!(outcome.kind(), OutcomeKind::ProxyConnectFail);
    }

    #[tokio::test]
    async fn test_launch_plain_error_is_unknown() {
        let mut browser = FakeBrowser::new(PageScript::with_lead("LID-1"));
        browser.launch_fault = Some(Fault::Plain);
        let submitter = FormSubmitter::new(browser);
        let outcome = submitter.submit(&prospect(), None).await;
        assert_eq!(outcome.kind(), OutcomeKind::UnknownFail);
    }

    #[tokio::test]
    async fn test_proxy_verification_tunnel_error() {
        let mut script = PageScript::with_lead("LID-1");
        script
            .goto_faults
            .insert(DEFAULT_VERIFY_URL.to_string(), Fault::Tunnel);
        let (submitter, recorder) = self::submitter(script);
        let outcome = submitter.submit(&prospect(), Some(&proxy_endpoint())).await;
        assert_eq!(outcome.kind(), OutcomeKind::ProxyConnectFail);
        assert!(recorder.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_verification_skipped_without_proxy() {
        // A broken verify endpoint must not matter when no proxy is in play.
        let mut script = PageScript::with_lead("LID-1");
        script
            .goto_faults
            .insert(DEFAULT_VERIFY_URL.to_string(), Fault::Tunnel);
        let (submitter, _) = self::submitter(script);
        let outcome = submitter.submit(&prospect(), None).await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_navigation_timeout_classified() {
        let mut script = PageScript::with_lead("LID-1");
        script
            .goto_faults
            .insert(DEFAULT_TARGET_URL.to_string(), Fault::Timeout);
        let (submitter, _) = self::submitter(script);
        let outcome = submitter.submit(&prospect(), None).await;
        assert_eq!(outcome.kind(), OutcomeKind::NavigationFail);
    }

    #[tokio::test]
    async fn test_navigation_tunnel_error_is_proxy_fail() {
        let mut script = PageScript::with_lead("LID-1");
        script
            .goto_faults
            .insert(DEFAULT_TARGET_URL.to_string(), Fault::Tunnel);
        let (submitter, _) = self::submitter(script);
        let outcome = submitter.submit(&prospect(), None).await;
        assert_eq!(outcome.kind(), OutcomeKind::ProxyConnectFail);
    }

    #[tokio::test]
    async fn test_soft_network_idle_timeout_still_succeeds() {
        let mut script = PageScript::with_lead("LID-1");
        script.fail_idle_call = Some(1);
        let (submitter, _) = self::submitter(script);
        let outcome = submitter.submit(&prospect(), None).await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_missing_required_field() {
        let mut script = PageScript::with_lead("LID-1");
        script
            .wait_faults
            .insert("input[name=\"phoneno\"]".to_string(), Fault::Timeout);
        let (submitter, recorder) = self::submitter(script);
        let outcome = submitter.submit(&prospect(), None).await;
        assert_eq!(outcome.kind(), OutcomeKind::AutomationFail);
        assert!(outcome.detail().unwrap().contains("phoneno"));
        assert!(recorder.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_fill_failure() {
        let mut script = PageScript::with_lead("LID-1");
        script
            .fill_faults
            .insert("input[name=\"zipcode\"]".to_string(), Fault::Missing);
        let (submitter, _) = self::submitter(script);
        let outcome = submitter.submit(&prospect(), None).await;
        assert_eq!(outcome.kind(), OutcomeKind::AutomationFail);
        assert_eq!(outcome.lead_id(), None);
    }

    #[tokio::test]
    async fn test_consent_failure() {
        let mut script = PageScript::with_lead("LID-1");
        script.check_fault = Some(Fault::Plain);
        let (submitter, _) = self::submitter(script);
        let outcome = submitter.submit(&prospect(), None).await;
        assert_eq!(outcome.kind(), OutcomeKind::AutomationFail);
        assert!(outcome.detail().unwrap().contains("consent"));
    }

    #[tokio::test]
    async fn test_lead_read_failure() {
        let script = PageScript::default(); // lead_value: None -> read error
        let (submitter, _) = self::submitter(script);
        let outcome = submitter.submit(&prospect(), None).await;
        assert_eq!(outcome.kind(), OutcomeKind::AutomationFail);
        assert_eq!(outcome.lead_id(), None);
    }

    #[tokio::test]
    async fn test_empty_lead_value_captures_snapshot() {
        let script = PageScript::with_lead("");
        let (submitter, recorder) = self::submitter(script);
        let outcome = submitter.submit(&prospect(), None).await;
        assert_eq!(outcome.kind(), OutcomeKind::AutomationFail);
        assert_eq!(outcome.lead_id(), None);
        let shots = recorder.screenshots.lock().unwrap();
        assert_eq!(shots.len(), 1);
        assert!(shots[0]
            .to_string_lossy()
            .contains("lead_id_empty_before_submit"));
    }

    #[tokio::test]
    async fn test_click_timeout_keeps_lead_id_and_snapshots() {
        let mut script = PageScript::with_lead("LID-77");
        script.click_fault = Some(Fault::Timeout);
        let (submitter, recorder) = self::submitter(script);
        let outcome = submitter.submit(&prospect(), None).await;
        assert_eq!(outcome.kind(), OutcomeKind::AutomationFail);
        assert_eq!(outcome.lead_id(), Some("LID-77"));
        let shots = recorder.screenshots.lock().unwrap();
        assert_eq!(shots.len(), 1);
        assert!(shots[0].to_string_lossy().contains("submit_click_timeout"));
    }

    #[tokio::test]
    async fn test_click_plain_failure_keeps_lead_without_snapshot() {
        let mut script = PageScript::with_lead("LID-78");
        script.click_fault = Some(Fault::Plain);
        let (submitter, recorder) = self::submitter(script);
        let outcome = submitter.submit(&prospect(), None).await;
        assert_eq!(outcome.kind(), OutcomeKind::AutomationFail);
        assert_eq!(outcome.lead_id(), Some("LID-78"));
        assert!(recorder.screenshots.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_confirm_wait_failure_keeps_lead_id() {
        let mut script = PageScript::with_lead("LID-99");
        script.fail_idle_call = Some(2);
        let (submitter, recorder) = self::submitter(script);
        let outcome = submitter.submit(&prospect(), None).await;
        assert_eq!(outcome.kind(), OutcomeKind::AutomationFail);
        assert_eq!(outcome.lead_id(), Some("LID-99"));
        assert!(recorder.closed.load(Ordering::SeqCst));
    }
}
