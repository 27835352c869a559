//! Browser driver capability
//!
//! Narrow interface over a remotely controlled browser: session launch with an
//! optional proxy, navigation with explicit wait-state selection, and element
//! primitives that each take an explicit timeout. The submission driver only
//! depends on these traits; the CDP implementation in [`cdp`] is one concrete
//! backend and tests substitute scripted fakes.

pub mod cdp;

use crate::proxy::ProxyEndpoint;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub use cdp::CdpBrowser;

/// Default user agent applied to launched sessions
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Default viewport size applied to launched sessions
pub const DEFAULT_VIEWPORT: (u32, u32) = (1280, 720);

/// Default browser launch timeout
pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Browser driver errors.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("launch failed: {0}")]
    Launch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("action failed: {0}")]
    Action(String),

    #[error("timeout after {0:?} in {1}")]
    Timeout(Duration, String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("session closed")]
    SessionClosed,
}

/// Page load milestones a navigation can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    DomContentLoaded,
    Load,
    /// Best-effort quiescence; backends may approximate it
    NetworkIdle,
}

/// Element readiness states a wait can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// Present in the DOM
    Attached,
    /// Present and rendered
    Visible,
}

/// Session launch options.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub viewport: (u32, u32),
    pub user_agent: String,
    pub launch_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: DEFAULT_VIEWPORT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
        }
    }
}

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = (width, height);
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }
}

/// Launches isolated browser sessions.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Start a fresh session, routed through `proxy` when given.
    async fn launch(
        &self,
        options: &LaunchOptions,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<Box<dyn Page>, BrowserError>;
}

/// One open page inside a browser session.
///
/// Every operation takes an explicit timeout and maps an expired deadline to
/// [`BrowserError::Timeout`]; no call blocks unboundedly.
#[async_trait]
pub trait Page: Send {
    async fn goto(
        &mut self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<(), BrowserError>;

    async fn wait_for_load_state(
        &mut self,
        state: WaitUntil,
        timeout: Duration,
    ) -> Result<(), BrowserError>;

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> Result<(), BrowserError>;

    async fn fill(
        &mut self,
        selector: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError>;

    async fn check(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn click(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// Current value of an input element.
    async fn input_value(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<String, BrowserError>;

    /// Text content of an element.
    async fn text_content(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<String, BrowserError>;

    /// Capture a PNG snapshot of the current page.
    async fn screenshot(&mut self, path: &Path) -> Result<(), BrowserError>;

    /// Tear the session down. Infallible by contract; backends swallow and
    /// log their own shutdown errors.
    async fn close(&mut self);
}
