//! Chrome DevTools Protocol backend for the browser capability
//!
//! Launches a local Chromium with remote debugging enabled, opens a fresh
//! page target through the `/json` HTTP endpoint, then drives it over the
//! page's websocket. Element primitives are built on `Runtime.evaluate`.
//! Proxy credentials are answered through the `Fetch` domain, since Chromium
//! does not accept them on the command line.

use crate::browser::{Browser, BrowserError, ElementState, LaunchOptions, Page, WaitUntil};
use crate::proxy::ProxyEndpoint;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Default Chromium binary name
const DEFAULT_BINARY: &str = "chromium";

/// Default remote debugging port. Zero lets Chromium pick an ephemeral
/// port, reported back through the profile's `DevToolsActivePort` file, so
/// concurrent launches never contend for one well-known port.
const DEFAULT_DEBUG_PORT: u16 = 0;

/// Timeout for the domain-enable commands sent right after connecting
const SETUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between readiness polls
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Quiet period appended after `complete` readiness to approximate
/// network idle without Network-domain bookkeeping
const NETWORK_IDLE_SETTLE: Duration = Duration::from_millis(500);

/// Timeout for screenshot capture
const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// CDP-backed browser launcher.
pub struct CdpBrowser {
    binary: String,
    debug_port: u16,
}

impl Default for CdpBrowser {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            debug_port: DEFAULT_DEBUG_PORT,
        }
    }
}

impl CdpBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, binary: &str) -> Self {
        self.binary = binary.to_string();
        self
    }

    pub fn with_debug_port(mut self, port: u16) -> Self {
        self.debug_port = port;
        self
    }

    fn spawn_chromium(
        &self,
        options: &LaunchOptions,
        proxy: Option<&ProxyEndpoint>,
        profile_dir: &Path,
    ) -> Result<Child, BrowserError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(format!("--remote-debugging-port={}", self.debug_port))
            .arg(format!("--user-data-dir={}", profile_dir.display()))
            .arg(format!(
                "--window-size={},{}",
                options.viewport.0, options.viewport.1
            ))
            .arg(format!("--user-agent={}", options.user_agent))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu");
        if options.headless {
            cmd.arg("--headless=new");
        }
        if let Some(endpoint) = proxy {
            cmd.arg(format!("--proxy-server={}", endpoint.server()));
        }
        cmd.arg("about:blank")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        cmd.spawn().map_err(|e| {
            BrowserError::Launch(format!("failed to spawn {}: {}", self.binary, e))
        })
    }

    /// Poll the devtools HTTP endpoint on the port the child reported, then
    /// open a fresh page target and return its websocket URL.
    async fn discover_page_ws(&self, port: u16, deadline: Instant) -> Result<String, BrowserError> {
        let endpoint = format!("http://127.0.0.1:{}", port);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| BrowserError::Launch(format!("http client: {}", e)))?;

        loop {
            match client.get(format!("{}/json/version", endpoint)).send().await {
                Ok(resp) if resp.status().is_success() => break,
                _ => {
                    if Instant::now() >= deadline {
                        return Err(BrowserError::Launch(format!(
                            "devtools endpoint {} did not come up (launch timeout)",
                            endpoint
                        )));
                    }
                    sleep(POLL_INTERVAL).await;
                }
            }
        }

        // Newer Chromium wants PUT for /json/new, older builds accept GET.
        let new_target = format!("{}/json/new?url=about:blank", endpoint);
        let mut resp = client.put(&new_target).send().await.ok();
        if !resp.as_ref().map_or(false, |r| r.status().is_success()) {
            resp = client.get(&new_target).send().await.ok();
        }
        let resp = resp
            .filter(|r| r.status().is_success())
            .ok_or_else(|| BrowserError::Launch("devtools refused to open a new target".to_string()))?;

        let value: Value = resp
            .json()
            .await
            .map_err(|e| BrowserError::Launch(format!("devtools target response: {}", e)))?;
        let ws_url = value
            .get("webSocketDebuggerUrl")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BrowserError::Launch("devtools response missing webSocketDebuggerUrl".to_string())
            })?;
        Url::parse(ws_url)
            .map_err(|e| BrowserError::Launch(format!("bad websocket url {}: {}", ws_url, e)))?;
        Ok(ws_url.to_string())
    }
}

/// Wait for Chromium to report its actual debugging port through the
/// profile's `DevToolsActivePort` file. Reading the file the child itself
/// wrote ties the session to that exact process, never to another browser
/// that happens to be listening nearby. Fails as soon as the child exits.
async fn wait_for_devtools_port(
    child: &mut Child,
    port_file: &Path,
    deadline: Instant,
) -> Result<u16, BrowserError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                return Err(BrowserError::Launch(format!(
                    "browser exited before devtools came up: {}",
                    status
                )));
            }
            Ok(None) => {}
            Err(e) => return Err(BrowserError::Launch(format!("browser status: {}", e))),
        }
        if let Ok(contents) = tokio::fs::read_to_string(port_file).await {
            if let Some(port) = parse_devtools_port(&contents) {
                return Ok(port);
            }
        }
        if Instant::now() >= deadline {
            return Err(BrowserError::Launch(format!(
                "devtools port file {} did not appear (launch timeout)",
                port_file.display()
            )));
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// First line of `DevToolsActivePort` is the port; the second is the
/// browser target path. Only the port is needed here.
fn parse_devtools_port(contents: &str) -> Option<u16> {
    let port = contents.lines().next()?.trim().parse::<u16>().ok()?;
    (port != 0).then_some(port)
}

#[async_trait]
impl Browser for CdpBrowser {
    async fn launch(
        &self,
        options: &LaunchOptions,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<Box<dyn Page>, BrowserError> {
        let profile_dir = std::env::temp_dir().join(format!("lead-relay-{}", Uuid::new_v4()));
        let mut child = self.spawn_chromium(options, proxy, &profile_dir)?;

        let deadline = Instant::now() + options.launch_timeout;
        let port_file = profile_dir.join("DevToolsActivePort");
        let discovered = async {
            let port = wait_for_devtools_port(&mut child, &port_file, deadline).await?;
            let ws_url = self.discover_page_ws(port, deadline).await?;
            Ok::<_, BrowserError>((port, ws_url))
        }
        .await;
        let (port, ws_url) = match discovered {
            Ok(found) => found,
            Err(e) => {
                if let Err(kill_err) = child.kill().await {
                    warn!(error = %kill_err, "failed to kill browser after launch error");
                }
                return Err(e);
            }
        };

        let (ws, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|e| BrowserError::Launch(format!("devtools websocket: {}", e)))?;
        info!(port, proxied = proxy.is_some(), "browser session launched");

        let mut page = CdpPage {
            ws,
            next_id: 1,
            child: Some(child),
            auth: proxy.map(|p| (p.username.clone(), p.password.clone())),
            profile_dir,
        };
        page.command("Page.enable", json!({}), SETUP_TIMEOUT).await?;
        page.command("Runtime.enable", json!({}), SETUP_TIMEOUT).await?;
        if page.auth.is_some() {
            page.command("Fetch.enable", json!({ "handleAuthRequests": true }), SETUP_TIMEOUT)
                .await?;
        }
        Ok(Box::new(page))
    }
}

/// One CDP page target plus the Chromium process behind it.
struct CdpPage {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
    child: Option<Child>,
    auth: Option<(String, String)>,
    profile_dir: PathBuf,
}

impl CdpPage {
    /// Send a command and wait for its reply, answering interleaved Fetch
    /// events (auth challenges, paused requests) as they arrive.
    async fn command(
        &mut self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, BrowserError> {
        let id = self.send(method, params).await?;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BrowserError::Timeout(timeout, method.to_string()));
            }
            let frame = match tokio::time::timeout(remaining, self.ws.next()).await {
                Ok(frame) => frame,
                Err(_) => return Err(BrowserError::Timeout(timeout, method.to_string())),
            };
            let message = frame
                .ok_or(BrowserError::SessionClosed)?
                .map_err(|e| BrowserError::Protocol(e.to_string()))?;
            let Message::Text(text) = message else {
                continue;
            };
            let value: Value = match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(_) => continue,
            };

            if let Some(event) = value.get("method").and_then(Value::as_str) {
                let event = event.to_string();
                self.handle_event(&event, &value).await?;
                continue;
            }
            if value.get("id").and_then(Value::as_u64) == Some(id) {
                if let Some(error) = value.get("error") {
                    let detail = error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown CDP error");
                    return Err(BrowserError::Protocol(format!("{}: {}", method, detail)));
                }
                return Ok(value.get("result").cloned().unwrap_or(Value::Null));
            }
            // Replies to fire-and-forget sends fall through here.
        }
    }

    async fn send(&mut self, method: &str, params: Value) -> Result<u64, BrowserError> {
        let id = self.next_id;
        self.next_id += 1;
        let payload = json!({ "id": id, "method": method, "params": params }).to_string();
        self.ws
            .send(Message::Text(payload))
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        Ok(id)
    }

    async fn handle_event(&mut self, method: &str, event: &Value) -> Result<(), BrowserError> {
        let request_id = event
            .pointer("/params/requestId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match method {
            "Fetch.authRequired" => {
                let Some((username, password)) = self.auth.clone() else {
                    return Ok(());
                };
                debug!("answering proxy auth challenge");
                self.send(
                    "Fetch.continueWithAuth",
                    json!({
                        "requestId": request_id,
                        "authChallengeResponse": {
                            "response": "ProvideCredentials",
                            "username": username,
                            "password": password,
                        }
                    }),
                )
                .await?;
            }
            "Fetch.requestPaused" => {
                self.send("Fetch.continueRequest", json!({ "requestId": request_id }))
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Evaluate a script and return its value.
    async fn eval(&mut self, expression: &str, timeout: Duration) -> Result<Value, BrowserError> {
        let result = self
            .command(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true }),
                timeout,
            )
            .await?;
        if let Some(detail) = result
            .pointer("/exceptionDetails/exception/description")
            .and_then(Value::as_str)
        {
            return Err(BrowserError::Action(format!("script error: {}", detail)));
        }
        Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
    }

    /// Poll a boolean expression until it turns true or the deadline expires.
    async fn poll_js(
        &mut self,
        expression: &str,
        what: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BrowserError::Timeout(timeout, what.to_string()));
            }
            // Evaluation errors are transient while a navigation swaps the
            // execution context; keep polling until the deadline.
            let step = remaining.min(Duration::from_secs(2));
            if let Ok(value) = self.eval(expression, step).await {
                if value.as_bool() == Some(true) {
                    return Ok(());
                }
            }
            sleep(POLL_INTERVAL.min(remaining)).await;
        }
    }
}

/// Quote a string as a JavaScript literal.
fn js_str(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn visible_expr(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({}); \
         return !!el && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length); }})()",
        js_str(selector)
    )
}

#[async_trait]
impl Page for CdpPage {
    async fn goto(
        &mut self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        // One budget covers the whole navigation; whatever Page.navigate
        // consumes is no longer available to the load-state wait.
        let deadline = Instant::now() + timeout;
        let result = match self
            .command("Page.navigate", json!({ "url": url }), timeout)
            .await
        {
            Ok(result) => result,
            Err(e @ BrowserError::Timeout(..)) => return Err(e),
            Err(e) => return Err(BrowserError::Navigation(e.to_string())),
        };
        // Chromium reports net-stack failures (ERR_TUNNEL_CONNECTION_FAILED,
        // ERR_PROXY_CONNECTION_FAILED, ...) in errorText.
        if let Some(detail) = result.get("errorText").and_then(Value::as_str) {
            if !detail.is_empty() {
                return Err(BrowserError::Navigation(format!("{}: {}", url, detail)));
            }
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.wait_for_load_state(wait_until, remaining).await
    }

    async fn wait_for_load_state(
        &mut self,
        state: WaitUntil,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let expression = match state {
            WaitUntil::DomContentLoaded => {
                "document.readyState === 'interactive' || document.readyState === 'complete'"
            }
            WaitUntil::Load | WaitUntil::NetworkIdle => "document.readyState === 'complete'",
        };
        self.poll_js(expression, "load state", timeout).await?;
        if state == WaitUntil::NetworkIdle {
            sleep(NETWORK_IDLE_SETTLE).await;
        }
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let expression = match state {
            ElementState::Attached => format!("!!document.querySelector({})", js_str(selector)),
            ElementState::Visible => visible_expr(selector),
        };
        self.poll_js(&expression, selector, timeout).await
    }

    async fn fill(
        &mut self,
        selector: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             el.focus(); el.value = {val}; \
             el.dispatchEvent(new Event('input', {{bubbles: true}})); \
             el.dispatchEvent(new Event('change', {{bubbles: true}})); \
             return true; }})()",
            sel = js_str(selector),
            val = js_str(value),
        );
        match self.eval(&expression, timeout).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(BrowserError::ElementNotFound(selector.to_string())),
        }
    }

    async fn check(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             if (!el.checked) el.click(); \
             if (!el.checked) {{ el.checked = true; \
             el.dispatchEvent(new Event('change', {{bubbles: true}})); }} \
             return el.checked === true; }})()",
            sel = js_str(selector),
        );
        match self.eval(&expression, timeout).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(BrowserError::Action(format!("could not check {}", selector))),
        }
    }

    async fn click(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             el.click(); return true; }})()",
            sel = js_str(selector),
        );
        match self.eval(&expression, timeout).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(BrowserError::ElementNotFound(selector.to_string())),
        }
    }

    async fn input_value(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<String, BrowserError> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({sel}); \
             return el ? el.value : null; }})()",
            sel = js_str(selector),
        );
        match self.eval(&expression, timeout).await? {
            Value::String(value) => Ok(value),
            _ => Err(BrowserError::ElementNotFound(selector.to_string())),
        }
    }

    async fn text_content(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<String, BrowserError> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({sel}); \
             return el ? el.textContent : null; }})()",
            sel = js_str(selector),
        );
        match self.eval(&expression, timeout).await? {
            Value::String(value) => Ok(value),
            _ => Err(BrowserError::ElementNotFound(selector.to_string())),
        }
    }

    async fn screenshot(&mut self, path: &Path) -> Result<(), BrowserError> {
        let result = self
            .command(
                "Page.captureScreenshot",
                json!({ "format": "png" }),
                SCREENSHOT_TIMEOUT,
            )
            .await?;
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol("screenshot response missing data".to_string()))?;
        let bytes = BASE64
            .decode(data)
            .map_err(|e| BrowserError::Protocol(format!("screenshot decode: {}", e)))?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| BrowserError::Action(format!("write {}: {}", path.display(), e)))
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            debug!(error = %e, "websocket close failed");
        }
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill browser process");
            }
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.profile_dir).await {
            debug!(error = %e, "could not remove browser profile dir");
        }
        debug!("browser session closed");
    }
}
