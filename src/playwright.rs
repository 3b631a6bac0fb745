//! Playwright-backed `PageDriver`
//!
//! Drives a Playwright page through a long-lived Node child process
//! speaking a line-delimited JSON protocol on stdin/stdout. One request,
//! one reply; the page and its state live for the whole session, so
//! navigation survives across calls.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::checks::Viewport;
use crate::driver::{PageDriver, WaitPolicy};
use crate::error::{AuditError, AuditResult};

#[derive(Debug, Clone, Copy, Default)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Configuration for launching the Playwright driver.
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    /// Accept pages with invalid TLS certificates.
    pub ignore_https_errors: bool,
    /// Slow every driver operation down, for debugging.
    pub slow_mo_ms: u64,
    /// Viewport the page starts with.
    pub initial_viewport: Viewport,
    /// How long to wait for the browser to come up.
    pub launch_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            ignore_https_errors: true,
            slow_mo_ms: 0,
            initial_viewport: Viewport { width: 1200, height: 2000 },
            launch_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DriverReply {
    ok: bool,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

struct DriverIo {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// A Playwright browser/context/page triple behind the JSON protocol.
pub struct PlaywrightDriver {
    io: Mutex<DriverIo>,
    // Keeps the bootstrap script alive for the child's lifetime.
    _script_dir: tempfile::TempDir,
}

impl PlaywrightDriver {
    /// Launch the browser. Verifies the Playwright install first.
    pub async fn launch(config: PlaywrightConfig) -> AuditResult<Self> {
        Self::check_playwright_installed()?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("driver.js");
        std::fs::write(&script_path, BOOTSTRAP)?;

        let launch_args = json!({
            "browser": config.browser.as_str(),
            "headless": config.headless,
            "slowMo": config.slow_mo_ms,
            "ignoreHttpsErrors": config.ignore_https_errors,
            "viewportWidth": config.initial_viewport.width,
            "viewportHeight": config.initial_viewport.height,
        });

        debug!(browser = config.browser.as_str(), "launching playwright driver");

        let mut child = Command::new("node")
            .arg(&script_path)
            .arg(launch_args.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AuditError::BrowserLaunch(format!("failed to spawn node: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AuditError::BrowserLaunch("no stdin pipe".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AuditError::BrowserLaunch("no stdout pipe".to_string()))?;
        let mut stdout = BufReader::new(stdout).lines();

        // First line out of the child is the ready (or failure) report.
        let ready = tokio::time::timeout(config.launch_timeout, stdout.next_line())
            .await
            .map_err(|_| AuditError::BrowserLaunch("browser startup timed out".to_string()))?
            .map_err(AuditError::Io)?
            .ok_or_else(|| AuditError::BrowserLaunch("driver exited during startup".to_string()))?;

        let reply: DriverReply = serde_json::from_str(&ready)?;
        if !reply.ok {
            return Err(AuditError::BrowserLaunch(
                reply.error.unwrap_or_else(|| "unknown launch failure".to_string()),
            ));
        }

        info!(browser = config.browser.as_str(), "playwright driver ready");
        Ok(Self {
            io: Mutex::new(DriverIo { child, stdin, stdout }),
            _script_dir: script_dir,
        })
    }

    /// Check the Playwright CLI is available via npx.
    fn check_playwright_installed() -> AuditResult<()> {
        let status = std::process::Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(AuditError::PlaywrightNotFound),
        }
    }

    /// Send one request and wait for its reply.
    async fn call(&self, request: Value) -> AuditResult<Value> {
        let mut io = self.io.lock().await;

        let line = serde_json::to_string(&request)?;
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.write_all(b"\n").await?;
        io.stdin.flush().await?;

        let reply = io
            .stdout
            .next_line()
            .await?
            .ok_or_else(|| AuditError::Driver("driver process closed".to_string()))?;
        let reply: DriverReply = serde_json::from_str(&reply)?;

        if reply.ok {
            Ok(reply.value.unwrap_or(Value::Null))
        } else {
            Err(AuditError::Driver(
                reply.error.unwrap_or_else(|| "unknown driver error".to_string()),
            ))
        }
    }

    fn as_string(value: Value) -> AuditResult<String> {
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| AuditError::Driver("expected string reply".to_string()))
    }
}

#[async_trait]
impl PageDriver for PlaywrightDriver {
    async fn navigate(&self, url: &str, wait: WaitPolicy) -> AuditResult<()> {
        self.call(json!({"op": "navigate", "url": url, "wait": wait.as_str()}))
            .await?;
        Ok(())
    }

    async fn current_url(&self) -> AuditResult<String> {
        Self::as_string(self.call(json!({"op": "url"})).await?)
    }

    async fn set_viewport(&self, width: u32, height: u32, scale: f64) -> AuditResult<()> {
        // Playwright fixes the device scale factor at context creation;
        // only the size is adjustable afterwards.
        let _ = scale;
        self.call(json!({"op": "viewport", "width": width, "height": height}))
            .await?;
        Ok(())
    }

    async fn title(&self) -> AuditResult<String> {
        Self::as_string(self.call(json!({"op": "title"})).await?)
    }

    async fn count(&self, selector: &str) -> AuditResult<usize> {
        let value = self.call(json!({"op": "count", "selector": selector})).await?;
        value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| AuditError::Driver("expected numeric reply".to_string()))
    }

    async fn attribute(&self, selector: &str, attribute: &str) -> AuditResult<Option<String>> {
        let value = self
            .call(json!({"op": "attribute", "selector": selector, "name": attribute}))
            .await?;
        Ok(value.as_str().map(String::from))
    }

    async fn computed_style(
        &self,
        selector: &str,
        index: usize,
        property: &str,
    ) -> AuditResult<Option<String>> {
        let value = self
            .call(json!({
                "op": "style",
                "selector": selector,
                "index": index,
                "property": property,
            }))
            .await?;
        Ok(value.as_str().map(String::from))
    }

    async fn hover(&self, selector: &str, index: usize) -> AuditResult<()> {
        self.call(json!({"op": "hover", "selector": selector, "index": index}))
            .await
            .map_err(|e| AuditError::InteractionFailed {
                selector: selector.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn focus(&self, selector: &str, index: usize) -> AuditResult<()> {
        self.call(json!({"op": "focus", "selector": selector, "index": index}))
            .await
            .map_err(|e| AuditError::InteractionFailed {
                selector: selector.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> AuditResult<()> {
        self.call(json!({"op": "click", "selector": selector})).await?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> AuditResult<()> {
        self.call(json!({"op": "type", "selector": selector, "text": text}))
            .await?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path, full_page: bool) -> AuditResult<()> {
        self.call(json!({
            "op": "screenshot",
            "path": path.to_string_lossy(),
            "fullPage": full_page,
        }))
        .await?;
        Ok(())
    }

    async fn head_markup(&self) -> AuditResult<String> {
        Self::as_string(self.call(json!({"op": "head"})).await?)
    }

    async fn close(&self) -> AuditResult<()> {
        // The child exits on its own after acknowledging.
        self.call(json!({"op": "close"})).await?;
        let mut io = self.io.lock().await;
        if let Err(e) = io.child.wait().await {
            warn!(error = %e, "driver process did not exit cleanly");
        }
        Ok(())
    }
}

/// The Node side of the protocol. One JSON command per stdin line, one
/// JSON reply per stdout line; the first line out is the ready report.
const BOOTSTRAP: &str = r#"
const { chromium, firefox, webkit } = require('playwright');
const readline = require('readline');

const config = JSON.parse(process.argv[2]);
const engines = { chromium, firefox, webkit };
const reply = (value) => process.stdout.write(JSON.stringify(value) + '\n');

(async () => {
  let browser;
  try {
    browser = await engines[config.browser].launch({
      headless: config.headless,
      slowMo: config.slowMo,
    });
  } catch (e) {
    reply({ ok: false, error: e.message });
    process.exit(1);
  }
  const context = await browser.newContext({
    viewport: { width: config.viewportWidth, height: config.viewportHeight },
    ignoreHTTPSErrors: config.ignoreHttpsErrors,
  });
  const page = await context.newPage();
  reply({ ok: true });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    let cmd;
    try {
      cmd = JSON.parse(line);
    } catch (e) {
      reply({ ok: false, error: 'bad command: ' + e.message });
      continue;
    }
    try {
      switch (cmd.op) {
        case 'navigate':
          await page.goto(cmd.url, { waitUntil: cmd.wait });
          reply({ ok: true });
          break;
        case 'url':
          reply({ ok: true, value: page.url() });
          break;
        case 'viewport':
          await page.setViewportSize({ width: cmd.width, height: cmd.height });
          reply({ ok: true });
          break;
        case 'title':
          reply({ ok: true, value: await page.title() });
          break;
        case 'count':
          reply({ ok: true, value: await page.locator(cmd.selector).count() });
          break;
        case 'attribute': {
          if (await page.locator(cmd.selector).count() === 0) {
            reply({ ok: true, value: null });
            break;
          }
          const value = await page.locator(cmd.selector).first().evaluate(
            (el, name) => (el[name] !== undefined ? String(el[name]) : el.getAttribute(name)),
            cmd.name
          );
          reply({ ok: true, value });
          break;
        }
        case 'style': {
          if (await page.locator(cmd.selector).count() <= cmd.index) {
            reply({ ok: true, value: null });
            break;
          }
          const value = await page.locator(cmd.selector).nth(cmd.index).evaluate(
            (el, prop) => window.getComputedStyle(el).getPropertyValue(prop),
            cmd.property
          );
          reply({ ok: true, value });
          break;
        }
        case 'hover':
          await page.locator(cmd.selector).nth(cmd.index).hover();
          reply({ ok: true });
          break;
        case 'focus':
          await page.locator(cmd.selector).nth(cmd.index).focus();
          reply({ ok: true });
          break;
        case 'click':
          await page.click(cmd.selector);
          reply({ ok: true });
          break;
        case 'type':
          await page.fill(cmd.selector, cmd.text);
          reply({ ok: true });
          break;
        case 'screenshot':
          await page.screenshot({ path: cmd.path, fullPage: cmd.fullPage });
          reply({ ok: true });
          break;
        case 'head':
          reply({ ok: true, value: await page.$eval('head', (el) => el.innerHTML) });
          break;
        case 'close':
          await browser.close();
          reply({ ok: true });
          process.exit(0);
        default:
          reply({ ok: false, error: 'unknown op: ' + cmd.op });
      }
    } catch (e) {
      reply({ ok: false, error: e.message });
    }
  }
})().catch((e) => {
  reply({ ok: false, error: e.message });
  process.exit(1);
});
"#;
