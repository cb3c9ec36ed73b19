//! Playwright browser automation
//!
//! Each page session runs a small Node.js driver that launches a headless
//! browser and answers newline-delimited JSON requests on stdin/stdout.
//! Every request carries a deadline on both sides of the pipe.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, trace, warn};

use sitesweep_common::CaptureConfig;

use crate::error::{CaptureError, CaptureResult};
use crate::renderer::{PageRenderer, PageSession};

/// Driver program run by `node -e`. Resolves `playwright` from the working
/// directory or `NODE_PATH`.
const DRIVER_SCRIPT: &str = r#"
const { chromium } = require('playwright');
const readline = require('readline');

const reply = (obj) => process.stdout.write(JSON.stringify(obj) + '\n');

(async () => {
  const browser = await chromium.launch({ headless: true });
  const context = await browser.newContext({
    viewport: {
      width: parseInt(process.env.SITESWEEP_VIEWPORT_WIDTH || '1280', 10),
      height: parseInt(process.env.SITESWEEP_VIEWPORT_HEIGHT || '800', 10),
    },
    ignoreHTTPSErrors: true,
  });
  const page = await context.newPage();
  let messages = [];
  page.on('console', (msg) => {
    messages.push(`${msg.type().toUpperCase()} - ${msg.text()}`);
  });

  reply({ ok: true, ready: true });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    let req;
    try {
      req = JSON.parse(line);
    } catch (error) {
      reply({ ok: false, error: `bad request: ${error.message}` });
      continue;
    }
    try {
      switch (req.cmd) {
        case 'goto':
          messages = [];
          await page.goto(req.url, { waitUntil: 'commit', timeout: req.timeoutMs });
          reply({ ok: true });
          break;
        case 'wait_load':
          await page.waitForLoadState('load', { timeout: req.timeoutMs });
          reply({ ok: true });
          break;
        case 'scroll':
          await page.evaluate(async () => {
            await new Promise((resolve) => {
              const distance = 100;
              let ticks = 0;
              const timer = setInterval(() => {
                const el = document.scrollingElement || document.documentElement;
                el.scrollBy(0, distance);
                ticks += 1;
                if (el.scrollTop + window.innerHeight >= el.scrollHeight || ticks >= 300) {
                  clearInterval(timer);
                  resolve();
                }
              }, 100);
            });
          });
          reply({ ok: true });
          break;
        case 'screenshot': {
          const buf = await page.screenshot({ fullPage: true, timeout: req.timeoutMs });
          reply({ ok: true, data: buf.toString('base64') });
          break;
        }
        case 'html':
          reply({ ok: true, data: await page.content() });
          break;
        case 'console':
          reply({ ok: true, lines: messages.slice() });
          break;
        case 'close':
          await browser.close();
          reply({ ok: true });
          process.exit(0);
          break;
        default:
          reply({ ok: false, error: `unknown command: ${req.cmd}` });
      }
    } catch (error) {
      reply({ ok: false, error: error.message });
    }
  }
  await browser.close();
})().catch((error) => {
  reply({ ok: false, error: error.message });
  process.exit(1);
});
"#;

/// Slack on top of the request deadline before the driver counts as hung
const DRIVER_GRACE: Duration = Duration::from_secs(5);

/// How long a closed driver gets to exit
const DRIVER_EXIT_GRACE: Duration = Duration::from_secs(5);

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub node_binary: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Deadline for navigation and for every other request
    pub request_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            node_binary: PathBuf::from("node"),
            viewport_width: 1280,
            viewport_height: 800,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&CaptureConfig> for PlaywrightConfig {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            node_binary: config.node_binary.clone(),
            viewport_width: config.viewport_width,
            viewport_height: config.viewport_height,
            request_timeout: config.navigation_timeout(),
        }
    }
}

/// Renderer backed by a Playwright driver process per page
#[derive(Debug, Clone)]
pub struct PlaywrightRenderer {
    config: PlaywrightConfig,
}

impl PlaywrightRenderer {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PageRenderer for PlaywrightRenderer {
    async fn open(&self, url: &str) -> CaptureResult<Box<dyn PageSession>> {
        let mut session = PlaywrightSession::spawn(&self.config).await?;
        let timeout_ms = session.timeout_ms();
        session
            .request(&DriverRequest::Goto {
                url: url.to_string(),
                timeout_ms,
            })
            .await?;
        debug!("Opened {}", url);
        Ok(Box::new(session))
    }
}

/// Requests understood by the driver
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum DriverRequest {
    Goto {
        url: String,
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
    },
    WaitLoad {
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
    },
    Scroll,
    Screenshot {
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
    },
    Html,
    Console,
    Close,
}

impl DriverRequest {
    fn name(&self) -> &'static str {
        match self {
            DriverRequest::Goto { .. } => "goto",
            DriverRequest::WaitLoad { .. } => "wait_load",
            DriverRequest::Scroll => "scroll",
            DriverRequest::Screenshot { .. } => "screenshot",
            DriverRequest::Html => "html",
            DriverRequest::Console => "console",
            DriverRequest::Close => "close",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DriverResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    lines: Option<Vec<String>>,
}

/// A running driver process bound to one page
pub struct PlaywrightSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    request_timeout: Duration,
    /// Set once a request timed out or the pipe broke; the driver may still
    /// answer a stale request, so nothing more is sent.
    broken: bool,
}

impl PlaywrightSession {
    async fn spawn(config: &PlaywrightConfig) -> CaptureResult<Self> {
        let mut child = Command::new(&config.node_binary)
            .arg("-e")
            .arg(DRIVER_SCRIPT)
            .env("SITESWEEP_VIEWPORT_WIDTH", config.viewport_width.to_string())
            .env("SITESWEEP_VIEWPORT_HEIGHT", config.viewport_height.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CaptureError::DriverStartup(format!(
                    "failed to spawn {}: {}",
                    config.node_binary.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CaptureError::DriverStartup("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::DriverStartup("driver stdout unavailable".to_string()))?;

        let mut session = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            request_timeout: config.request_timeout,
            broken: false,
        };

        let ready = session.read_response("launch").await?;
        if !ready.ok {
            return Err(CaptureError::DriverStartup(
                ready.error.unwrap_or_else(|| "browser launch failed".to_string()),
            ));
        }

        Ok(session)
    }

    fn timeout_ms(&self) -> u64 {
        self.request_timeout.as_millis() as u64
    }

    /// Send one request and wait for its response
    async fn request(&mut self, request: &DriverRequest) -> CaptureResult<DriverResponse> {
        if self.broken {
            return Err(CaptureError::Disconnected);
        }
        let line = serde_json::to_string(request)?;
        trace!("Driver request: {}", request.name());

        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;

        let response = self.read_response(request.name()).await?;
        if !response.ok {
            return Err(CaptureError::Request {
                request: request.name().to_string(),
                reason: response.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        Ok(response)
    }

    async fn read_response(&mut self, what: &str) -> CaptureResult<DriverResponse> {
        // The driver enforces the request deadline itself; ours is a backstop.
        let deadline = self.request_timeout + DRIVER_GRACE;
        let line = match tokio::time::timeout(deadline, self.stdout.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                self.broken = true;
                return Err(CaptureError::Disconnected);
            }
            Ok(Err(e)) => {
                self.broken = true;
                return Err(e.into());
            }
            Err(_) => {
                self.broken = true;
                return Err(CaptureError::Timeout {
                    what: what.to_string(),
                    seconds: deadline.as_secs(),
                });
            }
        };

        serde_json::from_str(&line)
            .map_err(|e| CaptureError::Protocol(format!("{}: {}", e, line.chars().take(200).collect::<String>())))
    }
}

#[async_trait]
impl PageSession for PlaywrightSession {
    async fn wait_until_loaded(&mut self) -> CaptureResult<()> {
        let timeout_ms = self.timeout_ms();
        self.request(&DriverRequest::WaitLoad { timeout_ms }).await?;
        Ok(())
    }

    async fn scroll_to_end(&mut self) -> CaptureResult<()> {
        self.request(&DriverRequest::Scroll).await?;
        Ok(())
    }

    async fn screenshot(&mut self) -> CaptureResult<Vec<u8>> {
        let timeout_ms = self.timeout_ms();
        let response = self.request(&DriverRequest::Screenshot { timeout_ms }).await?;
        let data = response
            .data
            .ok_or_else(|| CaptureError::Protocol("screenshot without data".to_string()))?;
        Ok(base64::engine::general_purpose::STANDARD.decode(data)?)
    }

    async fn html(&mut self) -> CaptureResult<String> {
        let response = self.request(&DriverRequest::Html).await?;
        response
            .data
            .ok_or_else(|| CaptureError::Protocol("html without data".to_string()))
    }

    async fn console_log(&mut self) -> CaptureResult<Vec<String>> {
        let response = self.request(&DriverRequest::Console).await?;
        Ok(response.lines.unwrap_or_default())
    }

    async fn close(mut self: Box<Self>) -> CaptureResult<()> {
        if self.broken {
            self.child.kill().await?;
            return Ok(());
        }
        if let Err(e) = self.request(&DriverRequest::Close).await {
            warn!("Renderer did not close cleanly: {}", e);
            self.child.kill().await?;
            return Ok(());
        }
        match tokio::time::timeout(DRIVER_EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!("Renderer exited with {}", status),
            Ok(Err(e)) => warn!("Failed to reap renderer: {}", e),
            Err(_) => {
                warn!("Renderer did not exit after close; killing it");
                self.child.kill().await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playwright_config_default() {
        let config = PlaywrightConfig::default();
        assert_eq!(config.viewport_width, 1280);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_config_from_capture_settings() {
        let capture = CaptureConfig {
            navigation_timeout_secs: 90,
            viewport_width: 390,
            ..Default::default()
        };
        let config = PlaywrightConfig::from(&capture);
        assert_eq!(config.request_timeout, Duration::from_secs(90));
        assert_eq!(config.viewport_width, 390);
        assert_eq!(config.viewport_height, 800);
    }

    #[test]
    fn test_request_wire_format() {
        let goto = DriverRequest::Goto {
            url: "https://example.com/".to_string(),
            timeout_ms: 1500,
        };
        let json = serde_json::to_value(&goto).unwrap();
        assert_eq!(json["cmd"], "goto");
        assert_eq!(json["url"], "https://example.com/");
        assert_eq!(json["timeoutMs"], 1500);

        let json = serde_json::to_value(&DriverRequest::WaitLoad { timeout_ms: 10 }).unwrap();
        assert_eq!(json["cmd"], "wait_load");

        let json = serde_json::to_value(&DriverRequest::Console).unwrap();
        assert_eq!(json, serde_json::json!({ "cmd": "console" }));
    }

    #[test]
    fn test_response_parsing() {
        let response: DriverResponse =
            serde_json::from_str(r#"{"ok":true,"lines":["LOG - a","ERROR - b"]}"#).unwrap();
        assert!(response.ok);
        assert_eq!(response.lines.unwrap(), vec!["LOG - a", "ERROR - b"]);

        let response: DriverResponse =
            serde_json::from_str(r#"{"ok":false,"error":"net::ERR_NAME_NOT_RESOLVED"}"#).unwrap();
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("net::ERR_NAME_NOT_RESOLVED"));
    }

    /// Stand-in driver that announces readiness and then never answers
    #[cfg(unix)]
    fn hanging_driver(dir: &std::path::Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("node");
        std::fs::write(&path, "#!/bin/sh\necho '{\"ok\":true,\"ready\":true}'\nexec sleep 60\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn hanging_config(dir: &std::path::Path) -> PlaywrightConfig {
        PlaywrightConfig {
            node_binary: hanging_driver(dir),
            request_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_driver_times_out_navigation() {
        let tmp = tempfile::TempDir::new().unwrap();
        let renderer = PlaywrightRenderer::new(hanging_config(tmp.path()));

        let err = renderer.open("https://example.com/").await.err().unwrap();
        match err {
            CaptureError::Timeout { what, seconds } => {
                assert_eq!(what, "goto");
                assert_eq!(seconds, DRIVER_GRACE.as_secs());
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_session_refuses_further_requests() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut session = PlaywrightSession::spawn(&hanging_config(tmp.path()))
            .await
            .unwrap();

        let err = session.wait_until_loaded().await.err().unwrap();
        assert!(matches!(err, CaptureError::Timeout { .. }));
        assert!(session.broken);

        // Nothing more is written to a driver that may answer stale requests
        let err = session.html().await.err().unwrap();
        assert!(matches!(err, CaptureError::Disconnected));
        let err = session.console_log().await.err().unwrap();
        assert!(matches!(err, CaptureError::Disconnected));

        Box::new(session).close().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_node_binary_is_startup_error() {
        let renderer = PlaywrightRenderer::new(PlaywrightConfig {
            node_binary: PathBuf::from("/nonexistent/sitesweep-node"),
            ..Default::default()
        });
        let err = renderer.open("https://example.com/").await.err().unwrap();
        assert!(matches!(err, CaptureError::DriverStartup(_)));
    }
}
