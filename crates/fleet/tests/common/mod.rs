//! In-memory renderer, executor and purger for fleet tests

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use sitesweep_capture::{CaptureError, CaptureResult, PageRenderer, PageSession, SnapshotCapture};
use sitesweep_common::{Credentials, ProgressStore, Site, Thresholds};
use sitesweep_fleet::{PipelineContext, RunOptions};
use sitesweep_remote::{
    CachePurger, CommandOutput, RemoteError, RemoteExecutor, RemoteResult, RemoteSession,
};

/// Hosts that have run their core update
pub type Updated = Arc<Mutex<HashSet<String>>>;

pub fn png() -> Vec<u8> {
    let img = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, ImageOutputFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Renders ten lines of HTML, plus one once the host was updated. The
/// console loses its second line after the update.
pub struct FakeRenderer {
    pub updated: Updated,
    pub failing_hosts: HashSet<String>,
    pub silent_console: bool,
    pub opened: AtomicUsize,
}

struct FakeSession {
    url: String,
    updated: bool,
    silent_console: bool,
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn open(&self, url: &str) -> CaptureResult<Box<dyn PageSession>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.failing_hosts.iter().any(|h| url.contains(h.as_str())) {
            return Err(CaptureError::Timeout {
                what: format!("navigation to {}", url),
                seconds: 60,
            });
        }

        let updated = self.updated.lock().unwrap().iter().any(|h| url.contains(h.as_str()));
        Ok(Box::new(FakeSession {
            url: url.to_string(),
            updated,
            silent_console: self.silent_console,
        }))
    }
}

#[async_trait]
impl PageSession for FakeSession {
    async fn wait_until_loaded(&mut self) -> CaptureResult<()> {
        Ok(())
    }

    async fn scroll_to_end(&mut self) -> CaptureResult<()> {
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn screenshot(&mut self) -> CaptureResult<Vec<u8>> {
        Ok(png())
    }

    async fn html(&mut self) -> CaptureResult<String> {
        let mut html: String = (0..10).map(|i| format!("<p>{} {}</p>\n", self.url, i)).collect();
        if self.updated {
            html.push_str("<p>new plugin banner</p>\n");
        }
        Ok(html)
    }

    async fn console_log(&mut self) -> CaptureResult<Vec<String>> {
        if self.silent_console {
            return Ok(Vec::new());
        }
        let mut lines = vec!["LOG - a".to_string()];
        if !self.updated {
            lines.push("LOG - b".to_string());
        }
        Ok(lines)
    }

    async fn close(self: Box<Self>) -> CaptureResult<()> {
        Ok(())
    }
}

struct FakeRemoteSession {
    host: String,
    updated: Updated,
    failing: Vec<String>,
    log: Arc<Mutex<Vec<(String, String)>>>,
}

/// Records `(host, command)` pairs and marks a host updated on its core
/// update. Commands matching a failing `(host, prefix)` exit with 1.
pub struct SharedExecutor(pub Arc<FakeExecutorInner>);

pub struct FakeExecutorInner {
    pub updated: Updated,
    pub failing: Vec<(String, String)>,
    pub log: Arc<Mutex<Vec<(String, String)>>>,
}

impl SharedExecutor {
    pub fn new(updated: Updated, failing: Vec<(&str, &str)>) -> Self {
        Self(Arc::new(FakeExecutorInner {
            updated,
            failing: failing
                .into_iter()
                .map(|(h, c)| (h.to_string(), c.to_string()))
                .collect(),
            log: Arc::new(Mutex::new(Vec::new())),
        }))
    }

    pub fn commands_for(&self, host: &str) -> Vec<String> {
        self.0
            .log
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn hosts(&self) -> HashSet<String> {
        self.0.log.lock().unwrap().iter().map(|(h, _)| h.clone()).collect()
    }
}

#[async_trait]
impl RemoteExecutor for SharedExecutor {
    async fn connect(&self, credentials: &Credentials) -> RemoteResult<Box<dyn RemoteSession>> {
        self.0
            .log
            .lock()
            .unwrap()
            .push((credentials.host.clone(), "connect".to_string()));
        Ok(Box::new(FakeRemoteSession {
            host: credentials.host.clone(),
            updated: self.0.updated.clone(),
            failing: self
                .0
                .failing
                .iter()
                .filter(|(h, _)| *h == credentials.host)
                .map(|(_, c)| c.clone())
                .collect(),
            log: self.0.log.clone(),
        }))
    }
}

#[async_trait]
impl RemoteSession for FakeRemoteSession {
    async fn run(&mut self, command: &str, _cwd: Option<&str>) -> RemoteResult<CommandOutput> {
        self.log
            .lock()
            .unwrap()
            .push((self.host.clone(), command.to_string()));

        if command.starts_with("wp core update") {
            self.updated.lock().unwrap().insert(self.host.clone());
        }

        let fails = self.failing.iter().any(|prefix| command.starts_with(prefix.as_str()));
        Ok(CommandOutput {
            stdout: format!("ran {}", command),
            stderr: if fails { "Error: failed".to_string() } else { String::new() },
            exit_code: Some(if fails { 1 } else { 0 }),
        })
    }

    async fn transfer_file(&mut self, remote_path: &str, local_path: &Path) -> RemoteResult<()> {
        self.log
            .lock()
            .unwrap()
            .push((self.host.clone(), format!("transfer {}", remote_path)));
        tokio::fs::write(local_path, b"PK").await.map_err(RemoteError::from)
    }

    async fn close(self: Box<Self>) -> RemoteResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePurger {
    pub calls: AtomicUsize,
}

#[async_trait]
impl CachePurger for FakePurger {
    async fn purge(&self, _domain: &str) -> RemoteResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Collaborators of one test run
pub struct Harness {
    pub tmp: TempDir,
    pub updated: Updated,
    pub renderer: Arc<FakeRenderer>,
    pub executor: Arc<SharedExecutor>,
    pub purger: Arc<FakePurger>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(TempDir::new().unwrap(), &[], &[], false)
    }

    pub fn with(
        tmp: TempDir,
        failing_hosts: &[&str],
        failing_commands: &[(&str, &str)],
        silent_console: bool,
    ) -> Self {
        let updated: Updated = Arc::default();
        let renderer = FakeRenderer {
            updated: updated.clone(),
            failing_hosts: failing_hosts.iter().map(|h| h.to_string()).collect(),
            silent_console,
            opened: AtomicUsize::new(0),
        };
        let executor = SharedExecutor::new(updated.clone(), failing_commands.to_vec());

        Self {
            tmp,
            updated,
            renderer: Arc::new(renderer),
            executor: Arc::new(executor),
            purger: Arc::new(FakePurger::default()),
        }
    }

    pub fn context(&self, options: RunOptions) -> PipelineContext {
        PipelineContext {
            capture: SnapshotCapture::new(self.renderer.clone(), Duration::ZERO),
            executor: self.executor.clone(),
            purger: self.purger.clone(),
            descriptors: Thresholds::default().descriptors(),
            options,
            page_permits: Arc::new(Semaphore::new(4)),
        }
    }

    pub fn progress_path(&self) -> std::path::PathBuf {
        self.tmp.path().join(".progress.json")
    }

    pub async fn store(&self, dry_run: bool) -> Arc<ProgressStore> {
        Arc::new(
            ProgressStore::open(&self.progress_path(), &self.tmp.path().join("output"), false, dry_run)
                .await
                .unwrap(),
        )
    }
}

pub fn site(key: &str) -> Site {
    let domain = format!("{}.test", key);
    Site {
        key: key.to_string(),
        pages: vec![format!("https://{}/", domain)],
        credentials: Credentials {
            host: domain.clone(),
            port: 22,
            username: "deploy".into(),
            password: None,
            private_key: None,
            path: format!("/var/www/{}", key),
        },
        domain,
    }
}
