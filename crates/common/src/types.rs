//! Core types for sitesweep

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Remote connection descriptor for a site.
///
/// Credentials are passed through to the remote executor untouched; the
/// password is redacted from `Debug` output so it never reaches the logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, alias = "privateKey")]
    pub private_key: Option<PathBuf>,
    /// Site root on the remote host
    pub path: String,
}

fn default_ssh_port() -> u16 {
    22
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key)
            .field("path", &self.path)
            .finish()
    }
}

/// One managed CMS installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub key: String,
    pub domain: String,
    pub credentials: Credentials,
    pub pages: Vec<String>,
}

/// Capture phase relative to the update step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Before,
    After,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Before => "before",
            Phase::After => "after",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three independent drift signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonKind {
    Visual,
    Html,
    Console,
}

impl ComparisonKind {
    pub const ALL: [ComparisonKind; 3] = [
        ComparisonKind::Visual,
        ComparisonKind::Html,
        ComparisonKind::Console,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ComparisonKind::Visual => "visual",
            ComparisonKind::Html => "html",
            ComparisonKind::Console => "console",
        }
    }

    /// File extension of the artifact this signal is computed from
    pub fn extension(&self) -> &'static str {
        match self {
            ComparisonKind::Visual => "png",
            ComparisonKind::Html => "html",
            ComparisonKind::Console => "log",
        }
    }

    pub fn default_threshold(&self) -> f64 {
        match self {
            ComparisonKind::Visual => 98.0,
            ComparisonKind::Html => 95.0,
            ComparisonKind::Console => 95.0,
        }
    }
}

impl fmt::Display for ComparisonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A comparator together with its pass threshold (percent)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparisonDescriptor {
    pub kind: ComparisonKind,
    pub threshold: f64,
}

impl ComparisonDescriptor {
    pub fn new(kind: ComparisonKind, threshold: f64) -> Self {
        Self { kind, threshold }
    }

    pub fn extension(&self) -> &'static str {
        self.kind.extension()
    }
}

/// Map a page URL to a filesystem-safe identifier.
///
/// Keeps ASCII letters and digits, lower-cased. Distinct URLs can collide
/// (`/a-b` and `/ab`), in which case they share a folder.
pub fn sanitize(url: &str) -> String {
    url.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// A page of a site, located inside the site's run folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub url: String,
    pub id: String,
    pub folder: PathBuf,
}

impl Page {
    pub fn new(site_folder: &Path, url: impl Into<String>) -> Self {
        let url = url.into();
        let mut id = sanitize(&url);
        if id.is_empty() {
            id = "page".to_string();
        }
        Self {
            folder: site_folder.join(&id),
            url,
            id,
        }
    }

    /// Location of one signal's artifact for one phase
    pub fn artifact_path(&self, kind: ComparisonKind, phase: Phase) -> PathBuf {
        self.folder
            .join(format!("{}.{}", phase.as_str(), kind.extension()))
    }
}

/// Score of one (site, page, comparator) triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub site: String,
    pub url: String,
    pub comparison: ComparisonKind,
    /// `None` when the comparator could not produce a score
    pub score: Option<f64>,
    pub threshold: f64,
    pub pass: bool,
    pub error: Option<String>,
}

impl ComparisonResult {
    /// Build a result from a raw score; the score is rounded to two decimals
    /// before it is checked against the threshold.
    pub fn scored(site: &str, url: &str, descriptor: &ComparisonDescriptor, raw: f64) -> Self {
        let score = round_score(raw);
        Self {
            site: site.to_string(),
            url: url.to_string(),
            comparison: descriptor.kind,
            score: Some(score),
            threshold: descriptor.threshold,
            pass: score >= descriptor.threshold,
            error: None,
        }
    }

    /// Build a result for a comparator that failed on this page
    pub fn undefined(
        site: &str,
        url: &str,
        descriptor: &ComparisonDescriptor,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            site: site.to_string(),
            url: url.to_string(),
            comparison: descriptor.kind,
            score: None,
            threshold: descriptor.threshold,
            pass: false,
            error: Some(error.to_string()),
        }
    }
}

pub fn round_score(raw: f64) -> f64 {
    (raw * 100.0).round() / 100.0
}
