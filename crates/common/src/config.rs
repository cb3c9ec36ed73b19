//! Fleet configuration loaded from YAML

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{ComparisonDescriptor, ComparisonKind, Credentials, Site};
use crate::{Error, Result};

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Default progress file, relative to the working directory
pub const DEFAULT_PROGRESS_FILE: &str = ".progress.json";

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Root directory for timestamped run folders
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Resume record location
    #[serde(default = "default_progress_file")]
    pub progress_file: PathBuf,

    /// Pass thresholds per signal
    #[serde(default)]
    pub thresholds: Thresholds,

    /// Renderer settings
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Remote execution settings
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Managed sites keyed by site key
    pub sites: BTreeMap<String, SiteConfig>,
}

fn default_output() -> PathBuf {
    PathBuf::from("./output")
}

fn default_progress_file() -> PathBuf {
    PathBuf::from(DEFAULT_PROGRESS_FILE)
}

/// Per-signal pass thresholds in percent. Unset entries use the signal default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Thresholds {
    pub visual: Option<f64>,
    pub html: Option<f64>,
    pub console: Option<f64>,
}

impl Thresholds {
    pub fn for_kind(&self, kind: ComparisonKind) -> f64 {
        let configured = match kind {
            ComparisonKind::Visual => self.visual,
            ComparisonKind::Html => self.html,
            ComparisonKind::Console => self.console,
        };
        configured.unwrap_or_else(|| kind.default_threshold())
    }

    /// The comparator catalog in evaluation order
    pub fn descriptors(&self) -> Vec<ComparisonDescriptor> {
        ComparisonKind::ALL
            .iter()
            .map(|kind| ComparisonDescriptor::new(*kind, self.for_kind(*kind)))
            .collect()
    }
}

/// Page renderer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Delay after scrolling to the bottom, before capturing
    pub settle_delay_ms: u64,

    /// Upper bound for navigation and every other renderer request
    pub navigation_timeout_secs: u64,

    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Maximum renderer sessions open at once across the fleet
    pub max_concurrent_pages: usize,

    /// Node.js binary used to run the Playwright driver
    pub node_binary: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 5000,
            navigation_timeout_secs: 60,
            viewport_width: 1280,
            viewport_height: 800,
            max_concurrent_pages: 8,
            node_binary: PathBuf::from("node"),
        }
    }
}

impl CaptureConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

/// Remote execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub purge_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 20,
            command_timeout_secs: 900,
            purge_timeout_secs: 5,
        }
    }
}

impl RemoteConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn purge_timeout(&self) -> Duration {
        Duration::from_secs(self.purge_timeout_secs)
    }
}

/// A site entry as written in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub domain: String,
    pub credentials: Credentials,
    #[serde(default)]
    pub pages: Vec<String>,
}

impl FleetConfig {
    /// Load and validate configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sites.is_empty() {
            return Err(Error::InvalidConfig("no sites configured".to_string()));
        }

        for (key, site) in &self.sites {
            if site.domain.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("site '{}' has an empty domain", key)));
            }
            if site.credentials.port == 0 {
                return Err(Error::InvalidConfig(format!("site '{}' has port 0", key)));
            }
            if !site.credentials.path.starts_with('/') {
                return Err(Error::InvalidConfig(format!(
                    "site '{}' remote path must be absolute, got '{}'",
                    key, site.credentials.path
                )));
            }
        }

        for kind in ComparisonKind::ALL {
            let threshold = self.thresholds.for_kind(kind);
            if !(0.0..=100.0).contains(&threshold) {
                return Err(Error::InvalidConfig(format!(
                    "{} threshold {} is outside 0-100",
                    kind, threshold
                )));
            }
        }

        if self.capture.max_concurrent_pages == 0 {
            return Err(Error::InvalidConfig(
                "capture.max_concurrent_pages must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve configured sites, filling in the homepage for sites without pages
    pub fn sites(&self) -> Vec<Site> {
        self.sites
            .iter()
            .map(|(key, site)| {
                let pages = if site.pages.is_empty() {
                    vec![format!("https://{}/", site.domain)]
                } else {
                    site.pages.clone()
                };
                Site {
                    key: key.clone(),
                    domain: site.domain.clone(),
                    credentials: site.credentials.clone(),
                    pages,
                }
            })
            .collect()
    }
}
