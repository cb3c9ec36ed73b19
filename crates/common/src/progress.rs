//! Run progress store
//!
//! Persists the output folder of the current run and the keys of the sites
//! that finished, so an interrupted run can pick up where it stopped.
//! Every mutation goes through one lock that is held while the record is
//! written, so concurrent site completions never lose an update.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::Result;

/// The persisted resume record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProgress {
    pub output_folder: PathBuf,
    #[serde(default)]
    pub completed_sites: Vec<String>,
}

/// How the store was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Fresh,
    Resumed,
}

/// Single writer for the progress file
#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    mode: RunMode,
    output_folder: PathBuf,
    state: Mutex<RunProgress>,
}

impl ProgressStore {
    /// Load the record at `path`, or start a new run under `output_root`.
    ///
    /// A new run is started when no record exists or `fresh` is set; its
    /// output folder is a UTC timestamp, suffixed `-dry` for dry runs.
    pub async fn open(path: &Path, output_root: &Path, fresh: bool, dry_run: bool) -> Result<Self> {
        if !fresh && fs::try_exists(path).await? {
            let content = fs::read_to_string(path).await?;
            let progress: RunProgress = serde_json::from_str(&content)?;
            fs::create_dir_all(&progress.output_folder).await?;

            info!(
                "Continuing a previous run in {} ({} site(s) already done)",
                progress.output_folder.display(),
                progress.completed_sites.len()
            );

            return Ok(Self {
                path: path.to_path_buf(),
                mode: RunMode::Resumed,
                output_folder: progress.output_folder.clone(),
                state: Mutex::new(progress),
            });
        }

        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ");
        let suffix = if dry_run { "-dry" } else { "" };
        let output_folder = output_root.join(format!("{}{}", timestamp, suffix));
        fs::create_dir_all(&output_folder).await?;

        let progress = RunProgress {
            output_folder: output_folder.clone(),
            completed_sites: Vec::new(),
        };
        write_atomic(path, &progress).await?;

        info!("Starting a new run in {}", output_folder.display());

        Ok(Self {
            path: path.to_path_buf(),
            mode: RunMode::Fresh,
            output_folder,
            state: Mutex::new(progress),
        })
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Output folder of this run; fixed for the life of the record
    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }

    /// Snapshot of the completed site keys, in completion order
    pub async fn completed(&self) -> Vec<String> {
        self.state.lock().await.completed_sites.clone()
    }

    pub async fn is_completed(&self, key: &str) -> bool {
        self.state
            .lock()
            .await
            .completed_sites
            .iter()
            .any(|k| k == key)
    }

    /// Record a finished site.
    ///
    /// The record is on disk before this returns `Ok`. Returns `false` when
    /// the key was already recorded. On error the in-memory set is unchanged.
    pub async fn mark_completed(&self, key: &str) -> Result<bool> {
        let mut guard = self.state.lock().await;
        if guard.completed_sites.iter().any(|k| k == key) {
            return Ok(false);
        }

        let mut next = guard.clone();
        next.completed_sites.push(key.to_string());
        write_atomic(&self.path, &next).await?;
        *guard = next;

        debug!("Recorded site {} as completed", key);
        Ok(true)
    }

    /// Delete the record if every key in `site_keys` is completed.
    ///
    /// Returns whether the record was deleted.
    pub async fn finish<S: AsRef<str>>(&self, site_keys: &[S]) -> Result<bool> {
        let guard = self.state.lock().await;
        let pending: Vec<&str> = site_keys
            .iter()
            .map(|k| k.as_ref())
            .filter(|k| !guard.completed_sites.iter().any(|c| c == k))
            .collect();

        if !pending.is_empty() {
            warn!(
                "Keeping {} for resume; {} site(s) not completed: {}",
                self.path.display(),
                pending.len(),
                pending.join(", ")
            );
            return Ok(false);
        }

        match fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!("All sites completed; removed {}", self.path.display());
        Ok(true)
    }
}

/// Write the record through a temp file and rename it into place
async fn write_atomic(path: &Path, progress: &RunProgress) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_string_pretty(progress)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, json).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}
