//! Site backup: database export plus a zip of the site tree, downloaded
//! into the site's run folder.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use sitesweep_common::Credentials;

use crate::error::RemoteResult;
use crate::executor::{run_checked, shell_quote, RemoteExecutor, RemoteSession};

/// Local file name of the downloaded archive
pub const BACKUP_FILE: &str = "backup.zip";

/// Back up the site behind `credentials` into `site_folder/backup.zip`.
///
/// Steps run in order and the first failure stops the backup. The remote
/// staging folder is removed afterwards unless `keep_remote` is set.
pub async fn backup(
    executor: &dyn RemoteExecutor,
    credentials: &Credentials,
    site_folder: &Path,
    keep_remote: bool,
) -> RemoteResult<PathBuf> {
    tokio::fs::create_dir_all(site_folder).await?;

    let mut session = executor.connect(credentials).await?;
    let outcome = backup_with(session.as_mut(), credentials, site_folder, keep_remote).await;

    if let Err(e) = session.close().await {
        warn!("Failed to close session to {}: {}", credentials.host, e);
    }

    outcome
}

async fn backup_with(
    session: &mut dyn RemoteSession,
    credentials: &Credentials,
    site_folder: &Path,
    keep_remote: bool,
) -> RemoteResult<PathBuf> {
    let site_root = credentials.path.trim_end_matches('/');
    let staging = format!("{}/backup", site_root);
    let dump = format!("{}/database.sql", staging);
    let archive = format!("{}/{}", staging, BACKUP_FILE);

    run_checked(session, &format!("mkdir -p {}", shell_quote(&staging)), None).await?;
    run_checked(
        session,
        &format!(
            "wp db export {} --path={}",
            shell_quote(&dump),
            shell_quote(site_root)
        ),
        None,
    )
    .await?;
    run_checked(
        session,
        &format!("zip -r {} {}", shell_quote(&archive), shell_quote(site_root)),
        None,
    )
    .await?;

    let local = site_folder.join(BACKUP_FILE);
    session.transfer_file(&archive, &local).await?;
    info!("Downloaded backup of {} to {}", credentials.host, local.display());

    if !keep_remote {
        run_checked(session, &format!("rm -r {}", shell_quote(&staging)), None).await?;
        info!("Removed backup folder from {}", credentials.host);
    }

    Ok(local)
}
