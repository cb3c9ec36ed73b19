//! Core, plugin and theme updates

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use sitesweep_common::Credentials;

use crate::error::RemoteResult;
use crate::executor::{shell_quote, RemoteExecutor, RemoteSession};

/// Local file the combined update output is written to
pub const UPDATES_FILE: &str = "updates.txt";

/// Update commands, in the order they run
pub const UPDATE_COMMANDS: [&str; 3] = [
    "wp core update",
    "wp plugin update --all",
    "wp theme update --all",
];

/// Run every update command against the site and write their combined
/// output to `site_folder/updates.txt`.
///
/// Only a failed connection is an error. A command that fails or writes to
/// stderr is logged and the remaining commands still run.
pub async fn update(
    executor: &dyn RemoteExecutor,
    credentials: &Credentials,
    site_folder: &Path,
) -> RemoteResult<PathBuf> {
    tokio::fs::create_dir_all(site_folder).await?;

    let mut session = executor.connect(credentials).await?;
    let output = update_with(session.as_mut(), credentials).await;

    if let Err(e) = session.close().await {
        warn!("Failed to close session to {}: {}", credentials.host, e);
    }

    let path = site_folder.join(UPDATES_FILE);
    tokio::fs::write(&path, output).await?;
    Ok(path)
}

async fn update_with(session: &mut dyn RemoteSession, credentials: &Credentials) -> String {
    let site_root = credentials.path.as_str();
    let mut output = String::new();

    for base in UPDATE_COMMANDS {
        let command = format!(
            "{} --skip-plugins --skip-themes --path={}",
            base,
            shell_quote(site_root)
        );
        info!("Running \"{}\" on {}", base, credentials.host);

        match session.run(&command, Some(site_root)).await {
            Ok(result) => {
                output.push_str(&result.stdout);
                output.push('\n');
                if !result.stderr.trim().is_empty() || !result.success() {
                    warn!(
                        "\"{}\" on {} exited with {:?}: {}",
                        base,
                        credentials.host,
                        result.exit_code,
                        result.stderr.trim()
                    );
                    output.push_str(&result.stderr);
                    output.push('\n');
                }
            }
            Err(e) => {
                warn!("\"{}\" on {} failed: {}", base, credentials.host, e);
                output.push_str(&format!("{}: {}\n", base, e));
            }
        }
    }

    output
}
