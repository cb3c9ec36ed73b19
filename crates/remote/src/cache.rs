//! Cache clearing: the host's HTTP purge endpoint, then every known cache
//! plugin that is active on the site.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use sitesweep_common::Credentials;

use crate::error::RemoteResult;
use crate::executor::{shell_quote, RemoteExecutor, RemoteSession};

/// Best-effort HTTP cache purge for a domain
#[async_trait]
pub trait CachePurger: Send + Sync {
    async fn purge(&self, domain: &str) -> RemoteResult<()>;
}

/// Purges through `https://<domain>/kinsta-clear-cache-all`
#[derive(Debug, Clone)]
pub struct HttpCachePurger {
    client: reqwest::Client,
}

impl HttpCachePurger {
    /// The endpoint is commonly served with a certificate that does not
    /// match the domain, so certificate checks are off for this client.
    pub fn new(timeout: Duration) -> RemoteResult<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn purge_url(domain: &str) -> String {
        format!("https://{}/kinsta-clear-cache-all", domain)
    }
}

#[async_trait]
impl CachePurger for HttpCachePurger {
    async fn purge(&self, domain: &str) -> RemoteResult<()> {
        let url = Self::purge_url(domain);
        debug!("GET {}", url);
        self.client.get(&url).send().await?.error_for_status()?;
        Ok(())
    }
}

/// A cache plugin and the WP-CLI command that flushes it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePlugin {
    pub name: &'static str,
    pub flush_command: &'static str,
}

pub const CACHE_PLUGINS: [CachePlugin; 5] = [
    CachePlugin {
        name: "wp-super-cache",
        flush_command: "wp super-cache flush",
    },
    CachePlugin {
        name: "w3-total-cache",
        flush_command: "wp w3-total-cache flush all",
    },
    CachePlugin {
        name: "wp-fastest-cache",
        flush_command: "wp wp-fastest-cache empty-all",
    },
    CachePlugin {
        name: "wp-rocket",
        flush_command: "wp rocket clean --confirm",
    },
    CachePlugin {
        name: "litespeed-cache",
        flush_command: "wp litespeed cache_purge all",
    },
];

/// Clear every cache layer of a site.
///
/// The HTTP purge never fails this call. Plugins that are inactive, or
/// whose status cannot be read, are skipped. Returns the names of the
/// plugins that were flushed. Errors only when no session can be opened.
pub async fn clear_cache(
    purger: &dyn CachePurger,
    executor: &dyn RemoteExecutor,
    credentials: &Credentials,
    domain: &str,
) -> RemoteResult<Vec<&'static str>> {
    if let Err(e) = purger.purge(domain).await {
        warn!("Failed to purge HTTP cache for {}: {}", domain, e);
    }

    let mut session = executor.connect(credentials).await?;
    let flushed = flush_plugins(session.as_mut(), credentials, domain).await;

    if let Err(e) = session.close().await {
        warn!("Failed to close session to {}: {}", credentials.host, e);
    }

    Ok(flushed)
}

async fn flush_plugins(
    session: &mut dyn RemoteSession,
    credentials: &Credentials,
    domain: &str,
) -> Vec<&'static str> {
    let site_root = credentials.path.as_str();
    let path_arg = format!("--path={}", shell_quote(site_root));
    let mut flushed = Vec::new();

    for plugin in CACHE_PLUGINS {
        let check = format!("wp plugin is-active {} {}", plugin.name, path_arg);
        match session.run(&check, Some(site_root)).await {
            Ok(output) if output.success() => {}
            Ok(_) => continue,
            Err(e) => {
                warn!("Cannot check {} on {}: {}", plugin.name, domain, e);
                continue;
            }
        }

        let flush = format!("{} {}", plugin.flush_command, path_arg);
        match session.run(&flush, Some(site_root)).await {
            Ok(output) if output.success() => {
                info!("Flushed {} on {}", plugin.name, domain);
                flushed.push(plugin.name);
            }
            Ok(output) => warn!(
                "Flushing {} on {} exited with {:?}: {}",
                plugin.name,
                domain,
                output.exit_code,
                output.stderr.trim()
            ),
            Err(e) => warn!("Flushing {} on {} failed: {}", plugin.name, domain, e),
        }
    }

    flushed
}
