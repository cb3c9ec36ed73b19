//! Pre-flight checks run before a fleet run touches any site

use std::time::Duration;
use tracing::{debug, info};

use sitesweep_common::Site;

use crate::error::{RemoteError, RemoteResult};
use crate::executor::RemoteExecutor;

/// Checks that each site answers over HTTP and accepts its credentials
pub struct SiteValidator<'a> {
    client: reqwest::Client,
    executor: &'a dyn RemoteExecutor,
}

impl<'a> SiteValidator<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, timeout: Duration) -> RemoteResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, executor })
    }

    /// Validate sites in order; the first failure is returned
    pub async fn validate_all(&self, sites: &[Site]) -> RemoteResult<()> {
        for site in sites {
            self.validate(site).await?;
        }
        info!("Validated {} site(s)", sites.len());
        Ok(())
    }

    pub async fn validate(&self, site: &Site) -> RemoteResult<()> {
        self.check_domain(&site.domain).await?;

        let session = self
            .executor
            .connect(&site.credentials)
            .await
            .map_err(|e| {
                RemoteError::Validation(format!("Invalid credentials for {}: {}", site.domain, e))
            })?;
        session.close().await.map_err(|e| {
            RemoteError::Validation(format!("Invalid credentials for {}: {}", site.domain, e))
        })?;

        debug!("Site {} is reachable", site.key);
        Ok(())
    }

    async fn check_domain(&self, domain: &str) -> RemoteResult<()> {
        let url = format!("http://{}", domain);
        let result = match self.client.get(&url).send().await {
            Ok(response) => response.error_for_status().map(|_| ()),
            Err(e) => Err(e),
        };
        result.map_err(|e| RemoteError::Validation(format!("Invalid domain {}: {}", domain, e)))
    }
}
