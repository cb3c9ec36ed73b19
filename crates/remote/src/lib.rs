//! sitesweep remote operations
//!
//! Backup, update and cache clearing against a site's host, plus the
//! pre-flight validation of every configured site.

pub mod backup;
pub mod cache;
pub mod error;
pub mod executor;
pub mod ssh;
pub mod update;
pub mod validate;

#[cfg(test)]
mod testing;

pub use backup::backup;
pub use cache::{clear_cache, CachePlugin, CachePurger, HttpCachePurger, CACHE_PLUGINS};
pub use error::{RemoteError, RemoteResult};
pub use executor::{CommandOutput, RemoteExecutor, RemoteSession};
pub use ssh::OpenSshExecutor;
pub use update::update;
pub use validate::SiteValidator;
