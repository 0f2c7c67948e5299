//! Application state shared across handlers.

use crate::entitlements::{Authorizer, Entitlements};
use sdms_core::config::AppConfig;
use sdms_journal::Journal;
use sdms_locker::{DistributedCache, Locker};
use sdms_storage::{BlobStore, UrlSigner};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Tenant, subproject and dataset records.
    pub journal: Arc<dyn Journal>,
    /// Buckets and dataset objects.
    pub storage: Arc<dyn BlobStore>,
    /// Shared cache; the host owns its lifecycle.
    pub cache: Arc<dyn DistributedCache>,
    /// Dataset locks, coordinated through `cache`.
    pub locker: Locker,
    /// Signs direct object URLs.
    pub signer: Arc<UrlSigner>,
    pub authorizer: Authorizer,
}

impl AppState {
    /// Create a new application state from connected collaborators.
    pub fn new(
        config: AppConfig,
        journal: Arc<dyn Journal>,
        storage: Arc<dyn BlobStore>,
        cache: Arc<dyn DistributedCache>,
        entitlements: Arc<dyn Entitlements>,
    ) -> Self {
        if !config.auth.enabled {
            tracing::warn!(
                "authorization is disabled; every request runs as '{}'",
                crate::auth::ANONYMOUS_USER
            );
        }
        let locker = Locker::from_config(Arc::clone(&cache), &config.locker);
        let signer = Arc::new(UrlSigner::from_config(config.storage.signing()));
        let authorizer = Authorizer::new(config.auth.enabled, entitlements);
        Self {
            config: Arc::new(config),
            journal,
            storage,
            cache,
            locker,
            signer,
            authorizer,
        }
    }

    /// Skip the advisory write-lock check before mutations.
    pub fn skip_write_lock_check(&self) -> bool {
        self.config.server.skip_write_lock_check_on_mutable_operations
    }
}

#[cfg(test)]
impl AppState {
    /// State over in-memory backends, for unit tests.
    pub(crate) fn for_testing(config: AppConfig) -> Self {
        let entitlements = Arc::new(crate::entitlements::ConfigEntitlements::from_config(
            &config.auth,
        ));
        Self::new(
            config,
            Arc::new(sdms_journal::MemoryJournal::new()),
            Arc::new(sdms_storage::MemoryBackend::new()),
            Arc::new(sdms_locker::MemoryCache::new()),
            entitlements,
        )
    }
}
