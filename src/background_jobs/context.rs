use crate::catalog_store::CatalogStore;
use crate::providers::MetadataProvider;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Services a job runs against, plus the shutdown token.
#[derive(Clone)]
pub struct JobContext {
    /// Cancelled when the process shuts down.
    pub cancellation_token: CancellationToken,

    pub catalog_store: Arc<dyn CatalogStore>,

    /// Canonical metadata lookups (MusicBrainz).
    pub metadata_provider: Arc<dyn MetadataProvider>,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        catalog_store: Arc<dyn CatalogStore>,
        metadata_provider: Arc<dyn MetadataProvider>,
    ) -> Self {
        Self {
            cancellation_token,
            catalog_store,
            metadata_provider,
        }
    }

    /// Same services, with a token cancelled together with this one.
    pub fn child(&self) -> Self {
        Self {
            cancellation_token: self.cancellation_token.child_token(),
            catalog_store: Arc::clone(&self.catalog_store),
            metadata_provider: Arc::clone(&self.metadata_provider),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
