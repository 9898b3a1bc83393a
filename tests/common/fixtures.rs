//! Test catalog lifecycle
//!
//! Each test gets its own on-disk catalog in a temporary directory, wired to
//! a MusicBrainz client pointed at the given base URL.

use pezzottify_listen_catalog::cache::ExpiringCache;
use pezzottify_listen_catalog::catalog::{ListenService, DEFAULT_NOW_PLAYING_TTL};
use pezzottify_listen_catalog::providers::MusicBrainzClient;
use pezzottify_listen_catalog::request_queue::RequestQueueConfig;
use pezzottify_listen_catalog::{CatalogStore, SqliteCatalogStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub struct TestCatalog {
    pub store: Arc<SqliteCatalogStore>,
    pub musicbrainz: Arc<MusicBrainzClient>,
    _temp_dir: TempDir,
}

impl TestCatalog {
    pub fn new(musicbrainz_url: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = SqliteCatalogStore::new(temp_dir.path().join("catalog.db"), 4)
            .expect("Failed to open catalog store");
        // Far more permissive than the real service allows
        let queue = RequestQueueConfig {
            max_concurrent_workers: 4,
            max_requests_per_interval: 100,
            interval: Duration::from_millis(100),
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let musicbrainz = MusicBrainzClient::new(musicbrainz_url, queue)
            .expect("Failed to create MusicBrainz client");
        Self {
            store: Arc::new(store),
            musicbrainz: Arc::new(musicbrainz),
            _temp_dir: temp_dir,
        }
    }

    pub fn store(&self) -> Arc<dyn CatalogStore> {
        self.store.clone()
    }

    pub fn listen_service(&self) -> ListenService {
        ListenService::new(
            self.store(),
            self.musicbrainz.clone(),
            Arc::new(ExpiringCache::new(DEFAULT_NOW_PLAYING_TTL)),
        )
    }
}
