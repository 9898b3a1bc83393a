use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub read_pool_size: Option<usize>,
    /// Timezone used when a request names none.
    pub default_timezone: Option<String>,
    /// Timezone applied to every request, whatever it asks for.
    pub forced_timezone: Option<String>,
    pub now_playing_ttl_sec: Option<u64>,

    // Feature configs
    pub musicbrainz: Option<MusicBrainzConfig>,
    pub lastfm: Option<LastFmConfig>,
    pub background_jobs: Option<BackgroundJobsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct MusicBrainzConfig {
    pub enabled: Option<bool>,
    pub url: Option<String>,
    pub user_agent: Option<String>,
    pub max_concurrent_workers: Option<usize>,
    pub max_requests_per_second: Option<u32>,
    pub request_timeout_sec: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct LastFmConfig {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub max_concurrent_workers: Option<usize>,
    pub max_requests_per_second: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BackgroundJobsConfig {
    /// 0 runs the backfill once at startup.
    pub backfill_interval_hours: Option<u64>,
    pub backfill_page_size: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
