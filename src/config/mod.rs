mod file_config;

pub use file_config::{BackgroundJobsConfig, FileConfig, LastFmConfig, MusicBrainzConfig};

use crate::catalog::{DEFAULT_BACKFILL_PAGE_SIZE, DEFAULT_NOW_PLAYING_TTL};
use crate::providers::{LastFmClient, MusicBrainzClient, DEFAULT_LASTFM_URL, DEFAULT_MUSICBRAINZ_URL};
use crate::request_queue::RequestQueueConfig;
use crate::timeframe::parse_timezone;
use anyhow::{bail, Result};
use chrono_tz::Tz;
use std::path::PathBuf;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "listen_catalog.db";
pub const DEFAULT_READ_POOL_SIZE: usize = 4;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub default_timezone: Option<String>,
    pub forced_timezone: Option<String>,
    pub musicbrainz_url: Option<String>,
    pub musicbrainz_user_agent: Option<String>,
    pub disable_musicbrainz: bool,
    pub lastfm_api_key: Option<String>,
    pub backfill_interval_hours: u64,
    pub backfill_page_size: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub read_pool_size: usize,
    pub default_timezone: Tz,
    pub forced_timezone: Option<Tz>,
    pub now_playing_ttl: Duration,

    // Feature configs (with defaults)
    pub musicbrainz: MusicBrainzSettings,
    /// Present only when an API key is configured.
    pub lastfm: Option<LastFmSettings>,
    pub background_jobs: BackgroundJobsSettings,
}

#[derive(Debug, Clone)]
pub struct MusicBrainzSettings {
    pub enabled: bool,
    pub url: String,
    pub queue: RequestQueueConfig,
}

#[derive(Debug, Clone)]
pub struct LastFmSettings {
    pub api_key: String,
    pub url: String,
    pub queue: RequestQueueConfig,
}

#[derive(Debug, Clone)]
pub struct BackgroundJobsSettings {
    /// Zero runs the backfill once at startup only.
    pub backfill_interval: Duration,
    pub backfill_page_size: usize,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let read_pool_size = file
            .read_pool_size
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_READ_POOL_SIZE);

        let default_timezone = match file
            .default_timezone
            .or_else(|| cli.default_timezone.clone())
        {
            Some(name) => resolve_tz(&name)?,
            None => Tz::UTC,
        };
        let forced_timezone = file
            .forced_timezone
            .or_else(|| cli.forced_timezone.clone())
            .map(|name| resolve_tz(&name))
            .transpose()?;

        let now_playing_ttl = file
            .now_playing_ttl_sec
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_NOW_PLAYING_TTL);

        // MusicBrainz settings - merge file config with defaults
        let mb_file = file.musicbrainz.unwrap_or_default();
        let user_agent = mb_file
            .user_agent
            .or_else(|| cli.musicbrainz_user_agent.clone())
            .unwrap_or_else(|| RequestQueueConfig::default().user_agent);
        let mut mb_queue = MusicBrainzClient::default_queue_config(&user_agent);
        if let Some(workers) = mb_file.max_concurrent_workers {
            mb_queue.max_concurrent_workers = workers;
        }
        if let Some(rps) = mb_file.max_requests_per_second {
            mb_queue.max_requests_per_interval = rps;
        }
        if let Some(timeout) = mb_file.request_timeout_sec {
            mb_queue.request_timeout = Duration::from_secs(timeout);
        }
        validate_queue("musicbrainz", &mb_queue)?;
        let musicbrainz = MusicBrainzSettings {
            enabled: mb_file.enabled.unwrap_or(!cli.disable_musicbrainz),
            url: mb_file
                .url
                .or_else(|| cli.musicbrainz_url.clone())
                .unwrap_or_else(|| DEFAULT_MUSICBRAINZ_URL.to_string()),
            queue: mb_queue,
        };

        let lf_file = file.lastfm.unwrap_or_default();
        let lastfm = match lf_file.api_key.or_else(|| cli.lastfm_api_key.clone()) {
            Some(api_key) if !api_key.trim().is_empty() => {
                let mut queue = LastFmClient::default_queue_config(&user_agent);
                if let Some(workers) = lf_file.max_concurrent_workers {
                    queue.max_concurrent_workers = workers;
                }
                if let Some(rps) = lf_file.max_requests_per_second {
                    queue.max_requests_per_interval = rps;
                }
                validate_queue("lastfm", &queue)?;
                Some(LastFmSettings {
                    api_key,
                    url: lf_file.url.unwrap_or_else(|| DEFAULT_LASTFM_URL.to_string()),
                    queue,
                })
            }
            _ => None,
        };

        let jobs_file = file.background_jobs.unwrap_or_default();
        let backfill_interval_hours = jobs_file
            .backfill_interval_hours
            .unwrap_or(cli.backfill_interval_hours);
        let backfill_page_size = jobs_file
            .backfill_page_size
            .unwrap_or(cli.backfill_page_size);
        let background_jobs = BackgroundJobsSettings {
            backfill_interval: Duration::from_secs(backfill_interval_hours * 60 * 60),
            backfill_page_size: if backfill_page_size == 0 {
                DEFAULT_BACKFILL_PAGE_SIZE
            } else {
                backfill_page_size
            },
        };

        Ok(Self {
            db_dir,
            read_pool_size,
            default_timezone,
            forced_timezone,
            now_playing_ttl,
            musicbrainz,
            lastfm,
            background_jobs,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_dir.join(DB_FILE_NAME)
    }
}

fn resolve_tz(name: &str) -> Result<Tz> {
    parse_timezone(name).ok_or_else(|| anyhow::anyhow!("Unknown timezone: {}", name))
}

fn validate_queue(name: &str, queue: &RequestQueueConfig) -> Result<()> {
    if queue.max_concurrent_workers == 0 {
        bail!("{}: max_concurrent_workers must be at least 1", name);
    }
    if queue.max_requests_per_interval == 0 {
        bail!("{}: max_requests_per_second must be at least 1", name);
    }
    Ok(())
}
