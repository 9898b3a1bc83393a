use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pezzottify_listen_catalog::analytics::Analytics;
use pezzottify_listen_catalog::background_jobs::jobs::DurationBackfillJob;
use pezzottify_listen_catalog::background_jobs::{BackgroundJob, JobContext, JobRunner};
use pezzottify_listen_catalog::cache::ExpiringCache;
use pezzottify_listen_catalog::catalog::{ListenService, ListenSubmission};
use pezzottify_listen_catalog::config::{AppConfig, CliConfig, FileConfig};
use pezzottify_listen_catalog::providers::{
    DisabledProvider, ImageProvider, LastFmClient, MetadataProvider, MusicBrainzClient,
};
use pezzottify_listen_catalog::timeframe::{resolve_timezone, Period, Timeframe, TimezoneSources};
use pezzottify_listen_catalog::{CatalogStore, SqliteCatalogStore};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

fn parse_period(s: &str) -> Result<Period> {
    Period::parse(s).with_context(|| format!("Unknown period: {}", s))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Its values override the CLI flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the catalog database.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Timezone for calendar boundaries when a command names none.
    #[clap(long)]
    pub default_timezone: Option<String>,

    /// Timezone applied to every command, overriding --timezone.
    #[clap(long)]
    pub forced_timezone: Option<String>,

    /// Base URL of the MusicBrainz web service.
    #[clap(long)]
    pub musicbrainz_url: Option<String>,

    /// User agent sent to MusicBrainz, which asks for a contact address.
    #[clap(long)]
    pub musicbrainz_user_agent: Option<String>,

    /// Do not query MusicBrainz at all.
    #[clap(long)]
    pub no_musicbrainz: bool,

    /// Last.fm API key, enables artist and album images.
    #[clap(long)]
    pub lastfm_api_key: Option<String>,

    /// Hours between duration backfill runs. 0 runs it once.
    #[clap(long, default_value_t = 24)]
    pub backfill_interval_hours: u64,

    /// Tracks fetched per backfill page.
    #[clap(long, default_value_t = 100)]
    pub backfill_page_size: usize,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the background jobs until interrupted.
    Run,
    /// Fill in missing track durations once and print the report.
    Backfill,
    /// Record one listen, resolving its credits against the catalog.
    Submit {
        #[clap(long = "artist", required = true)]
        artists: Vec<String>,
        #[clap(long)]
        album: Option<String>,
        #[clap(long)]
        track: String,
        /// MusicBrainz recording id.
        #[clap(long)]
        recording_mbid: Option<uuid::Uuid>,
        /// MusicBrainz release id.
        #[clap(long)]
        release_mbid: Option<uuid::Uuid>,
        /// Track duration in seconds.
        #[clap(long)]
        duration: Option<i64>,
        /// Unix time of the listen, defaults to now.
        #[clap(long)]
        at: Option<i64>,
    },
    /// Print a listening summary as JSON.
    Summary {
        #[clap(long)]
        year: Option<i32>,
        #[clap(long)]
        month: Option<u32>,
        #[clap(long)]
        week: Option<u32>,
        #[clap(long, value_parser = parse_period)]
        period: Option<Period>,
        #[clap(long)]
        timezone: Option<String>,
        #[clap(long, default_value = "Summary")]
        title: String,
    },
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            default_timezone: self.default_timezone.clone(),
            forced_timezone: self.forced_timezone.clone(),
            musicbrainz_url: self.musicbrainz_url.clone(),
            musicbrainz_user_agent: self.musicbrainz_user_agent.clone(),
            disable_musicbrainz: self.no_musicbrainz,
            lastfm_api_key: self.lastfm_api_key.clone(),
            backfill_interval_hours: self.backfill_interval_hours,
            backfill_page_size: self.backfill_page_size,
        }
    }
}

/// Long-lived services, stopped together on exit.
struct Services {
    store: Arc<dyn CatalogStore>,
    musicbrainz: Option<Arc<MusicBrainzClient>>,
    lastfm: Option<Arc<LastFmClient>>,
}

impl Services {
    fn start(config: &AppConfig) -> Result<Self> {
        info!("Opening SQLite catalog database at {:?}...", config.db_path());
        let store = Arc::new(SqliteCatalogStore::new(
            config.db_path(),
            config.read_pool_size,
        )?);

        let musicbrainz = if config.musicbrainz.enabled {
            info!("Using MusicBrainz at {}", config.musicbrainz.url);
            Some(Arc::new(MusicBrainzClient::new(
                &config.musicbrainz.url,
                config.musicbrainz.queue.clone(),
            )?))
        } else {
            warn!("MusicBrainz disabled, listens are matched on local data only");
            None
        };

        let lastfm = match &config.lastfm {
            Some(settings) => Some(Arc::new(LastFmClient::new(
                &settings.api_key,
                &settings.url,
                settings.queue.clone(),
            )?)),
            None => None,
        };

        Ok(Self {
            store,
            musicbrainz,
            lastfm,
        })
    }

    fn metadata_provider(&self) -> Arc<dyn MetadataProvider> {
        match &self.musicbrainz {
            Some(client) => Arc::clone(client) as Arc<dyn MetadataProvider>,
            None => Arc::new(DisabledProvider),
        }
    }

    async fn stop(&self) {
        if let Some(client) = &self.musicbrainz {
            client.stop().await;
        }
        if let Some(client) = &self.lastfm {
            client.stop().await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;
    let services = Services::start(&config)?;

    let result = run_command(&cli_args.command, &config, &services).await;
    services.stop().await;
    result
}

async fn run_command(command: &Command, config: &AppConfig, services: &Services) -> Result<()> {
    match command {
        Command::Run => {
            let shutdown = CancellationToken::new();
            let ctx = JobContext::new(
                shutdown.clone(),
                services.store.clone(),
                services.metadata_provider(),
            );
            let mut runner = JobRunner::new(ctx);
            runner.register_job(Arc::new(DurationBackfillJob::new(
                config.background_jobs.backfill_interval,
                config.background_jobs.backfill_page_size,
            )));

            let mut runner_task = tokio::spawn(runner.run());
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for shutdown signal")?;
                    info!("Shutdown requested, waiting for running jobs...");
                    shutdown.cancel();
                    runner_task.await.context("Job runner task failed")?;
                }
                finished = &mut runner_task => {
                    finished.context("Job runner task failed")?;
                }
            }
        }
        Command::Backfill => {
            let job = DurationBackfillJob::new(
                std::time::Duration::ZERO,
                config.background_jobs.backfill_page_size,
            );
            let ctx = JobContext::new(
                CancellationToken::new(),
                services.store.clone(),
                services.metadata_provider(),
            );
            job.execute(&ctx).await?;
            println!("{}", serde_json::to_string_pretty(&job.last_report())?);
        }
        Command::Submit {
            artists,
            album,
            track,
            recording_mbid,
            release_mbid,
            duration,
            at,
        } => {
            let listened_at = match at {
                Some(secs) => Some(
                    chrono::DateTime::from_timestamp(*secs, 0)
                        .with_context(|| format!("Timestamp {} out of range", secs))?,
                ),
                None => None,
            };
            let mut listens = ListenService::new(
                services.store.clone(),
                services.metadata_provider(),
                Arc::new(ExpiringCache::new(config.now_playing_ttl)),
            );
            if let Some(lastfm) = &services.lastfm {
                let images: Arc<dyn ImageProvider> = lastfm.clone();
                listens = listens.with_image_provider(images);
            }
            let submitted = listens
                .submit(&ListenSubmission {
                    artist_names: artists.clone(),
                    album_title: album.clone().unwrap_or_default(),
                    album_musicbrainz_id: *release_mbid,
                    track_title: track.clone(),
                    track_musicbrainz_id: *recording_mbid,
                    duration: *duration,
                    listened_at,
                    client: Some("listen-catalog".to_string()),
                    ..Default::default()
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&submitted.track)?);
        }
        Command::Summary {
            year,
            month,
            week,
            period,
            timezone,
            title,
        } => {
            let tz = resolve_timezone(
                &TimezoneSources {
                    forced: config.forced_timezone.map(|tz| tz.name()),
                    requested: timezone.as_deref(),
                    stored: None,
                },
                config.default_timezone,
            );
            let timeframe = Timeframe {
                year: *year,
                month: *month,
                week: *week,
                period: *period,
                ..Default::default()
            };
            let analytics = Analytics::new(services.store.clone()).with_timezone(tz);
            let summary = analytics.summary(&timeframe, title)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}
