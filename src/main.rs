use anyhow::{Context, Result};
use clap::Parser;
use listenlog::catalog_store::{CatalogStore, SqliteCatalogStore};
use listenlog::clock::{Clock, SystemClock};
use listenlog::config::{AppConfig, CliConfig, FileConfig};
use listenlog::enrichment::{EnrichmentOrchestrator, Providers};
use listenlog::listening::SharedDedupWindow;
use listenlog::metrics;
use listenlog::poller::{ActiveHours, Poller, PollerSettings, PollingService};
use listenlog::providers::{DiscogsClient, LastFmClient, OpenAiTextGenerator};
use listenlog::resilience::ResilientCaller;
use listenlog::server::{run_server, ServerState};
use listenlog::sources::{BridgeSource, ScrobbleSource, Source};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

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

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML configuration file. Its values override the flags below.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the catalog database.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// The port for the status and metrics server.
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// Base URL of the playback bridge, enables the bridge source.
    #[clap(long)]
    pub bridge_url: Option<String>,

    /// Last.fm user to follow, enables the scrobble source.
    #[clap(long)]
    pub scrobble_user: Option<String>,
}

fn build_providers(config: &AppConfig) -> Result<Providers> {
    let mut providers = Providers::default();

    if let Some(discogs) = &config.discogs {
        let client = Arc::new(DiscogsClient::new(&discogs.token, config.request_timeout)?);
        info!("Discogs enrichment enabled");
        providers.artist_image = Some(client.clone());
        providers.album_details = Some(client);
    }
    if let Some(lastfm) = &config.lastfm {
        info!("Last.fm cover art enabled");
        providers.album_image = Some(Arc::new(LastFmClient::new(
            &lastfm.api_key,
            config.request_timeout,
        )?));
    }
    if let Some(llm) = &config.llm {
        info!("Album descriptions enabled with model {}", llm.model);
        providers.text = Some(Arc::new(OpenAiTextGenerator::new(
            llm.base_url.clone(),
            llm.model.clone(),
            llm.api_key.clone(),
            config.request_timeout,
        )?));
    }
    Ok(providers)
}

fn build_pollers(
    config: &AppConfig,
    orchestrator: &Arc<EnrichmentOrchestrator>,
    clock: &Arc<dyn Clock>,
) -> Result<Vec<Poller>> {
    // Shared so the same playback seen by both sources is recorded once
    let dedup = SharedDedupWindow::new(config.dedup.window);
    let mut pollers = Vec::new();

    let mut add = |source: Arc<dyn Source>,
                   interval: Duration,
                   active_hours: Option<ActiveHours>| {
        info!(
            "Configured source {} every {:?}{}",
            source.id(),
            interval,
            active_hours
                .map(|h| format!(" during {}", h))
                .unwrap_or_default()
        );
        pollers.push(Poller::new(
            source,
            orchestrator.clone(),
            dedup.clone(),
            clock.clone(),
            PollerSettings {
                interval,
                active_hours,
                dedup_window: config.dedup.window,
                lookup_policy: config.dedup.lookup_policy,
            },
        ));
    };

    if let Some(bridge) = &config.bridge {
        let source = BridgeSource::new(
            &bridge.base_url,
            bridge.zone.clone(),
            config.request_timeout,
            bridge.reconnect_wait,
        )?;
        add(Arc::new(source), bridge.interval, bridge.active_hours);
    }
    if let Some(scrobble) = &config.scrobble {
        let client = LastFmClient::new(&scrobble.api_key, config.request_timeout)?;
        let source = ScrobbleSource::new(client, &scrobble.username);
        add(Arc::new(source), scrobble.interval, scrobble.active_hours);
    }
    Ok(pollers)
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
        .context("Failed to install the tracing subscriber")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir.clone(),
        metrics_port: cli_args.metrics_port,
        bridge_url: cli_args.bridge_url.clone(),
        scrobble_user: cli_args.scrobble_user.clone(),
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    let db_path = config.catalog_db_path();
    info!("Opening SQLite catalog database at {:?}...", db_path);
    let catalog_store = Arc::new(SqliteCatalogStore::new(&db_path)?);

    info!("Initializing metrics...");
    metrics::init_metrics();
    metrics::set_catalog_counts(&catalog_store.counts()?);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let orchestrator = Arc::new(EnrichmentOrchestrator::new(
        catalog_store,
        build_providers(&config)?,
        ResilientCaller::new(
            config.retry.clone(),
            config.circuit_breaker.clone(),
            clock.clone(),
        ),
        config.matcher,
        clock.clone(),
        config.enrichment.clone(),
    ));

    let pollers = build_pollers(&config, &orchestrator, &clock)?;
    let service = Arc::new(PollingService::new(
        pollers,
        orchestrator.clone(),
        clock.clone(),
    ));
    service.start().await;

    let shutdown_token = CancellationToken::new();
    let mut server = tokio::spawn(run_server(
        config.metrics_port,
        ServerState::new(service.clone(), orchestrator),
        shutdown_token.clone(),
    ));

    let exited_early = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for ctrl-c")?;
            info!("Shutdown requested");
            None
        }
        result = &mut server => Some(result),
    };
    shutdown_token.cancel();
    let server_result = match exited_early {
        Some(result) => result,
        None => server.await,
    };

    service.stop().await;
    match server_result {
        Ok(Err(e)) => error!("Status server failed: {:#}", e),
        Err(e) => error!("Status server task panicked: {}", e),
        Ok(Ok(())) => {}
    }
    info!("Bye");
    Ok(())
}
