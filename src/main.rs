//! kockalogger - Fandom WikiaRC feed logger.
//!
//! Consumes the recent-changes, Discussions and new-user IRC feeds,
//! decodes each line into a typed event, enriches it from the MediaWiki
//! API, and fans it out to subscriber modules.

mod api;
mod cache;
mod config;
mod dispatcher;
mod error;
mod fetcher;
mod loader;
mod messages;
mod metrics;
mod model;
mod modules;
mod parser;
mod transport;
mod util;

use crate::api::ApiClient;
use crate::cache::EnrichmentCache;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::fetcher::RetryFetcher;
use crate::loader::Loader;
use crate::model::Channel;
use crate::modules::ModuleContext;
use crate::parser::decoder::{JsonAssembler, RcAssembler};
use crate::parser::Parser;
use crate::transport::TransportEvent;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Soft deadline for draining in-flight enrichment on shutdown.
const DRAIN_DEADLINE: Duration = Duration::from_secs(60);

struct CliArgs {
    config_path: String,
    fetch: bool,
}

/// Resolve CLI arguments: `-c <path>` / `--config <path>` or a bare path,
/// plus `--fetch` to force a message-cache rebuild. Falls back to
/// `config.toml`.
fn resolve_args() -> CliArgs {
    let mut config_path = None;
    let mut fetch = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--fetch" => fetch = true,
            "-c" | "--config" => {
                config_path = Some(args.next().unwrap_or_else(|| {
                    eprintln!("Missing path after {}", arg);
                    std::process::exit(1);
                }));
            }
            path => config_path = Some(path.to_string()),
        }
    }

    let raw_path = config_path.unwrap_or_else(|| "config.toml".to_string());
    // Canonicalize to avoid relying on the working directory later.
    let config_path = match std::fs::canonicalize(Path::new(&raw_path)) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => raw_path,
    };
    CliArgs { config_path, fetch }
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level));

    if config.log.file {
        let dir = config.log.dir.as_deref().unwrap_or(".");
        std::fs::create_dir_all(dir)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(Path::new(dir).join("kockalogger.log"))?;
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first (before tracing, so we can use log settings)
    let args = resolve_args();
    let config = Config::load(&args.config_path).map_err(|e| {
        eprintln!(
            "ERROR: Failed to load config from {}: {}",
            args.config_path, e
        );
        e
    })?;

    init_tracing(&config)?;

    if let Err(errors) = config::validate(&config) {
        for err in &errors {
            error!(error = %err, "Configuration validation failed");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    info!(
        server = %config.client.server,
        nick = %config.client.nick,
        "Starting kockalogger"
    );

    // Prometheus metrics are optional; port 0 disables the endpoint.
    if config.metrics.port != 0 {
        metrics::init();
        tokio::spawn(metrics::serve_endpoint(config.metrics.port));
        info!(port = config.metrics.port, "Metrics endpoint started");
    } else {
        info!("Metrics disabled");
    }

    // Redis is required at startup; afterwards the driver reconnects and
    // failures degrade to logged errors.
    let redis_url = std::env::var("KOCKALOGGER_REDIS_URL")
        .unwrap_or_else(|_| cache::DEFAULT_REDIS_URL.to_string());
    let enrichment = EnrichmentCache::connect(&redis_url).await.map_err(|e| {
        error!(code = "no-redis", url = %redis_url, error = %e, "Cannot reach Redis");
        anyhow::anyhow!("no-redis: {e}")
    })?;
    info!(url = %redis_url, "Redis connected");

    // Message cache: load from disk, or rebuild across all languages.
    let api = ApiClient::new();
    let loader = Arc::new(Loader::new(
        api.clone(),
        PathBuf::from(&config.cache.dir),
        config.log.debug,
    ));
    loader.run(args.fetch).await?;
    let message_cache = loader.cache();
    info!("Message cache ready");

    // Modules.
    let ctx = ModuleContext {
        messages: message_cache.clone(),
        cache: enrichment.clone(),
    };
    let module_list = modules::build(&config.modules, &ctx);
    for module in &module_list {
        if let Err(e) = module.setup(&ctx).await {
            warn!(module = module.name(), error = %e, "Module setup failed");
        }
    }
    info!(count = module_list.len(), "Modules ready");

    let fetcher = Arc::new(RetryFetcher::new(api.clone(), Arc::clone(&loader)));
    let dispatcher = Dispatcher::new(
        module_list,
        enrichment,
        api,
        fetcher,
        config.cache.title_ttl,
    );
    let parser = Parser::new(message_cache);

    // Graceful shutdown: the first signal wins; repeats only warn.
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint =
                signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
            let mut signalled = false;
            loop {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
                if signalled {
                    warn!("Shutdown already in progress");
                } else {
                    info!("Shutdown signal received");
                    let _ = shutdown_tx.send(());
                    signalled = true;
                }
            }
        });
    }

    // Feed client.
    let (tx, mut rx) = mpsc::channel::<TransportEvent>(1024);
    let transport_handle = transport::spawn(config.client.clone(), tx, shutdown_tx.subscribe());

    // The pipeline proper: reassemble, parse, dispatch. Serial per design;
    // only enrichment fans out onto background tasks.
    let mut rc_assembler = RcAssembler::default();
    let mut json_assembler = JsonAssembler::default();
    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = rx.recv() => {
                let Some(event) = event else {
                    warn!("Feed closed, shutting down");
                    break;
                };
                match event {
                    TransportEvent::Line { channel, line } => match channel {
                        Channel::Rc => {
                            if let Some(payload) = rc_assembler.push(&line) {
                                dispatcher.dispatch(parser.parse_rc_payload(&payload)).await;
                            }
                        }
                        Channel::Discussions => {
                            if let Some(json) = json_assembler.push(&line) {
                                dispatcher
                                    .dispatch(parser.parse(&json, Channel::Discussions))
                                    .await;
                            }
                        }
                        Channel::NewUsers => {
                            dispatcher
                                .dispatch(parser.parse(&line, Channel::NewUsers))
                                .await;
                        }
                    },
                    TransportEvent::Registered => debug!("Feed registered"),
                    TransportEvent::Join { channel } => {
                        debug!(channel = channel.as_str(), "Feed channel joined");
                    }
                    TransportEvent::Error { message } => {
                        warn!(message = %message, "Feed transport error");
                    }
                }
            }
        }
    }

    info!("Draining in-flight enrichment");
    dispatcher.tracker().close();
    if tokio::time::timeout(DRAIN_DEADLINE, dispatcher.tracker().wait())
        .await
        .is_err()
    {
        warn!(
            deadline_secs = DRAIN_DEADLINE.as_secs(),
            "Drain deadline reached, forcing shutdown"
        );
    }
    dispatcher.kill_modules().await;
    let _ = transport_handle.await;

    info!("kockalogger stopped");
    Ok(())
}
