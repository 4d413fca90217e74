use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dnsrelay::cache::AnswerCache;
use dnsrelay::cli::Args;
use dnsrelay::config::Config;
use dnsrelay::handler::RequestHandler;
use dnsrelay::route::RouteTrie;
use dnsrelay_resolver::ResolverRegistry;
use dnsrelay_server::UdpServer;
use tokio::sync::Notify;

/// How often the cache sweeps expired/stuck entries, per spec.md §4.3's
/// design-default background eviction interval.
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(600);
/// A leader that has sat Pending longer than this is assumed dead (crashed
/// mid-resolve) and is reclaimed so its followers aren't wedged forever.
const CACHE_MAX_PENDING: Duration = Duration::from_secs(30);

fn init_logs(level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, registry, EnvFilter};

    let _ = registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("{}={level}", env!("CARGO_PKG_NAME").replace('-', "_")).into()
        }))
        .with(fmt::layer().with_ansi(cfg!(debug_assertions)))
        .try_init();
}

/// Resolves a process-wide shutdown `Notify`, fired on SIGINT or (on Unix)
/// SIGTERM, per spec.md §5's cancellation chain.
fn spawn_shutdown_listener() -> Arc<Notify> {
    let shutdown = Arc::new(Notify::new());
    let notify = shutdown.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("unable to install SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        tracing::info!("shutdown signal received");
        notify.notify_waiters();
    });
    shutdown
}

async fn sweep_cache_until_shutdown(cache: Arc<AnswerCache>, shutdown: Arc<Notify>) {
    let mut ticker = tokio::time::interval(CACHE_SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => cache.sweep(CACHE_MAX_PENDING),
            _ = shutdown.notified() => break,
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = Config::resolve(args.conf.as_deref());
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(log_level) = &args.log_level {
        config.log_level = log_level.clone();
    }

    init_logs(&config.log_level);

    let routes = RouteTrie::build(&config.rules());
    let cache = Arc::new(AnswerCache::new());
    let registry = ResolverRegistry::new();
    let handler = RequestHandler::new(routes, cache.clone(), registry);

    let shutdown = spawn_shutdown_listener();
    tokio::spawn(sweep_cache_until_shutdown(cache, shutdown.clone()));

    let server = UdpServer::new(config.address(), handler);
    if let Err(error) = server.run(shutdown).await {
        tracing::error!(?error, "udp server exited with an error");
        std::process::exit(1);
    }
}
