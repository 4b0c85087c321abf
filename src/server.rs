use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::cache::MemoryCache;
use crate::channels;
use crate::config::Config;
use crate::filters::factory::{GuardDeps, create_filter_chain};
use crate::http::{self, AppState};
use crate::limits::{DynRateLimiter, MemoryRateLimiter};
use crate::loader::SchemaLoader;
use crate::pipeline::Pipeline;
use crate::prelude::*;
use crate::store::{self, DynFormStore};
use crate::uploads::UploadStore;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

fn listen_addr(raw: &str) -> String {
    if raw.parse::<SocketAddr>().is_ok() {
        raw.to_string()
    } else if let Some(port) = raw.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        format!("0.0.0.0:{raw}")
    }
}

/// Wire the pipeline, guard chain and channels around a store.
///
/// # Errors
///
/// Returns an error if the guard configuration is invalid or an HTTP
/// client cannot be built.
pub fn build_state(
    config: Arc<Config>,
    store: DynFormStore,
    rate_limiter: DynRateLimiter,
) -> Result<AppState> {
    let cache = Arc::new(MemoryCache::new(Duration::from_secs(config.cache.ttl_secs)));
    let loader = SchemaLoader::new(store.clone(), cache);
    let dispatcher = channels::standard_dispatcher(&config, store)?;
    let uploads = UploadStore::new(
        config.uploads.directory.clone(),
        config.uploads.base_url.clone(),
    );

    let deps = GuardDeps {
        limits: config.limits.clone(),
        rate_limiter,
    };
    let guards = create_filter_chain(&config.guards, &deps)?;
    info!(
        guards = ?guards.filter_names(),
        channels = ?dispatcher.channel_names(),
        "submission pipeline ready"
    );

    Ok(AppState {
        pipeline: Arc::new(Pipeline::new(config, loader, dispatcher, uploads)),
        guards: Arc::new(guards),
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
    }
    info!("shutdown signal received");
}

/// Serve the HTTP surface until interrupted.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the listener cannot bind.
pub async fn run(cfg: Config) -> Result<()> {
    let cfg = Arc::new(cfg);
    let store = store::open(&cfg.db_path).await?;

    let limiter = Arc::new(MemoryRateLimiter::new(
        Duration::from_secs(cfg.limits.rate_limit_secs),
        Duration::from_secs(cfg.limits.marker_ttl_secs),
    ));
    let state = build_state(cfg.clone(), store, limiter.clone())?;

    let limiter_clone = limiter.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(PURGE_INTERVAL).await;
            limiter_clone.purge_expired();
        }
    });

    let addr = listen_addr(&cfg.addr);
    let listener = TcpListener::bind(&addr).await?;
    info!("listening on {addr}");

    axum::serve(
        listener,
        http::router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}
