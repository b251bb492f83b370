pub mod config;
pub mod telemetry;

use anyhow::Context;
use config::{StorageKind, load_storage};
use tracing::{info, warn};
use transit_core::{CacheConfigRequest, CacheConfigView, MountBuilder, TransitMount};

/// Options for one broker process; unset values fall back to the environment.
#[derive(Debug, Clone)]
pub struct BrokerRuntimeConfig {
    pub storage: StorageKind,
    pub caching_disabled: Option<bool>,
    pub lock_shards: Option<usize>,
    pub nats_url: Option<String>,
    pub nats_subject: Option<String>,
}

impl BrokerRuntimeConfig {
    pub fn new(storage: StorageKind) -> Self {
        Self {
            storage,
            caching_disabled: None,
            lock_shards: None,
            nats_url: None,
            nats_subject: None,
        }
    }
}

/// Mount the engine over the configured storage and restore its cache configuration.
pub async fn mount(config: &BrokerRuntimeConfig) -> anyhow::Result<TransitMount> {
    let mut builder = MountBuilder::from_env();
    if let Some(disabled) = config.caching_disabled {
        builder = builder.caching_disabled(disabled);
    }
    if let Some(shards) = config.lock_shards {
        builder = builder.lock_shards(shards);
    }
    if let Some(url) = &config.nats_url {
        builder = builder.nats_url(url.clone());
    }
    if let Some(subject) = &config.nats_subject {
        builder = builder.nats_subject(subject.clone());
    }

    builder
        .build(load_storage(&config.storage))
        .await
        .with_context(|| format!("failed to mount transit engine on {:?}", config.storage))
}

/// Serve invalidations until ctrl-c or SIGTERM.
pub async fn run(config: BrokerRuntimeConfig) -> anyhow::Result<()> {
    let mount = mount(&config).await?;
    let view = mount.cache_config().read();
    info!(
        cache_type = %view.cache_type,
        cache_max_size = view.cache_max_size,
        caching_disabled = mount.manager().caching_disabled(),
        "transit mount ready"
    );

    let (sender, consumer) = mount.spawn_invalidation_channel();

    #[cfg(feature = "nats")]
    let listener = match mount.config().nats_url.clone() {
        Some(url) => {
            info!(nats_url = %url, "connecting to nats");
            Some(transit_core::invalidation::spawn_nats_listener(
                url,
                mount.config().nats_subject.clone(),
                sender.clone(),
            ))
        }
        None => {
            warn!("nats disabled; GREENTIC_TRANSIT_NATS_URL not set");
            None
        }
    };

    #[cfg(not(feature = "nats"))]
    if mount.config().nats_url.is_some() {
        warn!("nats url configured but the nats feature is not enabled");
    }

    shutdown_signal().await;
    info!("shutting down transit mount");

    #[cfg(feature = "nats")]
    if let Some(listener) = listener {
        listener.abort();
    }
    drop(sender);
    consumer.await.context("invalidation consumer failed")?;
    Ok(())
}

/// Read the live cache configuration of the mount.
pub async fn show_cache_config(config: &BrokerRuntimeConfig) -> anyhow::Result<CacheConfigView> {
    let mount = mount(config).await?;
    Ok(mount.cache_config().read())
}

/// Apply and persist a cache configuration, returning the resulting view.
pub async fn set_cache_config(
    config: &BrokerRuntimeConfig,
    request: &CacheConfigRequest,
) -> anyhow::Result<CacheConfigView> {
    let mount = mount(config).await?;
    mount.cache_config().write(request).await?;
    Ok(mount.cache_config().read())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(?err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => warn!(?err, "failed to install sigterm handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
