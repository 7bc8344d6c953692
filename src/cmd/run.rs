//! `relaymesh run`: start the proxy server.
//!
//! Resolves the config source (Redis registry or route file), starts the
//! config applier that keeps the routing table in sync with it, then serves
//! the Axum router with graceful shutdown. On shutdown the applier is
//! stopped first and every health monitor is cancelled last.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::balancer::{MonitorSettings, TcpProber};
use crate::cli::RunArgs;
use crate::config::applier::ConfigApplier;
use crate::config::sources;
use crate::config::ConfigSource;
use crate::error::MeshError;
use crate::logging;
use crate::proxy::forward::HyperForwarder;
use crate::proxy::routing::RoutingTable;
use crate::proxy::Dispatcher;
use crate::server::{self, AppState, Stats};

pub async fn execute(args: RunArgs) -> Result<(), MeshError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let source = resolve_config_source(&args).await?;
    let source_name = source.name().to_string();

    let table = Arc::new(RoutingTable::new());
    let settings = MonitorSettings {
        interval: args.probe_interval(),
        timeout: args.probe_timeout(),
    };
    let applier = Arc::new(ConfigApplier::new(
        Arc::clone(&table),
        settings,
        Arc::new(TcpProber),
    ));

    // Dropping or signalling shutdown_tx stops the applier.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let applier_handle = tokio::spawn(applier.run(
        source,
        args.resubscribe_interval(),
        shutdown_rx,
    ));

    let forwarder = HyperForwarder::new(
        server::build_http_client(args.connect_timeout()),
        args.response_timeout(),
    );
    let state = Arc::new(AppState {
        dispatcher: Dispatcher::new(Arc::clone(&table), Arc::new(forwarder)),
        start_time: Instant::now(),
        source_name: source_name.clone(),
        stats: Stats::new(),
    });

    let router = server::build_router(state, args.max_body);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "failed to bind listener");
            let _ = shutdown_tx.send(true);
            table.shutdown().await;
            return Err(e.into());
        }
    };

    tracing::info!(
        addr = %addr,
        source = %source_name,
        probe_interval_secs = args.probe_interval,
        "relaymesh started"
    );

    let graceful_shutdown = async move {
        server::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    };

    let served = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful_shutdown)
    .await;

    // Catches panics in the applier task.
    if let Err(e) = applier_handle.await {
        tracing::error!(error = %e, "config applier task failed");
    }
    table.shutdown().await;

    served?;
    tracing::info!("relaymesh stopped");
    Ok(())
}

async fn resolve_config_source(args: &RunArgs) -> Result<Arc<dyn ConfigSource>, MeshError> {
    #[cfg(feature = "redis")]
    if let Some(ref url) = args.redis_url {
        let source = sources::redis_source::RedisSource::new(
            url,
            &args.redis_channel,
            &args.redis_key_pattern,
        )?;
        tracing::info!(channel = %args.redis_channel, "using redis route registry");
        return Ok(Arc::new(source));
    }

    if let Some(source) = resolve_file_source(args).await? {
        return Ok(source);
    }

    Err(MeshError::NoConfigSource {
        hint: "Provide --config <file>, --redis-url <url>, \
               or place relaymesh.yaml in the working directory."
            .into(),
    })
}

async fn resolve_file_source(args: &RunArgs) -> Result<Option<Arc<dyn ConfigSource>>, MeshError> {
    if let Some(path) = args.config.as_deref() {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(MeshError::ConfigFileNotFound {
                path: path.to_path_buf(),
            });
        }
        return create_file_source(path, args).map(Some);
    }

    let candidates = [
        "relaymesh.yaml",
        "relaymesh.yml",
        "relaymesh.json",
        "relaymesh.toml",
    ];

    for name in &candidates {
        let path = PathBuf::from(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(path = %path.display(), "auto-detected route file");
            return create_file_source(&path, args).map(Some);
        }
    }

    Ok(None)
}

fn create_file_source(path: &Path, args: &RunArgs) -> Result<Arc<dyn ConfigSource>, MeshError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let source = match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => sources::yaml::new(path.to_path_buf()),

        #[cfg(feature = "json")]
        "json" => sources::json::new(path.to_path_buf()),

        #[cfg(feature = "toml")]
        "toml" => sources::toml_source::new(path.to_path_buf()),

        other => return Err(MeshError::UnsupportedFormat(other.to_string())),
    };

    Ok(Arc::new(source.with_poll_interval(args.poll_interval())))
}
