use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use feed_media_archiver::archiver::{ArchivePipeline, ArchivePool, ArchiveQueue, GalleryDl};
use feed_media_archiver::chibisafe::{ChibisafeClient, SettingsCache, Uploader};
use feed_media_archiver::config::Config;
use feed_media_archiver::db::{count_posts, Database};
use feed_media_archiver::discord::DiscordNotifier;
use feed_media_archiver::miniflux::MinifluxClient;
use feed_media_archiver::processor::EntryProcessor;
use feed_media_archiver::web::{self, AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting feed-media-archiver");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    if config.miniflux_secret.is_none() {
        warn!("MINIFLUX_SECRET is not set, webhook signatures will not be verified");
    }

    tokio::fs::create_dir_all(&config.archive_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create archive directory: {}",
                config.archive_dir.display()
            )
        })?;

    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    let db = Database::new(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    let recorded = count_posts(db.pool()).await?;
    info!(path = %config.database_path.display(), recorded, "Database initialized");

    let downloader = GalleryDl::new(config.gallery_dl_path.clone());
    if downloader.is_available() {
        info!(program = %downloader.program(), "gallery-dl found");
    } else {
        warn!(program = %downloader.program(), "gallery-dl not found, entries will be recorded but not archived");
    }

    let uploader = match ChibisafeClient::from_config(&config)? {
        Some(client) => {
            info!(api_url = %client.api_url(), "Chibisafe upload enabled");
            let settings = Arc::new(SettingsCache::new(client.clone(), config.settings_ttl));
            match settings.refresh().await {
                Ok(network_storage) => info!(network_storage, "Chibisafe settings loaded"),
                Err(e) => warn!("Could not load Chibisafe settings, will retry on first upload: {e:#}"),
            }
            Some(Uploader::new(client, settings))
        }
        None => {
            info!("Chibisafe not configured, archives stay local");
            None
        }
    };

    let pipeline = Arc::new(ArchivePipeline::new(
        config.archive_dir.clone(),
        downloader,
        uploader,
        config.cleanup_after_upload,
    ));

    let shutdown = CancellationToken::new();

    let (queue, rx) = ArchiveQueue::bounded(config.archive_queue_capacity);
    let pool_handle = ArchivePool::new(
        pipeline,
        config.worker_concurrency,
        config.archive_timeout,
        shutdown.child_token(),
    )
    .spawn(rx);
    info!(
        workers = config.worker_concurrency,
        capacity = config.archive_queue_capacity,
        "Archive pool started"
    );

    let miniflux = MinifluxClient::from_config(&config)?;
    let notifier = DiscordNotifier::from_config(&config)?;
    if notifier.is_none() {
        info!("Discord webhook not configured, notifications disabled");
    }

    let processor = EntryProcessor::new(db, queue, miniflux, notifier);
    let state = AppState {
        processor: Arc::new(processor),
        config: Arc::new(config),
    };

    let web_shutdown = shutdown.clone();
    let web_handle = tokio::spawn(async move {
        if let Err(e) = web::serve(state, web_shutdown).await {
            error!("Web server error: {e:#}");
        }
    });

    shutdown_signal().await;

    info!("Shutting down...");

    shutdown.cancel();
    if let Err(e) = web_handle.await {
        error!("Web server task failed: {e}");
    }
    // Running archive jobs are cancelled along with the server
    if let Err(e) = pool_handle.await {
        error!("Archive pool task failed: {e}");
    }

    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,feed_media_archiver=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
