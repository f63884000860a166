use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tweet_archive_bot::archiver::Archiver;
use tweet_archive_bot::commentary::{self, CommentaryGenerator};
use tweet_archive_bot::config::{Config, LogFormat};
use tweet_archive_bot::db::{count_processed_content, Database};
use tweet_archive_bot::processors::{DmProcessor, MentionsProcessor};
use tweet_archive_bot::reply::ReplyComposer;
use tweet_archive_bot::storage::{PinningStorage, StorageBackend, UploadOptions};
use tweet_archive_bot::thread::ConversationResolver;
use tweet_archive_bot::twitter::{SocialClient, XApiClient};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing(LogFormat::from_env())?;

    info!("Starting tweet-archive-bot");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        network = config.storage_network.as_str(),
        mentions = config.mentions_enabled,
        dms = config.dms_enabled,
        "Configuration loaded"
    );

    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    let db = Database::new(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let archived = count_processed_content(db.pool()).await?;
    info!(archived, "Database initialized");

    let client: Arc<dyn SocialClient> = Arc::new(
        XApiClient::new(&config.twitter_api_url, &config.twitter_access_token)
            .context("Failed to create X API client")?,
    );
    let profile = client
        .bot_profile()
        .await
        .context("Failed to authenticate with the X API")?;
    info!(username = %profile.username, user_id = %profile.user_id, "Authenticated");

    let pinning = PinningStorage::new(&config).context("Failed to create storage client")?;
    if let Ok(healthy) = pinning.health_check().await {
        if healthy {
            info!(api_url = %config.storage_api_url, "Storage service is reachable");
        } else {
            warn!(api_url = %config.storage_api_url, "Storage service not reachable, will retry on each upload");
        }
    }
    let storage: Arc<dyn StorageBackend> = Arc::new(pinning);

    let archiver = Archiver::new(
        db.clone(),
        storage,
        UploadOptions {
            compression: config.archive_compression,
            password: config.archive_password.clone(),
        },
    )?;

    let commentary = match commentary::from_config(&config)? {
        Some(model) => {
            let generator = CommentaryGenerator::new(model);
            if !generator.check_connection().await {
                warn!("LLM connection test failed, replies will fall back to plain text");
            }
            Some(generator)
        }
        None => {
            info!("Commentary disabled");
            None
        }
    };

    let composer = ReplyComposer::from_config(&config);
    let shutdown = CancellationToken::new();
    let mut handles = Vec::new();

    if config.mentions_enabled {
        let processor = MentionsProcessor::new(
            db.clone(),
            Arc::clone(&client),
            ConversationResolver::new(Arc::clone(&client), config.max_thread_depth),
            archiver.clone(),
            commentary,
            composer.clone(),
            config.mentions_batch_size,
        );
        let interval = config.mentions_poll_interval;
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move {
            processor.run(interval, token).await;
        }));
        info!("Mentions processor started");
    } else {
        info!("Mentions processor disabled");
    }

    if config.dms_enabled {
        let processor = DmProcessor::new(db.clone(), Arc::clone(&client), archiver, composer);
        let interval = config.dms_poll_interval;
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move {
            processor.run(interval, token).await;
        }));
        info!("DM processor started");
    } else {
        info!("DM processor disabled");
    }

    shutdown_signal().await;

    info!("Shutting down, waiting for in-flight cycles...");
    shutdown.cancel();

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Processor task panicked: {e}");
        }
    }

    db.close().await;
    info!("Shutdown complete");

    Ok(())
}

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tweet_archive_bot=debug"));

    match format {
        LogFormat::Json => {
            // Structured JSON logging for production
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
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
