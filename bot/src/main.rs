use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use voiceinfo::config::Settings;
use voiceinfo::engine::tracker::Tracker;
use voiceinfo::store::config_store::ConfigStore;
use voiceinfo::sync::avatar::HttpAvatarFetcher;
use voiceinfo::sync::writer::OutputWriter;
use voiceinfo::web::app_state::AppState;
use voiceinfo::web::router::build_router;

/// Exports the members of a watched voice channel as files for OBS overlays.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the TOML settings file.
    #[arg(long, default_value = "voiceinfo.toml")]
    settings: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = Settings::load(&args.settings)?;

    let config = ConfigStore::load(&settings.sync.config_path).await?;
    let writer = OutputWriter::new(
        &settings.sync.output_dir,
        Arc::new(HttpAvatarFetcher::new()),
    );
    let tracker = Tracker::new(config, writer, settings.sync.avatar_sizes.clone());

    let cancel = CancellationToken::new();
    let (handle, tracker_task) = tracker.spawn(settings.autosave_interval(), cancel.clone());

    let app = build_router(Arc::new(AppState::new(handle, settings.bot.token.clone())));
    let listener = tokio::net::TcpListener::bind(&settings.bot.listen_address)
        .await
        .with_context(|| format!("failed to bind {}", settings.bot.listen_address))?;

    info!(
        address = %settings.bot.listen_address,
        output = %settings.sync.output_dir.display(),
        interval_secs = settings.sync.autosave_interval_secs,
        "voiceinfo starting"
    );

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        ctrl_c.cancel();
    });

    let shutdown = cancel.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;
    // The server may also stop on its own; make sure the tracker follows.
    cancel.cancel();

    let tracked = tracker_task.await.context("tracker task panicked")?;
    served.context("http server error")?;
    if let Err(e) = tracked {
        error!(error = %e, "exiting after fatal error");
        return Err(e.into());
    }

    info!("voiceinfo stopped");
    Ok(())
}
