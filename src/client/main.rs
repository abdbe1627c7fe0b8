/**
 * tripsync - Queue Replay Entry Point
 *
 * Opens the local database, reports what is waiting in the offline queue
 * and replays it once against the configured backend.
 *
 * Usage: tripsync-sync [config.toml]
 */
use tripsync::client::config::Config;
use tripsync::client::logging;
use tripsync::client::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();
    logging::init("info,sqlx=warn");

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)?,
        None => Config::from_env()?,
    };
    tracing::info!(
        backend = %config.backend_url(),
        database = %config.database_path().display(),
        demo_mode = config.demo_mode(),
        "Starting queue replay"
    );

    let state = AppState::initialize(config).await?;

    let stats = state.queue.stats().await?;
    println!(
        "Offline queue: {} total, {} pending, {} in progress, {} failed",
        stats.total_operations, stats.pending, stats.in_progress, stats.failed
    );

    let report = state.sync.replay_pending().await?;
    println!(
        "Replayed {}, failed {}, still pending {}",
        report.replayed, report.failed, report.remaining
    );

    for operation in state.queue.failed_operations().await? {
        println!(
            "  failed {} {} on trip {}: {}",
            operation.id,
            operation.kind,
            operation.trip_id,
            operation.last_error.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(())
}
