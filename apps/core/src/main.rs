// Campus Assist entry point
// Loads the knowledge base, opens the conversation log, serves HTTP.

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use campus_assist::brain::CampusAssistant;
use campus_assist::config::AssistantConfig;
use campus_assist::server::{self, AppState};
use campus_assist::telemetry;
use campus_assist::turn_log::{SqliteTurnLog, TurnSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_subscriber("campus-assist")?;

    let config = AssistantConfig::from_env().context("invalid configuration")?;
    info!(
        bind_addr = %config.bind_addr,
        database_url = %config.database_url,
        handoff_threshold = config.handoff_threshold,
        "Starting campus assistant"
    );

    ensure_db_dir(&config.database_url)?;
    let log = SqliteTurnLog::connect(&config.database_url)
        .await
        .context("cannot open conversation log")?;
    match log.cleanup_old_logs(config.log_retention_days).await {
        Ok(deleted) => info!(deleted, "Conversation log retention applied"),
        Err(e) => error!(error = %e, "Failed to prune old conversation logs"),
    }

    let sink: Arc<dyn TurnSink> = Arc::new(log.clone());
    let assistant = match CampusAssistant::from_config(config.clone(), sink) {
        Ok(assistant) => assistant,
        Err(e) => {
            error!(error = %e, "Knowledge base failed to load");
            return Err(e.into());
        }
    };

    let state = Arc::new(AppState {
        assistant,
        log: Some(log),
    });
    server::serve(state, &config.bind_addr).await?;
    Ok(())
}

/// Creates the parent directory of a file-backed SQLite URL.
fn ensure_db_dir(database_url: &str) -> anyhow::Result<()> {
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    Ok(())
}
