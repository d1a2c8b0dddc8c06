use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tutorhub::ActionResult;
use tutorhub::config::loader::ConfigLoader;
use tutorhub::observability::init_logging;
use tutorhub::services::SessionManager;
use tutorhub::storage::StorageFactory;

const USAGE: &str = "usage: tutorhub [login <email> <password>]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var("TUTORHUB_CONFIG") {
        Ok(path) => ConfigLoader::load_from(&path)
            .with_context(|| format!("failed to load configuration from {}", path))?,
        Err(_) => ConfigLoader::load().context("failed to load configuration")?,
    };
    ConfigLoader::validate(&config)?;

    let _log_guard = init_logging(&config.logging);
    info!("Starting {}...", config.app_name);

    let local = StorageFactory::create_local(&config.local_state)?;
    let remote = StorageFactory::create_remote(&config.remote)?;
    if let Some(backend) = &remote {
        if !backend.health_check().await {
            warn!("Remote store is unreachable, live operations will fail");
        }
    }

    let manager = Arc::new(SessionManager::new(&config, local, remote)?);
    let listener = manager.spawn_auth_listener();

    match manager.restore().await {
        Ok(Some(profile)) => info!(user_id = profile.id(), role = %profile.role(), "Session restored"),
        Ok(None) => info!("No session to restore"),
        Err(e) => warn!(error = %e, "Session restore failed"),
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => {}
        [command, email, password] if command == "login" => {
            let result = manager.login(email, password).await;
            println!("{}", serde_json::to_string_pretty(&ActionResult::from(&result))?);
        }
        _ => eprintln!("{}", USAGE),
    }

    let mirror = manager.mirror();
    info!(
        state = %manager.state(),
        students = mirror.students().len(),
        lessons = mirror.lessons().len(),
        "Session ready"
    );
    tracing::debug!("{}", mirror.metrics().gather());

    if let Some(handle) = listener {
        handle.abort();
    }
    Ok(())
}
