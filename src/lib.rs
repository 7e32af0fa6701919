pub mod agent;
pub mod config;
pub mod db;
pub mod env_file;
pub mod error;
pub mod models;
pub mod progress;
pub mod server;
pub mod service;
pub mod units;
pub mod version;

use std::sync::Arc;

use anyhow::Result;

use agent::AgentControl;
use config::RuntimeConfig;
use db::Database;
use env_file::EnvFile;
use service::DashboardService;

/// Wire the service up from a runtime config: open (or create) the agent
/// database and hand back the shared service the HTTP layer dispatches to.
pub fn init_service(cfg: &RuntimeConfig) -> Result<Arc<DashboardService>> {
    if let Some(parent) = cfg.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Arc::new(Database::open(&cfg.db_path)?);
    let service = DashboardService::new(
        db,
        EnvFile::new(cfg.env_file.clone()),
        AgentControl::new(cfg.pause_file.clone(), cfg.upload_dir.clone()),
        cfg.release_file.clone(),
    );
    Ok(Arc::new(service))
}
