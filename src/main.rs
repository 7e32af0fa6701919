use anyhow::Result;
use uploader_dashboard::{config::RuntimeConfig, init_service, server::run_http_server};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let base_dir = std::env::current_dir()?;
    let cfg = RuntimeConfig::from_env(&base_dir);
    log::info!(
        "uploader dashboard starting; db={} env={} pause={}",
        cfg.db_path.display(),
        cfg.env_file.display(),
        cfg.pause_file.display()
    );

    let service = init_service(&cfg)?;
    tokio::select! {
        result = run_http_server(service, cfg.http_port) => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutting down");
            Ok(())
        }
    }
}
