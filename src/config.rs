use std::path::{Path, PathBuf};

/// Filesystem layout and listen port for the dashboard.
///
/// Everything the service touches is owned by the upload agent; these are
/// just the places the agent's container layout puts them, overridable per
/// deployment through environment variables.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// The agent's SQLite state database.
    pub db_path: PathBuf,
    /// Flat key=value settings file the agent reads on each cycle.
    pub env_file: PathBuf,
    /// Sentinel file; its presence tells the agent to halt uploads.
    pub pause_file: PathBuf,
    /// Directory whose disk usage is shown on the dashboard.
    pub upload_dir: PathBuf,
    /// Version manifest written by the release pipeline.
    pub release_file: PathBuf,
    pub http_port: u16,
}

impl RuntimeConfig {
    pub fn with_defaults(base_dir: &Path) -> Self {
        Self {
            db_path: base_dir.join("uploader.db"),
            env_file: base_dir.join("uploader.env"),
            pause_file: base_dir.join("pause"),
            upload_dir: base_dir.join("downloads"),
            release_file: base_dir.join("release.json"),
            http_port: 8080,
        }
    }

    /// Defaults plus any `UPLOADER_*` environment overrides.
    pub fn from_env(base_dir: &Path) -> Self {
        let mut cfg = Self::with_defaults(base_dir);
        if let Some(v) = env_path("UPLOADER_DB") {
            cfg.db_path = v;
        }
        if let Some(v) = env_path("UPLOADER_ENV_FILE") {
            cfg.env_file = v;
        }
        if let Some(v) = env_path("UPLOADER_PAUSE_FILE") {
            cfg.pause_file = v;
        }
        if let Some(v) = env_path("UPLOADER_UPLOAD_DIR") {
            cfg.upload_dir = v;
        }
        if let Some(v) = env_path("UPLOADER_RELEASE_FILE") {
            cfg.release_file = v;
        }
        if let Some(port) = std::env::var("UPLOADER_HTTP_PORT")
            .ok()
            .and_then(|v| v.trim().parse::<u16>().ok())
        {
            cfg.http_port = port;
        }
        cfg
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
