use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("settings file not found: {0}")]
    EnvFileNotFound(String),
    #[error("no settings were updated")]
    NoSettingsUpdated,
}
