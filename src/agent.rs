use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use sysinfo::{Disks, System};

use crate::{
    models::{AgentState, StatusResponse},
    units::format_duration,
};

const BYTES_PER_TB: f64 = 1024_f64 * 1024.0 * 1024.0 * 1024.0;

/// Control surface for the externally-run upload agent.
///
/// The agent polls for a sentinel pause file: file present means halt.
/// Creation and removal are each a single filesystem operation so the
/// dashboard never races the agent's polling loop with a partial state.
pub struct AgentControl {
    pause_file: PathBuf,
    upload_dir: PathBuf,
}

impl AgentControl {
    pub fn new(pause_file: impl Into<PathBuf>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            pause_file: pause_file.into(),
            upload_dir: upload_dir.into(),
        }
    }

    pub fn state(&self) -> AgentState {
        if self.pause_file.exists() {
            AgentState::Stopped
        } else {
            AgentState::Started
        }
    }

    pub fn pause(&self) -> Result<()> {
        if let Some(parent) = self.pause_file.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create pause file dir: {}", parent.display()))?;
        }
        fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.pause_file)
            .with_context(|| format!("create pause file: {}", self.pause_file.display()))?;
        log::info!("pause file created: {}", self.pause_file.display());
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        match fs::remove_file(&self.pause_file) {
            Ok(()) => {
                log::info!("pause file removed: {}", self.pause_file.display());
                Ok(())
            }
            // Already running; nothing to remove.
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| {
                format!("remove pause file: {}", self.pause_file.display())
            }),
        }
    }

    /// Apply a pause/continue action from the status endpoint. Unknown
    /// actions are logged and ignored; the caller re-reads the state either
    /// way.
    pub fn apply_action(&self, action: &str) -> Result<()> {
        match action {
            "pause" => self.pause(),
            "continue" => self.resume(),
            other => {
                log::warn!("ignoring unknown status action: {other}");
                Ok(())
            }
        }
    }

    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            status: self.state(),
            uptime: uptime_display(),
            storage: storage_display(&self.upload_dir),
        }
    }
}

fn uptime_display() -> String {
    format_duration(System::uptime() as i64)
}

/// Used/total of the disk backing the upload directory, as the dashboard's
/// `"x.xx TB / y.yy TB"` string. `N/A` when the directory is absent or no
/// mounted disk covers it.
fn storage_display(upload_dir: &Path) -> String {
    if !upload_dir.is_dir() {
        return "N/A".to_string();
    }
    let disks = Disks::new_with_refreshed_list();
    let best = disks
        .list()
        .iter()
        .filter(|disk| upload_dir.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len());
    match best {
        Some(disk) => {
            let total = disk.total_space();
            let used = total.saturating_sub(disk.available_space());
            format!(
                "{:.2} TB / {:.2} TB",
                used as f64 / BYTES_PER_TB,
                total as f64 / BYTES_PER_TB
            )
        }
        None => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn temp_control() -> AgentControl {
        let base = std::env::temp_dir().join(format!("uploader-agent-{}", Uuid::new_v4()));
        AgentControl::new(base.join("pause"), base.join("downloads"))
    }

    #[test]
    fn pause_and_resume_toggle_the_marker() {
        let control = temp_control();
        assert_eq!(control.state(), AgentState::Started);

        control.pause().expect("pause");
        assert_eq!(control.state(), AgentState::Stopped);
        // Pausing twice is fine; the marker is already there.
        control.pause().expect("pause again");
        assert_eq!(control.state(), AgentState::Stopped);

        control.resume().expect("resume");
        assert_eq!(control.state(), AgentState::Started);
        // Resuming an already-running agent is not an error.
        control.resume().expect("resume again");
        assert_eq!(control.state(), AgentState::Started);
    }

    #[test]
    fn unknown_action_is_ignored() {
        let control = temp_control();
        control.apply_action("reboot").expect("ignored");
        assert_eq!(control.state(), AgentState::Started);
    }

    #[test]
    fn actions_map_to_marker_operations() {
        let control = temp_control();
        control.apply_action("pause").expect("pause");
        assert_eq!(control.state(), AgentState::Stopped);
        control.apply_action("continue").expect("continue");
        assert_eq!(control.state(), AgentState::Started);
    }

    #[test]
    fn storage_is_na_for_missing_directory() {
        let control = temp_control();
        let status = control.status();
        assert_eq!(status.storage, "N/A");
        assert!(status.uptime.ends_with('s'));
    }
}
