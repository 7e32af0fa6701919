use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentState {
    Started,
    Stopped,
}

/// Progress scraped from the tail of a job's rclone log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferProgress {
    pub percentage: String,
    pub speed: Option<String>,
    pub remaining_time: Option<String>,
}

impl TransferProgress {
    /// A job whose log has no stats block yet: rclone has not flushed its
    /// first progress line, so the upload just started.
    pub fn fresh() -> Self {
        Self {
            percentage: "0%".to_string(),
            speed: None,
            remaining_time: None,
        }
    }
}

/// One row of the agent's `uploads` table.
#[derive(Debug, Clone)]
pub struct UploadRow {
    pub drive: String,
    pub filedir: String,
    pub filebase: String,
    pub filesize: String,
    pub gdsa: Option<String>,
    pub logfile: Option<String>,
}

/// One row of the agent's `completed_uploads` table.
#[derive(Debug, Clone)]
pub struct CompletedRow {
    pub drive: String,
    pub filedir: String,
    pub filebase: String,
    pub filesize: String,
    pub gdsa: Option<String>,
    pub starttime: i64,
    pub endtime: i64,
    pub status: i64,
}

/// One row of the agent's `upload_queue` table.
#[derive(Debug, Clone)]
pub struct QueueRow {
    pub time: i64,
    pub drive: String,
    pub filedir: String,
    pub filebase: String,
    pub filesize: String,
    pub metadata: Option<String>,
}

/// In-progress job as the dashboard renders it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InProgressJob {
    pub job_name: String,
    pub drive: String,
    pub gdsa: Option<String>,
    pub file_directory: String,
    pub file_name: String,
    pub file_size: String,
    pub upload_percentage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_remainingtime: Option<String>,
}

/// Completed job with the display fields precomputed server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedJob {
    pub job_name: String,
    pub drive: String,
    pub gdsa: Option<String>,
    pub file_directory: String,
    pub file_name: String,
    pub file_size: String,
    pub job_last_update_timestamp: i64,
    pub time_start: i64,
    pub time_end: String,
    pub time_end_clean: String,
    pub time_elapsed: String,
    pub successful: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListResponse<T> {
    pub jobs: Vec<T>,
    pub total_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueFile {
    pub filename: String,
    pub filesize: String,
    pub drive: String,
    pub filedir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueResponse {
    pub success: bool,
    pub files: Vec<QueueFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Count-and-bytes aggregate shared by the queue and completed-today views.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregateStats {
    pub count: i64,
    pub total_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: AgentState,
    pub uptime: String,
    pub storage: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub webui_version: String,
    pub uploader_version: String,
    /// Legacy alias older frontends still read.
    pub version: String,
    pub success: bool,
    pub found_path: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page_number: i64,
    pub page_size: i64,
}
