use std::{collections::BTreeMap, path::Path, path::PathBuf, sync::Arc};

use anyhow::Result;
use chrono::{Local, TimeZone, Utc};
use serde_json::{Value, json};

use crate::{
    agent::AgentControl,
    db::Database,
    env_file::EnvFile,
    models::{
        AggregateStats, CompletedJob, CompletedRow, InProgressJob, JobListResponse, PageRequest,
        QueueFile, QueueResponse, StatusResponse, VersionInfo,
    },
    progress::scrape_log_progress,
    units::{format_duration, parse_size_to_bytes},
    version::version_info,
};

const MAX_PAGE_SIZE: i64 = 50;
const FALLBACK_PAGE_SIZE: i64 = 10;
/// Below this row count the frontend renders the full table unpaginated.
const PAGINATION_THRESHOLD: i64 = 5;

/// Everything the dashboard endpoints do, independent of HTTP plumbing.
pub struct DashboardService {
    db: Arc<Database>,
    env_file: EnvFile,
    agent: AgentControl,
    release_file: PathBuf,
}

impl DashboardService {
    pub fn new(
        db: Arc<Database>,
        env_file: EnvFile,
        agent: AgentControl,
        release_file: PathBuf,
    ) -> Self {
        Self {
            db,
            env_file,
            agent,
            release_file,
        }
    }

    /// In-flight uploads with progress scraped from each job's rclone log.
    /// Rows without a log file yet are skipped; the agent has not actually
    /// started them.
    pub fn inprogress_jobs(&self) -> Result<JobListResponse<InProgressJob>> {
        let rows = self.db.list_inprogress()?;
        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(logfile) = row.logfile else {
                continue;
            };
            let progress = scrape_log_progress(Path::new(&logfile));
            jobs.push(InProgressJob {
                job_name: row.filebase.clone(),
                drive: row.drive,
                gdsa: row.gdsa,
                file_directory: row.filedir,
                file_name: row.filebase,
                file_size: row.filesize,
                upload_percentage: progress.percentage,
                upload_speed: progress.speed,
                upload_remainingtime: progress.remaining_time,
            });
        }
        Ok(JobListResponse {
            total_count: jobs.len() as i64,
            jobs,
            error: None,
        })
    }

    /// Upload history, newest first. `total_count` is always the full row
    /// count so the frontend can draw its pager.
    pub fn completed_jobs(&self, page: Option<PageRequest>) -> Result<JobListResponse<CompletedJob>> {
        let total = self.db.count_completed()?;
        let window = page.and_then(|req| resolve_page(total, req));
        let rows = self.db.list_completed(window)?;
        let now = now_ts();
        let jobs = rows
            .into_iter()
            .map(|row| completed_job_from_row(row, now))
            .collect();
        Ok(JobListResponse {
            jobs,
            total_count: total,
            error: None,
        })
    }

    pub fn completed_today_stats(&self) -> Result<AggregateStats> {
        self.db.completed_stats_since(start_of_today_ts())
    }

    pub fn queue_files(&self) -> Result<QueueResponse> {
        let rows = self.db.list_queue()?;
        let files = rows
            .into_iter()
            .map(|row| QueueFile {
                filename: row.filebase,
                filesize: row.filesize,
                drive: row.drive,
                filedir: row.filedir,
                metadata: row.metadata,
                created_at: row.time,
            })
            .collect();
        Ok(QueueResponse {
            success: true,
            files,
            error: None,
        })
    }

    /// Queue totals; sizes are stored as display strings and parsed here.
    pub fn queue_stats(&self) -> Result<AggregateStats> {
        let count = self.db.count_queue()?;
        let total_size = self
            .db
            .queue_filesizes()?
            .iter()
            .map(|size| parse_size_to_bytes(size))
            .sum();
        Ok(AggregateStats { count, total_size })
    }

    pub fn status(&self) -> StatusResponse {
        self.agent.status()
    }

    /// Toggle the agent's pause marker, then report the resulting state.
    pub fn update_status(&self, action: &str) -> Result<StatusResponse> {
        self.agent.apply_action(action)?;
        Ok(self.agent.status())
    }

    pub fn clean_history(&self, clean_type: &str) -> Result<Value> {
        let failed_only = clean_type == "failed";
        let deleted = self.db.clean_history(failed_only)?;
        log::info!("cleaned upload history: type={clean_type} deleted={deleted}");
        Ok(json!({ "success": true, "type": clean_type }))
    }

    pub fn version(&self) -> VersionInfo {
        version_info(&self.release_file)
    }

    pub fn env_settings(&self) -> Result<BTreeMap<String, String>> {
        self.env_file.load_settings()
    }

    pub fn update_env(&self, updates: &serde_json::Map<String, Value>) -> Result<()> {
        self.env_file.apply_updates(updates)
    }
}

/// Resolve a pagination request into a `(limit, offset)` window.
///
/// Pagination only engages once the history holds at least five rows; the
/// frontend renders smaller tables whole. Out-of-range sizes fall back to
/// ten per page and the page number is clamped into range.
fn resolve_page(total: i64, req: PageRequest) -> Option<(i64, i64)> {
    if total < PAGINATION_THRESHOLD {
        return None;
    }
    // The page number is clamped against the page count the client asked
    // for, before the size itself is validated; an oversized pageSize
    // therefore lands on the first fallback page, not the last one.
    let clamp_size = req.page_size.max(1);
    let total_pages = (total + clamp_size - 1) / clamp_size;
    let page_number = req.page_number.clamp(1, total_pages);
    let page_size = if (1..=MAX_PAGE_SIZE).contains(&req.page_size) {
        req.page_size
    } else {
        FALLBACK_PAGE_SIZE
    };
    Some((page_size, (page_number - 1) * page_size))
}

fn completed_job_from_row(row: CompletedRow, now: i64) -> CompletedJob {
    CompletedJob {
        job_name: row.filebase.clone(),
        drive: row.drive,
        gdsa: row.gdsa,
        file_directory: row.filedir,
        file_name: row.filebase,
        file_size: row.filesize,
        job_last_update_timestamp: row.endtime,
        time_start: row.starttime,
        time_end: format_end_time(row.endtime),
        time_end_clean: format!("{} ago", format_duration(now - row.endtime)),
        time_elapsed: format_duration(row.endtime - row.starttime),
        successful: row.status == 1,
    }
}

fn format_end_time(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%d.%m.%y %H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}

fn start_of_today_ts() -> i64 {
    let midnight = Local::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time");
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.timestamp())
        .unwrap_or_default()
}

fn now_ts() -> i64 {
    Utc::now().timestamp()
}
