use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
};

use regex::Regex;

use crate::models::TransferProgress;

/// How many trailing log lines rclone needs to have flushed at least one
/// stats block into.
pub const TAIL_LINES: usize = 6;

const TAIL_READ_BYTES: u64 = 64 * 1024;

/// Scrape percent / speed / ETA for a running upload from the tail of its
/// rclone log. Any failure to read or match means the transfer just
/// started, which the dashboard shows as 0%.
pub fn scrape_log_progress(logfile: &Path) -> TransferProgress {
    match read_last_lines(logfile, TAIL_LINES) {
        Ok(block) => parse_progress_block(&block).unwrap_or_else(TransferProgress::fresh),
        Err(_) => TransferProgress::fresh(),
    }
}

/// Extract `(percent, speed, eta)` from a block of rclone log output.
pub fn parse_progress_block(block: &str) -> Option<TransferProgress> {
    let re = Regex::new(r"([0-9%]+)\s/\d+\.\d+\w{1,2},\s(\d+\.\d+\w+/s),\s([0-9dhms]+)")
        .expect("progress pattern is valid");
    let caps = re.captures(block)?;
    Some(TransferProgress {
        percentage: caps[1].to_string(),
        speed: Some(caps[2].to_string()),
        remaining_time: Some(caps[3].to_string()),
    })
}

/// Last `n` lines of a file without slurping the whole log; rclone logs for
/// long transfers run to many megabytes.
pub fn read_last_lines(path: &Path, n: usize) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let start = len.saturating_sub(TAIL_READ_BYTES);
    file.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut buf)?;
    let text = String::from_utf8_lossy(&buf);
    let lines: Vec<&str> = text.lines().collect();
    let tail_start = lines.len().saturating_sub(n);
    Ok(lines[tail_start..].join("\n"))
}
