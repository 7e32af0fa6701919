use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use crate::{
    error::AppError,
    models::PageRequest,
    service::DashboardService,
};

/// Bind the dashboard API and serve until the task is dropped.
pub async fn run_http_server(service: Arc<DashboardService>, port: u16) -> Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    log::info!("dashboard api listening on 127.0.0.1:{port}");
    serve(listener, service).await
}

pub async fn serve(listener: TcpListener, service: Arc<DashboardService>) -> Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let service = service.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, service).await {
                log::debug!("connection error: {err}");
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, service: Arc<DashboardService>) -> Result<()> {
    let mut raw = Vec::with_capacity(4096);
    let mut tmp = [0_u8; 2048];
    let mut header_end = None;
    loop {
        let n = stream.read(&mut tmp).await?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&tmp[..n]);
        header_end = find_bytes(&raw, b"\r\n\r\n").or_else(|| find_bytes(&raw, b"\n\n"));
        if header_end.is_some() || raw.len() > 256 * 1024 {
            break;
        }
    }
    let Some(header_end_idx) = header_end else {
        return Err(anyhow!("invalid http request"));
    };
    let crlf = raw
        .get(header_end_idx..header_end_idx + 4)
        .map(|v| v == b"\r\n\r\n")
        .unwrap_or(false);
    let headers_raw = String::from_utf8_lossy(&raw[..header_end_idx]).to_string();
    let body_offset = header_end_idx + if crlf { 4 } else { 2 };

    let mut lines = headers_raw.lines();
    let request_line = lines.next().unwrap_or_default().trim().to_string();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            if k.trim().eq_ignore_ascii_case("content-length") {
                if let Ok(v) = v.trim().parse::<usize>() {
                    content_length = v;
                }
            }
        }
    }

    while raw.len().saturating_sub(body_offset) < content_length {
        let n = stream.read(&mut tmp).await?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&tmp[..n]);
    }
    let body = String::from_utf8_lossy(raw.get(body_offset..).unwrap_or_default()).to_string();

    let (path, query) = split_target(&target);
    let (status, payload) = dispatch(&service, &method, path, query, body.trim());
    write_json(&mut stream, status, &payload).await
}

fn dispatch(
    service: &DashboardService,
    method: &str,
    path: &str,
    query: &str,
    body: &str,
) -> (u16, Value) {
    match (method, path) {
        ("GET", "/health") => (200, json!({"ok": true})),

        ("GET", "/api/jobs/inprogress") => match service.inprogress_jobs() {
            Ok(response) => (200, to_value(response)),
            Err(err) => job_list_error(err),
        },
        ("GET", "/api/jobs/completed") => {
            match service.completed_jobs(parse_page_request(query)) {
                Ok(response) => (200, to_value(response)),
                Err(err) => job_list_error(err),
            }
        }
        ("GET", "/api/jobs/completed_today_stats") => match service.completed_today_stats() {
            Ok(stats) => (200, to_value(stats)),
            Err(err) => server_error(err),
        },
        ("GET", "/api/jobs/queue") => match service.queue_files() {
            Ok(response) => (200, to_value(response)),
            Err(err) => {
                log::error!("queue listing failed: {err:#}");
                (
                    200,
                    json!({"success": false, "files": [], "error": err.to_string()}),
                )
            }
        },
        ("GET", "/api/jobs/queue_stats") => match service.queue_stats() {
            Ok(stats) => (200, to_value(stats)),
            Err(err) => server_error(err),
        },

        ("GET", "/api/system/status") => (200, to_value(service.status())),
        ("POST", "/api/system/status") => {
            // Missing or unknown actions still return the current status.
            let action = parse_body_field(body, "action");
            let result = match action.as_deref() {
                Some(action) => service.update_status(action),
                None => Ok(service.status()),
            };
            match result {
                Ok(status) => (200, to_value(status)),
                Err(err) => server_error(err),
            }
        }
        ("POST", "/api/system/clean_history") => {
            let clean_type =
                parse_body_field(body, "type").unwrap_or_else(|| "all".to_string());
            match service.clean_history(&clean_type) {
                Ok(result) => (200, result),
                Err(err) => {
                    log::error!("clean history failed: {err:#}");
                    (500, json!({"success": false, "error": "Database error"}))
                }
            }
        }
        ("GET", "/api/system/version") => (200, to_value(service.version())),
        ("GET", "/api/system/env_settings") => match service.env_settings() {
            Ok(settings) => (200, json!({"success": true, "settings": settings})),
            Err(err) => {
                log::error!("env settings read failed: {err:#}");
                (200, json!({"success": false, "message": err.to_string()}))
            }
        },
        ("POST", "/api/system/update_env") => {
            let Some(updates) = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.as_object().cloned())
            else {
                return (
                    400,
                    json!({"success": false, "message": "Invalid request data."}),
                );
            };
            match service.update_env(&updates) {
                Ok(()) => (
                    200,
                    json!({"success": true, "message": "Settings updated successfully."}),
                ),
                Err(err) => (200, update_env_failure(err)),
            }
        }

        _ => (404, json!({"success": false, "error": "not found"})),
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|err| {
        log::error!("response serialization failed: {err}");
        json!({"success": false, "error": "internal error"})
    })
}

/// The jobs endpoints report failures inside a normal-looking payload so
/// the polling frontend keeps rendering an empty table.
fn job_list_error(err: anyhow::Error) -> (u16, Value) {
    log::error!("job listing failed: {err:#}");
    (
        200,
        json!({"jobs": [], "total_count": 0, "error": err.to_string()}),
    )
}

fn server_error(err: anyhow::Error) -> (u16, Value) {
    log::error!("request failed: {err:#}");
    (500, json!({"success": false, "error": err.to_string()}))
}

fn update_env_failure(err: anyhow::Error) -> Value {
    let message = match err.downcast_ref::<AppError>() {
        Some(AppError::NoSettingsUpdated) => "No settings were updated.".to_string(),
        Some(AppError::EnvFileNotFound(_)) => "Environment file not found.".to_string(),
        _ => err.to_string(),
    };
    json!({"success": false, "message": message})
}

fn split_target(target: &str) -> (&str, &str) {
    match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    }
}

fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then_some(v)
    })
}

/// Pagination kicks in only when both parameters are present and numeric.
fn parse_page_request(query: &str) -> Option<PageRequest> {
    let page_number = query_param(query, "pageNumber")?.parse::<i64>().ok()?;
    let page_size = query_param(query, "pageSize")?.parse::<i64>().ok()?;
    Some(PageRequest {
        page_number,
        page_size,
    })
}

/// Accept both a JSON object body and classic form encoding; the old
/// frontend used either depending on the view.
fn parse_body_field(body: &str, field: &str) -> Option<String> {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let Some(value) = json.get(field).and_then(Value::as_str) {
            return Some(value.to_string());
        }
    }
    query_param(body, field).map(str::to_string)
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn write_json(stream: &mut TcpStream, status: u16, body: &Value) -> Result<()> {
    let body_s = serde_json::to_string(body)?;
    let status_text = match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Bad Request",
    };
    let resp = format!(
        "HTTP/1.1 {status} {status_text}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body_s.len(),
        body_s
    );
    stream.write_all(resp.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
