use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::models::VersionInfo;

const DEFAULT_WEBUI_VERSION: &str = "5.0.0";
const DEFAULT_UPLOADER_VERSION: &str = "3.0.0";

/// Resolve dashboard and agent versions from `release.json`.
///
/// The configured path is tried first, then the conventional locations the
/// release pipeline has used over time. The first file that parses wins;
/// when none do, built-in defaults are reported so the About view never
/// breaks.
pub fn version_info(release_file: &Path) -> VersionInfo {
    for candidate in candidate_paths(release_file) {
        let Ok(contents) = std::fs::read_to_string(&candidate) else {
            continue;
        };
        let Ok(json) = serde_json::from_str::<Value>(&contents) else {
            log::warn!("invalid release manifest: {}", candidate.display());
            continue;
        };
        if let Some(info) = from_manifest(&json, &candidate) {
            return info;
        }
    }
    VersionInfo {
        webui_version: DEFAULT_WEBUI_VERSION.to_string(),
        uploader_version: DEFAULT_UPLOADER_VERSION.to_string(),
        version: DEFAULT_WEBUI_VERSION.to_string(),
        success: true,
        found_path: "None found".to_string(),
    }
}

fn candidate_paths(release_file: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![release_file.to_path_buf()];
    for fixed in ["/app/release.json", "/release.json", "/system/release.json"] {
        let fixed = PathBuf::from(fixed);
        if !candidates.contains(&fixed) {
            candidates.push(fixed);
        }
    }
    candidates
}

fn from_manifest(json: &Value, path: &Path) -> Option<VersionInfo> {
    // Current manifests carry separate webui/uploader versions; older
    // releases shipped a single "newversion" used for both.
    if let (Some(webui), Some(uploader)) = (
        json.get("webui_version").and_then(Value::as_str),
        json.get("uploader_version").and_then(Value::as_str),
    ) {
        return Some(VersionInfo {
            webui_version: webui.to_string(),
            uploader_version: uploader.to_string(),
            version: webui.to_string(),
            success: true,
            found_path: path.display().to_string(),
        });
    }
    let legacy = json.get("newversion").and_then(Value::as_str)?;
    Some(VersionInfo {
        webui_version: legacy.to_string(),
        uploader_version: legacy.to_string(),
        version: legacy.to_string(),
        success: true,
        found_path: path.display().to_string(),
    })
}
