use std::{collections::BTreeMap, fs, path::PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

use crate::error::AppError;

/// The agent's flat `KEY=VALUE` settings file.
///
/// The agent re-reads this file every cycle, so edits must leave every line
/// it does not own byte-for-byte intact: comments, blank separator lines and
/// unknown keys all carry meaning to the operator.
pub struct EnvFile {
    path: PathBuf,
}

impl EnvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Current settings keyed by lowercased key name, quotes stripped.
    pub fn load_settings(&self) -> Result<BTreeMap<String, String>> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read env file: {}", self.path.display()))?;
        let mut settings = BTreeMap::new();
        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some((key, value)) = trimmed.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            settings.insert(key.to_lowercase(), unquote(value.trim()).to_string());
        }
        Ok(settings)
    }

    /// Apply a map of updates from the settings form.
    ///
    /// Existing keys are rewritten in place (matched case-insensitively,
    /// keeping the spelling already in the file); new keys are inserted just
    /// before the trailer comment line, or appended when there is none.
    pub fn apply_updates(&self, updates: &serde_json::Map<String, Value>) -> Result<()> {
        if !self.path.exists() {
            return Err(AppError::EnvFileNotFound(self.path.display().to_string()).into());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read env file: {}", self.path.display()))?;
        let had_trailing_newline = contents.ends_with('\n');
        let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();

        let mut pending: Vec<(String, String)> = updates
            .iter()
            .filter_map(|(key, value)| {
                let key = sanitize_key(key);
                if key.is_empty() {
                    None
                } else {
                    Some((key, format_value(value)))
                }
            })
            .collect();

        let mut updated = false;
        for line in lines.iter_mut() {
            if let Some(idx) = pending.iter().position(|(key, _)| line_sets_key(line, key)) {
                let (key, value) = pending.remove(idx);
                // Keep whatever case the file already uses for the key.
                line.replace_range(key.len() + 1.., &value);
                updated = true;
            }
        }

        if !pending.is_empty() {
            let mut insert_at = lines
                .iter()
                .position(|line| is_trailer_line(line))
                .unwrap_or(lines.len());
            for (key, value) in pending {
                lines.insert(insert_at, format!("{key}={value}"));
                insert_at += 1;
                updated = true;
            }
        }

        if !updated {
            return Err(AppError::NoSettingsUpdated.into());
        }

        let mut output = lines.join("\n");
        if had_trailing_newline {
            output.push('\n');
        }
        fs::write(&self.path, output)
            .with_context(|| format!("write env file: {}", self.path.display()))?;
        Ok(())
    }
}

/// Keys are written uppercase and restricted to `[A-Za-z0-9_]`.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_uppercase()
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::String(s) if s.contains(' ') => format!("\"{s}\""),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn line_sets_key(line: &str, key: &str) -> bool {
    line.len() > key.len()
        && line.as_bytes()[key.len()] == b'='
        && line[..key.len()].eq_ignore_ascii_case(key)
}

/// The env file ends with a dashed comment row; new keys go above it.
fn is_trailer_line(line: &str) -> bool {
    let trimmed = line.trim_end();
    trimmed.starts_with("#---") && trimmed[1..].bytes().all(|b| b == b'-')
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    const SAMPLE: &str = "\
# Transfer section
BANDWIDTH_LIMIT=30M
TRANSFERS=2
Log_Level=INFO
NOTIFICATION_SERVERNAME=\"My Server\"

#-------------------------------------------------------
# Do not edit below this line
";

    fn temp_env(contents: &str) -> EnvFile {
        let path = std::env::temp_dir().join(format!("uploader-env-{}.env", Uuid::new_v4()));
        fs::write(&path, contents).expect("write temp env");
        EnvFile::new(path)
    }

    fn updates(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().expect("object").clone()
    }

    #[test]
    fn load_lowercases_keys_and_strips_quotes() {
        let env = temp_env(SAMPLE);
        let settings = env.load_settings().expect("load");
        assert_eq!(settings.get("bandwidth_limit").map(String::as_str), Some("30M"));
        assert_eq!(settings.get("transfers").map(String::as_str), Some("2"));
        assert_eq!(settings.get("log_level").map(String::as_str), Some("INFO"));
        assert_eq!(
            settings.get("notification_servername").map(String::as_str),
            Some("My Server")
        );
        let _ = fs::remove_file(&env.path);
    }

    #[test]
    fn updates_existing_keys_in_place() {
        let env = temp_env(SAMPLE);
        env.apply_updates(&updates(json!({"bandwidth_limit": "50M", "transfers": 4})))
            .expect("apply");

        let contents = fs::read_to_string(&env.path).expect("read back");
        assert!(contents.contains("BANDWIDTH_LIMIT=50M"));
        assert!(contents.contains("TRANSFERS=4"));
        // Untouched lines survive verbatim, including comments.
        assert!(contents.starts_with("# Transfer section\n"));
        assert!(contents.contains("# Do not edit below this line"));
        let _ = fs::remove_file(&env.path);
    }

    #[test]
    fn match_is_case_insensitive_and_preserves_file_spelling() {
        let env = temp_env(SAMPLE);
        env.apply_updates(&updates(json!({"LOG_LEVEL": "DEBUG"})))
            .expect("apply");
        let contents = fs::read_to_string(&env.path).expect("read back");
        assert!(contents.contains("Log_Level=DEBUG"));
        let _ = fs::remove_file(&env.path);
    }

    #[test]
    fn values_with_spaces_are_quoted() {
        let env = temp_env(SAMPLE);
        env.apply_updates(&updates(json!({"notification_servername": "Rack 4 Node"})))
            .expect("apply");
        let contents = fs::read_to_string(&env.path).expect("read back");
        assert!(contents.contains("NOTIFICATION_SERVERNAME=\"Rack 4 Node\""));
        let _ = fs::remove_file(&env.path);
    }

    #[test]
    fn bools_and_null_are_written_as_text() {
        let env = temp_env(SAMPLE);
        env.apply_updates(&updates(json!({
            "vfs_refresh_enable": true,
            "autoscan_user": null
        })))
        .expect("apply");
        let contents = fs::read_to_string(&env.path).expect("read back");
        assert!(contents.contains("VFS_REFRESH_ENABLE=true"));
        assert!(contents.contains("AUTOSCAN_USER=null"));
        let _ = fs::remove_file(&env.path);
    }

    #[test]
    fn new_keys_are_inserted_before_trailer() {
        let env = temp_env(SAMPLE);
        env.apply_updates(&updates(json!({"folder_depth": 3})))
            .expect("apply");
        let contents = fs::read_to_string(&env.path).expect("read back");
        let folder_pos = contents.find("FOLDER_DEPTH=3").expect("inserted");
        let trailer_pos = contents.find("#---").expect("trailer kept");
        assert!(folder_pos < trailer_pos);
        let _ = fs::remove_file(&env.path);
    }

    #[test]
    fn new_keys_append_when_no_trailer_exists() {
        let env = temp_env("TRANSFERS=2\n");
        env.apply_updates(&updates(json!({"min_age_upload": 15})))
            .expect("apply");
        let contents = fs::read_to_string(&env.path).expect("read back");
        assert_eq!(contents, "TRANSFERS=2\nMIN_AGE_UPLOAD=15\n");
        let _ = fs::remove_file(&env.path);
    }

    #[test]
    fn key_sanitization_drops_dangerous_characters() {
        let env = temp_env(SAMPLE);
        env.apply_updates(&updates(json!({"transfers; rm -rf /": 8})))
            .expect("apply");
        let contents = fs::read_to_string(&env.path).expect("read back");
        // "; rm -rf /" collapses away, leaving a match on TRANSFERSRMRF..
        // as a new key rather than clobbering anything.
        assert!(contents.contains("TRANSFERS=2"));
        assert!(contents.contains("TRANSFERSRMRF=8"));
        let _ = fs::remove_file(&env.path);
    }

    #[test]
    fn empty_update_reports_nothing_updated() {
        let env = temp_env(SAMPLE);
        let err = env
            .apply_updates(&updates(json!({})))
            .expect_err("nothing to update");
        assert!(err.to_string().contains("no settings were updated"));
        let _ = fs::remove_file(&env.path);
    }

    #[test]
    fn missing_file_is_reported() {
        let env = EnvFile::new(
            std::env::temp_dir().join(format!("uploader-env-{}.env", Uuid::new_v4())),
        );
        let err = env
            .apply_updates(&updates(json!({"transfers": 1})))
            .expect_err("file is missing");
        assert!(err.to_string().contains("settings file not found"));
    }
}
