//! Append-only JSONL audit trail of tool calls.
//!
//! One file per day under the audit directory. Parameter summaries are
//! redacted: credential-ish keys are masked outright, content-ish keys are
//! truncated and marked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::domain::errors::DomainResult;

const SENSITIVE_KEY_FIELDS: [&str; 7] =
    ["auth", "token", "secret", "password", "key", "credential", "api_key"];
const SENSITIVE_CONTENT_FIELDS: [&str; 6] = ["text", "payload", "message", "content", "body", "data"];
const PARAMS_SUMMARY_MAX: usize = 200;
const CONTENT_PREVIEW_MAX: usize = 50;

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    pub client_hash: String,
    pub scope: String,
    pub trace_id: String,
    pub result: bool,
    pub reason_code: u8,
    pub latency_ms: u64,
    pub params_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct AuditLogger {
    audit_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLogger {
    pub fn new(audit_dir: impl Into<PathBuf>) -> Self {
        Self { audit_dir: audit_dir.into(), write_lock: Mutex::new(()) }
    }

    /// Hash identifying the caller: 32 hex chars of `caller:user_agent`.
    pub fn client_hash(caller: &str, user_agent: Option<&str>) -> String {
        let input = format!("{caller}:{}", user_agent.unwrap_or("unknown"));
        hex::encode(Sha256::digest(input.as_bytes()))[..32].to_string()
    }

    fn log_path(&self) -> PathBuf {
        self.audit_dir
            .join(format!("{}.jsonl", Utc::now().format("%Y-%m-%d")))
    }

    /// Append one tool-call record.
    #[allow(clippy::too_many_arguments)]
    pub async fn log_tool_call(
        &self,
        tool: &str,
        caller: &str,
        user_agent: Option<&str>,
        trace_id: Option<&str>,
        scope: &str,
        params: &Value,
        success: bool,
        latency_ms: u64,
        error: Option<&str>,
    ) -> DomainResult<()> {
        let record = AuditRecord {
            timestamp: Utc::now(),
            tool: tool.to_string(),
            client_hash: Self::client_hash(caller, user_agent),
            scope: scope.to_string(),
            trace_id: trace_id.unwrap_or("unknown").to_string(),
            result: success,
            reason_code: u8::from(!success),
            latency_ms,
            params_summary: params_summary(params),
            error: error.map(String::from),
        };

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.audit_dir).await?;
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

/// Redact then truncate a parameter map for the audit line.
pub fn params_summary(params: &Value) -> String {
    let sanitized = sanitize(params);
    let mut summary = sanitized.to_string();
    if summary.len() > PARAMS_SUMMARY_MAX {
        let cut = summary
            .char_indices()
            .take_while(|(i, _)| *i < PARAMS_SUMMARY_MAX)
            .map(|(i, c)| i + c.len_utf8())
            .last()
            .unwrap_or(0);
        summary.truncate(cut);
        summary.push_str("...");
    }
    summary
}

fn sanitize(params: &Value) -> Value {
    let Some(map) = params.as_object() else {
        return params.clone();
    };
    let mut out = serde_json::Map::new();
    for (key, value) in map {
        let lower = key.to_lowercase();
        if SENSITIVE_KEY_FIELDS.iter().any(|s| lower.contains(s)) {
            out.insert(key.clone(), Value::String("******".to_string()));
        } else if SENSITIVE_CONTENT_FIELDS.iter().any(|s| lower.contains(s)) {
            out.insert(key.clone(), redact_content(value));
        } else {
            out.insert(key.clone(), value.clone());
        }
    }
    Value::Object(out)
}

fn redact_content(value: &Value) -> Value {
    match value {
        Value::String(s) if s.chars().count() > CONTENT_PREVIEW_MAX => {
            let preview: String = s.chars().take(CONTENT_PREVIEW_MAX).collect();
            Value::String(format!("{preview}...[REDACTED]"))
        }
        Value::String(_) => Value::String("[REDACTED]".to_string()),
        Value::Object(_) => Value::String("[REDACTED_DICT]".to_string()),
        _ => Value::String("[REDACTED]".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_credential_keys_masked() {
        let params = serde_json::json!({
            "api_key": "sk-123",
            "auth_header": "Bearer x",
            "user_token": "t",
            "plain": "visible",
        });
        let sanitized = sanitize(&params);
        assert_eq!(sanitized["api_key"], "******");
        assert_eq!(sanitized["auth_header"], "******");
        assert_eq!(sanitized["user_token"], "******");
        assert_eq!(sanitized["plain"], "visible");
    }

    #[test]
    fn test_content_keys_redacted() {
        let long = "x".repeat(80);
        let params = serde_json::json!({
            "message": long,
            "text": "short",
            "payload": {"inner": true},
        });
        let sanitized = sanitize(&params);
        let msg = sanitized["message"].as_str().unwrap();
        assert!(msg.ends_with("...[REDACTED]"));
        assert!(msg.len() < 80);
        assert_eq!(sanitized["text"], "[REDACTED]");
        assert_eq!(sanitized["payload"], "[REDACTED_DICT]");
    }

    #[test]
    fn test_summary_truncated() {
        let params = serde_json::json!({"field": "v".repeat(400)});
        let summary = params_summary(&params);
        assert!(summary.len() <= PARAMS_SUMMARY_MAX + 3);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn test_client_hash_stable() {
        let a = AuditLogger::client_hash("caller", Some("agent"));
        let b = AuditLogger::client_hash("caller", Some("agent"));
        let c = AuditLogger::client_hash("caller", Some("other"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[tokio::test]
    async fn test_log_appends_jsonl_per_day() {
        let dir = TempDir::new().unwrap();
        let logger = AuditLogger::new(dir.path().join("audit"));

        logger
            .log_tool_call(
                "echo",
                "tester",
                None,
                Some("trace-1"),
                "default",
                &serde_json::json!({"message": "hi"}),
                true,
                3,
                None,
            )
            .await
            .unwrap();
        logger
            .log_tool_call(
                "ata_send",
                "tester",
                None,
                None,
                "default",
                &serde_json::json!({}),
                false,
                1,
                Some("ADMIN_REQUIRED: ata_send requires ATA admin privileges (fail-closed)"),
            )
            .await
            .unwrap();

        let file = dir
            .path()
            .join("audit")
            .join(format!("{}.jsonl", Utc::now().format("%Y-%m-%d")));
        let content = std::fs::read_to_string(file).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.tool, "echo");
        assert_eq!(first.reason_code, 0);
        assert!(first.params_summary.contains("[REDACTED]"));

        let second: AuditRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.reason_code, 1);
        assert!(second.error.unwrap().starts_with("ADMIN_REQUIRED"));
    }
}
