//! Outbox requests: the pending-approval queue for outbound agent messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::models::task::Priority;

/// Review state of an outbox request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Approved,
    Rejected,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Result of the real send performed on approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResult {
    pub msg_id: String,
    pub sha256: String,
    pub file_path: String,
}

/// A would-be message awaiting administrator review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRequest {
    pub request_id: String,
    pub status: OutboxStatus,
    pub submitted_at: DateTime<Utc>,
    pub submitted_by: String,
    pub taskcode: String,
    pub from_agent: String,
    pub to_agent: String,
    pub kind: String,
    pub payload: serde_json::Map<String, serde_json::Value>,
    pub priority: Priority,
    pub requires_response: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_hint: Option<String>,
    /// Evidence triplet: report, selftest log, artifacts dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selftest_log_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approve_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_result: Option<SendResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl OutboxRequest {
    /// Request id: `ATA-OUTBOX-{yyyymmddHHMMSS}-{10-hex}` where the suffix
    /// hashes taskcode + from + to.
    pub fn generate_request_id(
        taskcode: &str,
        from_agent: &str,
        to_agent: &str,
        now: DateTime<Utc>,
    ) -> String {
        let digest = Sha256::digest(format!("{taskcode}{from_agent}{to_agent}").as_bytes());
        format!(
            "ATA-OUTBOX-{}-{}",
            now.format("%Y%m%d%H%M%S"),
            &hex::encode(digest)[..10]
        )
    }
}

/// A path is accepted for the evidence triplet only when repo-relative:
/// non-empty, not absolute (unix or drive-letter style), no `..` segment.
pub fn is_repo_relative_path(p: Option<&str>) -> bool {
    let Some(s) = p else { return false };
    let s = s.trim();
    if s.is_empty() {
        return false;
    }
    if s.starts_with('/') || s.starts_with('\\') {
        return false;
    }
    if s.len() > 1 && s.as_bytes()[1] == b':' {
        return false;
    }
    if s.contains("..") {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_shape() {
        let id = OutboxRequest::generate_request_id("CODE", "a", "b", Utc::now());
        assert!(id.starts_with("ATA-OUTBOX-"));
        let suffix = id.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 10);
    }

    #[test]
    fn test_repo_relative_paths() {
        assert!(is_repo_relative_path(Some("docs/REPORT/ata/REPORT__X.md")));
        assert!(!is_repo_relative_path(Some("/etc/passwd")));
        assert!(!is_repo_relative_path(Some("\\share\\x")));
        assert!(!is_repo_relative_path(Some("C:\\temp\\x")));
        assert!(!is_repo_relative_path(Some("docs/../secrets")));
        assert!(!is_repo_relative_path(Some("   ")));
        assert!(!is_repo_relative_path(None));
    }
}
