//! CI verdict artifacts.
//!
//! Verdicts arrive as loosely-schemaed JSON; status strings are normalized
//! at this boundary and fail codes are either taken verbatim from
//! `fail_codes` or derived from non-passing `checks[]` entries.

use serde::{Deserialize, Serialize};

/// Normalized verdict status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Pass,
    Fail,
    Unknown,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Unknown => "unknown",
        }
    }

    /// Normalize the raw status string; unknown values fall back to
    /// the lowercased input handled as `Unknown`.
    pub fn normalize(raw: Option<&str>) -> Self {
        let Some(raw) = raw else { return Self::Unknown };
        match raw.trim().to_lowercase().as_str() {
            "pass" | "passed" | "ok" | "success" => Self::Pass,
            "fail" | "failed" | "error" => Self::Fail,
            _ => Self::Unknown,
        }
    }
}

/// A parsed verdict document.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub status: VerdictStatus,
    pub fail_codes: Vec<String>,
    pub task_code: Option<String>,
    /// The original document, carried verbatim into events.
    pub raw: serde_json::Value,
}

impl Verdict {
    /// Parse a verdict JSON document.
    pub fn from_json(raw: serde_json::Value) -> Self {
        let status = raw
            .get("status_normalized")
            .and_then(serde_json::Value::as_str)
            .map_or_else(
                || VerdictStatus::normalize(raw.get("status").and_then(serde_json::Value::as_str)),
                |s| VerdictStatus::normalize(Some(s)),
            );
        let fail_codes = extract_fail_codes(&raw);
        let task_code = raw
            .get("task_code")
            .or_else(|| raw.get("TaskCode"))
            .and_then(serde_json::Value::as_str)
            .map(String::from);
        Self { status, fail_codes, task_code, raw }
    }
}

/// Prefer a top-level `fail_codes` string list; otherwise derive from
/// `checks[]` entries whose status is not PASS, uppercasing the name and
/// mapping `-`/space to `_`. Deduplicates preserving order.
fn extract_fail_codes(raw: &serde_json::Value) -> Vec<String> {
    if let Some(codes) = raw.get("fail_codes").and_then(serde_json::Value::as_array) {
        if codes.iter().all(serde_json::Value::is_string) {
            return codes
                .iter()
                .filter_map(serde_json::Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    }

    let mut derived = Vec::new();
    if let Some(checks) = raw.get("checks").and_then(serde_json::Value::as_array) {
        for check in checks {
            let Some(obj) = check.as_object() else { continue };
            if obj.get("status").and_then(serde_json::Value::as_str) == Some("PASS") {
                continue;
            }
            if let Some(name) = obj.get("name").and_then(serde_json::Value::as_str) {
                if !name.is_empty() {
                    let code = name.to_uppercase().replace(['-', ' '], "_");
                    if !derived.contains(&code) {
                        derived.push(code);
                    }
                }
            }
        }
    }
    derived
}

/// Fixed repair-subtask description per fail code.
pub fn repair_description(fail_code: &str) -> String {
    match fail_code {
        "SELFTEST_USER_SUPPLIED" => {
            "修复：移除用户提供的 selftest.log，仅使用 CI 生成的 ci_selftest_proof.json".to_string()
        }
        "EVIDENCE_SCOPE_VIOLATION" => {
            "修复：确保所有 evidence_paths 都在 artifacts 目录下".to_string()
        }
        "STAGE_MISSING" => "修复：补充缺失的阶段文件".to_string(),
        "STAGE_VALIDATION_FAILED" => "修复：修正阶段文件验证错误".to_string(),
        "ABSOLUTE_PATH_IN_EVIDENCE" => "修复：将所有绝对路径改为相对路径".to_string(),
        other => format!("修复 CI 门禁失败：{other}"),
    }
}
