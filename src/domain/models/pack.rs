//! Canonical result pack validation.
//!
//! A worker submits its result as an ordered, sha-annotated bundle. The
//! required keys must appear first and in exactly this order; values are
//! shape-checked with exact rejection codes.

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

/// Required keys of a canonical pack, in contract order.
pub const CANONICAL_KEYS: [&str; 8] = [
    "task_code",
    "trace_id",
    "status",
    "submit_path",
    "ata_path",
    "evidence_paths",
    "sha256_map",
    "ruleset_sha256",
];

static PACK_TASK_CODE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    // versioned form plus the legacy {AREA}__{YYYYMMDD} form
    Regex::new(r"^[A-Z0-9-]+(-v\d+(\.\d+)*)?__\d{8}$").expect("valid regex")
});

static SHA256_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-f]{64}$").expect("valid regex"));

/// Rejection reason for an invalid pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackReason {
    MissingRequiredField,
    InvalidFieldOrder,
    InvalidUuid,
    InvalidStatus,
    InvalidSha256,
    InvalidTaskCode,
    InvalidShape,
}

impl PackReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            Self::InvalidFieldOrder => "INVALID_FIELD_ORDER",
            Self::InvalidUuid => "INVALID_UUID",
            Self::InvalidStatus => "INVALID_STATUS",
            Self::InvalidSha256 => "INVALID_SHA256",
            Self::InvalidTaskCode => "INVALID_TASK_CODE",
            Self::InvalidShape => "INVALID_SHAPE",
        }
    }
}

/// Outcome of validating a canonical pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackVerdict {
    pub valid: bool,
    pub reason_code: Option<&'static str>,
    pub message: String,
}

impl PackVerdict {
    fn ok() -> Self {
        Self { valid: true, reason_code: None, message: "canonical pack valid".to_string() }
    }

    fn reject(reason: PackReason, message: impl Into<String>) -> Self {
        Self { valid: false, reason_code: Some(reason.code()), message: message.into() }
    }
}

/// Validate a canonical pack.
///
/// Key iteration relies on `serde_json`'s `preserve_order` feature: the map
/// yields keys in insertion order, which is what the field-order rule is
/// about.
pub fn validate_canonical_pack(pack: &serde_json::Value) -> PackVerdict {
    let Some(map) = pack.as_object() else {
        return PackVerdict::reject(PackReason::InvalidShape, "pack must be a JSON object");
    };

    // presence first: a missing key is reported as missing, not out-of-order
    for key in CANONICAL_KEYS {
        if !map.contains_key(key) {
            return PackVerdict::reject(
                PackReason::MissingRequiredField,
                format!("missing required field: {key}"),
            );
        }
    }

    // the first eight keys must match the canonical order exactly
    for (got, want) in map.keys().zip(CANONICAL_KEYS.iter()) {
        if got != want {
            return PackVerdict::reject(
                PackReason::InvalidFieldOrder,
                format!("expected field '{want}' but found '{got}'"),
            );
        }
    }

    let task_code = map.get("task_code").and_then(serde_json::Value::as_str).unwrap_or_default();
    if !PACK_TASK_CODE_PATTERN.is_match(task_code) {
        return PackVerdict::reject(
            PackReason::InvalidTaskCode,
            format!("task_code does not match the canonical pattern: {task_code}"),
        );
    }

    let trace_id = map.get("trace_id").and_then(serde_json::Value::as_str).unwrap_or_default();
    if Uuid::parse_str(trace_id).is_err() {
        return PackVerdict::reject(PackReason::InvalidUuid, format!("trace_id is not a UUID: {trace_id}"));
    }

    let status = map.get("status").and_then(serde_json::Value::as_str).unwrap_or_default();
    if status != "PASS" && status != "FAIL" {
        return PackVerdict::reject(
            PackReason::InvalidStatus,
            format!("status must be PASS or FAIL, got: {status}"),
        );
    }

    let Some(sha_map) = map.get("sha256_map").and_then(serde_json::Value::as_object) else {
        return PackVerdict::reject(PackReason::InvalidShape, "sha256_map must be an object");
    };
    for (path, digest) in sha_map {
        let Some(digest) = digest.as_str() else {
            return PackVerdict::reject(
                PackReason::InvalidSha256,
                format!("sha256_map[{path}] is not a string"),
            );
        };
        if !SHA256_PATTERN.is_match(digest) {
            return PackVerdict::reject(
                PackReason::InvalidSha256,
                format!("sha256_map[{path}] is not 64 lowercase hex digits"),
            );
        }
    }

    let ruleset = map.get("ruleset_sha256").and_then(serde_json::Value::as_str).unwrap_or_default();
    if !SHA256_PATTERN.is_match(ruleset) {
        return PackVerdict::reject(
            PackReason::InvalidSha256,
            "ruleset_sha256 is not 64 lowercase hex digits",
        );
    }

    PackVerdict::ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX64: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn valid_pack() -> serde_json::Value {
        serde_json::json!({
            "task_code": "A2A-RESULT-CANONICAL-PACK-v0.1__20260116",
            "trace_id": Uuid::new_v4().to_string(),
            "status": "PASS",
            "submit_path": "artifacts/TASK-v0.1__20260116/SUBMIT.txt",
            "ata_path": "artifacts/TASK-v0.1__20260116/ata",
            "evidence_paths": ["artifacts/TASK-v0.1__20260116/log.txt"],
            "sha256_map": {"artifacts/TASK-v0.1__20260116/SUBMIT.txt": HEX64},
            "ruleset_sha256": HEX64,
        })
    }

    #[test]
    fn test_valid_pack_accepted() {
        let verdict = validate_canonical_pack(&valid_pack());
        assert!(verdict.valid, "{}", verdict.message);
    }

    #[test]
    fn test_missing_required_field() {
        let mut pack = valid_pack();
        pack.as_object_mut().unwrap().remove("ruleset_sha256");
        let verdict = validate_canonical_pack(&pack);
        assert!(!verdict.valid);
        assert_eq!(verdict.reason_code, Some("MISSING_REQUIRED_FIELD"));
    }

    #[test]
    fn test_invalid_field_order() {
        // status first: every key present, order broken
        let template = valid_pack();
        let obj = template.as_object().unwrap();
        let mut reordered = serde_json::Map::new();
        reordered.insert("status".to_string(), obj["status"].clone());
        for (k, v) in obj {
            if k != "status" {
                reordered.insert(k.clone(), v.clone());
            }
        }
        let verdict = validate_canonical_pack(&serde_json::Value::Object(reordered));
        assert!(!verdict.valid);
        assert_eq!(verdict.reason_code, Some("INVALID_FIELD_ORDER"));
    }

    #[test]
    fn test_invalid_uuid() {
        let mut pack = valid_pack();
        pack["trace_id"] = serde_json::json!("invalid-uuid");
        let verdict = validate_canonical_pack(&pack);
        assert_eq!(verdict.reason_code, Some("INVALID_UUID"));
    }

    #[test]
    fn test_invalid_status() {
        let mut pack = valid_pack();
        pack["status"] = serde_json::json!("INVALID_STATUS");
        let verdict = validate_canonical_pack(&pack);
        assert_eq!(verdict.reason_code, Some("INVALID_STATUS"));
    }

    #[test]
    fn test_invalid_sha256_in_map() {
        let mut pack = valid_pack();
        pack["sha256_map"]["artifacts/TASK-v0.1__20260116/SUBMIT.txt"] =
            serde_json::json!("invalid-sha256");
        let verdict = validate_canonical_pack(&pack);
        assert_eq!(verdict.reason_code, Some("INVALID_SHA256"));
    }

    #[test]
    fn test_uppercase_sha_rejected() {
        let mut pack = valid_pack();
        pack["ruleset_sha256"] = serde_json::json!(HEX64.to_uppercase());
        let verdict = validate_canonical_pack(&pack);
        assert_eq!(verdict.reason_code, Some("INVALID_SHA256"));
    }

    #[test]
    fn test_trailing_extra_keys_tolerated() {
        let mut pack = valid_pack();
        pack.as_object_mut()
            .unwrap()
            .insert("extra".to_string(), serde_json::json!(true));
        let verdict = validate_canonical_pack(&pack);
        assert!(verdict.valid, "{}", verdict.message);
    }

    #[test]
    fn test_legacy_task_code_accepted() {
        let mut pack = valid_pack();
        pack["task_code"] = serde_json::json!("INTEGRATION-MVP__20260124");
        let verdict = validate_canonical_pack(&pack);
        assert!(verdict.valid, "{}", verdict.message);
    }
}
