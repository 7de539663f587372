//! Canonical task identifiers.
//!
//! A `TaskId` is `{AREA}-{YYYYMMDD}-{SEQ:03d}`; a `TaskCode` is the legacy
//! free-form identifier (typically `{AREA}__{YYYYMMDD}`) that maps 1:1 onto
//! a `TaskId`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

static TASK_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_-]+)-([0-9]{8})-([0-9]{3,})$").expect("valid regex"));

static AREA_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"));

static DATE_RUN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]{8})").expect("valid regex"));

/// Parsed components of a canonical task id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskIdParts {
    pub area: String,
    pub date: String,
    pub seq: u32,
}

/// Canonical task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Check the area charset without building an id.
    pub fn validate_area(area: &str) -> DomainResult<()> {
        if AREA_PATTERN.is_match(area) {
            Ok(())
        } else {
            Err(DomainError::InvalidArea(area.to_string()))
        }
    }

    /// Build a task id from validated components.
    pub fn from_parts(area: &str, date: &str, seq: u32) -> DomainResult<Self> {
        if !AREA_PATTERN.is_match(area) {
            return Err(DomainError::InvalidArea(area.to_string()));
        }
        if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::ValidationFailed(format!(
                "date must be YYYYMMDD, got: {date}"
            )));
        }
        Ok(Self(format!("{area}-{date}-{seq:03}")))
    }

    /// Parse a string that must already be in canonical form.
    pub fn parse(s: &str) -> Option<Self> {
        if TASK_ID_PATTERN.is_match(s) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    /// Whether a string is a valid canonical task id.
    pub fn is_valid(s: &str) -> bool {
        TASK_ID_PATTERN.is_match(s)
    }

    /// Decompose into area/date/seq. Always succeeds for a constructed id.
    pub fn parts(&self) -> Option<TaskIdParts> {
        let caps = TASK_ID_PATTERN.captures(&self.0)?;
        Some(TaskIdParts {
            area: caps[1].to_string(),
            date: caps[2].to_string(),
            seq: caps[3].parse().ok()?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Legacy task code. Free-form; `{AREA}__{YYYYMMDD}` when well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskCode(String);

impl TaskCode {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split a `{AREA}__{YYYYMMDD}` code into its area and 8-digit date.
    /// Returns `None` when the code does not carry a usable date.
    pub fn split_area_date(&self) -> Option<(&str, &str)> {
        let (area, rest) = self.0.split_once("__")?;
        if rest.len() >= 8 && rest.as_bytes()[..8].iter().all(u8::is_ascii_digit) {
            Some((area, &rest[..8]))
        } else {
            None
        }
    }

    /// Find any 8-digit run inside the code (migration fallback).
    pub fn embedded_date(&self) -> Option<&str> {
        DATE_RUN_PATTERN
            .captures(&self.0)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

impl std::fmt::Display for TaskCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
