//! Program board maintenance.
//!
//! The board is a markdown file with one `## {task_code}` section per task.
//! Updates are add-or-rewrite keyed on the `**Task Code:**` marker.

use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::domain::errors::DomainResult;

pub struct BoardWriter {
    board_file: PathBuf,
    write_lock: Mutex<()>,
}

impl BoardWriter {
    pub fn new(board_file: impl Into<PathBuf>) -> Self {
        Self { board_file: board_file.into(), write_lock: Mutex::new(()) }
    }

    /// Add a task section or update its status line. `artifacts` lands on
    /// its own line when present.
    pub async fn set_status(
        &self,
        task_code: &str,
        status: &str,
        artifacts: Option<&str>,
    ) -> DomainResult<()> {
        let _guard = self.write_lock.lock().await;

        let content = match tokio::fs::read_to_string(&self.board_file).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = self.board_file.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                "# Program Board\n".to_string()
            }
            Err(e) => return Err(e.into()),
        };

        let marker = format!("**Task Code:** {task_code}");
        let updated = if content.contains(&marker) {
            rewrite_status(&content, &marker, status, artifacts)
        } else {
            let mut out = content;
            out.push_str(&format!("\n\n## {task_code}\n\n{marker}\n**Status:** {status}\n"));
            if let Some(artifacts) = artifacts {
                out.push_str(&format!("**Artifacts:** {artifacts}\n"));
            }
            out
        };

        tokio::fs::write(&self.board_file, updated).await?;
        Ok(())
    }

    pub async fn read(&self) -> DomainResult<String> {
        match tokio::fs::read_to_string(&self.board_file).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }
}

fn rewrite_status(content: &str, marker: &str, status: &str, artifacts: Option<&str>) -> String {
    let mut out: Vec<String> = Vec::new();
    let lines: Vec<&str> = content.lines().collect();
    let mut in_section = false;
    let mut status_written = false;

    for line in &lines {
        if line.contains(marker) {
            in_section = true;
            status_written = false;
            out.push((*line).to_string());
            continue;
        }
        if in_section {
            if line.trim_start().starts_with("**Status:**") {
                out.push(format!("**Status:** {status}"));
                status_written = true;
                if let Some(artifacts) = artifacts {
                    out.push(format!("**Artifacts:** {artifacts}"));
                }
                continue;
            }
            if line.trim_start().starts_with("**Artifacts:**") && status_written {
                // replaced above together with the status line
                continue;
            }
            if line.starts_with("## ") {
                in_section = false;
            }
        }
        out.push((*line).to_string());
    }

    let mut joined = out.join("\n");
    if content.ends_with('\n') {
        joined.push('\n');
    }
    joined
}
