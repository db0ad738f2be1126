//! Append-only log of oracle calls.
//!
//! Every synthesis and naturalization round-trip is appended to
//! `<store>/oracle_log.jsonl` as one JSON line:
//!
//! ```jsonl
//! {"schema_version":1,"ts":1707900000000,"kind":"synthesis","domain":"Accounts","subject":"Transfer_POST","duration_ms":4200,"outcome":"success","cases":4}
//! {"schema_version":1,"ts":1707900060000,"kind":"naturalization","domain":"Accounts","subject":"Transfer_POST_Easy_1_...json","duration_ms":900,"outcome":"failed","error":"..."}
//! ```
//!
//! The `recovered` outcome marks generations that only parsed after the
//! bracket-substring fallback, so degraded parses stay countable.

use super::{StorePaths, ORACLE_LOG_SCHEMA_VERSION};
use crate::util::truncate_string;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::time::{Duration, Instant};

const PROMPT_PREVIEW_BYTES: usize = 500;

/// Stage that issued an oracle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleCallKind {
    Synthesis,
    Naturalization,
}

impl std::fmt::Display for OracleCallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Synthesis => write!(f, "synthesis"),
            Self::Naturalization => write!(f, "naturalization"),
        }
    }
}

/// Outcome of an oracle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleOutcome {
    /// Response used as returned.
    Success,
    /// Response only usable after best-effort extraction.
    Recovered,
    /// Transport or decode failure; nothing was written.
    Failed,
}

/// A single oracle log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleLogEntry {
    pub schema_version: u32,

    /// Unix timestamp in milliseconds when the entry was finished.
    pub ts: u64,

    pub kind: OracleCallKind,

    pub domain: String,

    /// Cell group for synthesis, artifact file name for naturalization.
    pub subject: String,

    pub duration_ms: u64,

    pub outcome: OracleOutcome,

    /// Number of cases the response yielded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cases: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// First ~500 bytes of the user content, for quick inspection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_preview: Option<String>,
}

/// Builder for constructing oracle log entries with timing.
pub struct OracleLogBuilder {
    start: Instant,
    kind: OracleCallKind,
    domain: String,
    subject: String,
    prompt_preview: Option<String>,
}

impl OracleLogBuilder {
    /// Start timing a new entry.
    pub fn new(kind: OracleCallKind, domain: &str, subject: &str) -> Self {
        Self {
            start: Instant::now(),
            kind,
            domain: domain.to_string(),
            subject: subject.to_string(),
            prompt_preview: None,
        }
    }

    pub fn with_prompt_preview(mut self, prompt: &str) -> Self {
        let mut preview = truncate_string(prompt, PROMPT_PREVIEW_BYTES);
        if preview.len() < prompt.len() {
            preview.push_str("...");
        }
        self.prompt_preview = Some(preview);
        self
    }

    pub fn success(self, cases: Option<usize>) -> OracleLogEntry {
        self.build(OracleOutcome::Success, cases, None)
    }

    pub fn recovered(self, cases: usize) -> OracleLogEntry {
        self.build(OracleOutcome::Recovered, Some(cases), None)
    }

    pub fn failed(self, error: impl Into<String>) -> OracleLogEntry {
        self.build(OracleOutcome::Failed, None, Some(error.into()))
    }

    fn build(
        self,
        outcome: OracleOutcome,
        cases: Option<usize>,
        error: Option<String>,
    ) -> OracleLogEntry {
        OracleLogEntry {
            schema_version: ORACLE_LOG_SCHEMA_VERSION,
            ts: now_epoch_ms(),
            kind: self.kind,
            domain: self.domain,
            subject: self.subject,
            duration_ms: self.start.elapsed().as_millis() as u64,
            outcome,
            cases,
            error,
            prompt_preview: self.prompt_preview,
        }
    }
}

/// Append an entry to the oracle log.
pub fn append_oracle_log(paths: &StorePaths, entry: &OracleLogEntry) -> Result<()> {
    let log_path = paths.oracle_log_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("create store directory for oracle_log")?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("open oracle_log for append: {}", log_path.display()))?;

    let mut line = serde_json::to_string(entry).context("serialize oracle_log entry")?;
    line.push('\n');
    file.write_all(line.as_bytes())
        .context("write oracle_log entry")?;
    Ok(())
}

/// Load all oracle log entries; corrupt lines are skipped with a warning.
pub fn load_oracle_log(paths: &StorePaths) -> Result<Vec<OracleLogEntry>> {
    let log_path = paths.oracle_log_path();
    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(&log_path)
        .with_context(|| format!("open oracle_log: {}", log_path.display()))?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read line {} of oracle_log", line_num + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<OracleLogEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                tracing::warn!(line = line_num + 1, %err, "skip corrupt oracle_log entry");
            }
        }
    }

    Ok(entries)
}

fn now_epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}
