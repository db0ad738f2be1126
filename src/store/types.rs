//! On-disk case and configuration types.
//!
//! A case file has no explicit tag for its output shape; the shape is chosen by
//! the `KIND` directory the case lives under and fixed when the case is built.
use crate::error::CaseError;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Difficulty label used when the oracle omits or invents one.
pub const UNKNOWN_DIFFICULTY: &str = "Unknown";

/// Lifecycle position of a case. Directory residence is the state signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Raw,
    Naturalized,
    Validated,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Raw, Stage::Naturalized, Stage::Validated];

    pub fn dir_name(self) -> &'static str {
        match self {
            Stage::Raw => "raw",
            Stage::Naturalized => "naturalized",
            Stage::Validated => "validated",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Target surface a case's output is executed against.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// HTTP call against a domain service.
    Api,
    /// Single SELECT statement against the domain schema.
    Sql,
}

impl TargetKind {
    pub const ALL: [TargetKind; 2] = [TargetKind::Api, TargetKind::Sql];

    pub fn dir_name(self) -> &'static str {
        match self {
            TargetKind::Api => "API",
            TargetKind::Sql => "SQL",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Ordered difficulty ladder. The wording of `Top` comes from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Top,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Easy,
        Difficulty::Medium,
        Difficulty::Hard,
        Difficulty::Top,
    ];

    /// Render the label written into cases and prompts.
    pub fn label(self, top_label: &str) -> String {
        match self {
            Difficulty::Easy => "Easy".to_string(),
            Difficulty::Medium => "Medium".to_string(),
            Difficulty::Hard => "Hard".to_string(),
            Difficulty::Top => top_label.to_string(),
        }
    }

    /// Map a free-form label onto the ladder.
    ///
    /// Matching ignores case and treats `-`/`_` like spaces, so "extra-hard"
    /// and "Very Hard" both land on the top level.
    pub fn recognize(label: &str, top_label: &str) -> Option<Self> {
        let normalized = normalize_label(label);
        match normalized.as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            "very hard" | "extra hard" => Some(Difficulty::Top),
            other if other == normalize_label(top_label) => Some(Difficulty::Top),
            _ => None,
        }
    }
}

fn normalize_label(label: &str) -> String {
    label
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

/// Filename-safe form of a difficulty label ("Extra Hard" -> "Extra-Hard").
pub fn difficulty_slug(label: &str) -> String {
    let slug = label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        UNKNOWN_DIFFICULTY.to_string()
    } else {
        slug
    }
}

/// HTTP verbs the validator can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = CaseError;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            _ => Err(CaseError::UnsupportedMethod(raw.to_string())),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured HTTP call expected for an API case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCall {
    /// Verb as written by the oracle; parsed only when executed.
    pub method: String,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Fields the oracle added beyond the contract (e.g. `params`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// SELECT statement expected for a SQL case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlQuery {
    pub sql: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Output of a case; the variant is decided by the case's target kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CallOutput {
    Api(ApiCall),
    Sql(SqlQuery),
}

impl CallOutput {
    /// Build the output variant demanded by `kind` from raw JSON.
    pub fn from_value(kind: TargetKind, value: Value) -> Result<Self> {
        match kind {
            TargetKind::Api => serde_json::from_value(value)
                .map(CallOutput::Api)
                .context("parse API call output"),
            TargetKind::Sql => serde_json::from_value(value)
                .map(CallOutput::Sql)
                .context("parse SQL query output"),
        }
    }
}

/// Failure record attached to a case that did not pass validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorLog {
    /// The target answered with a non-success status.
    Response {
        status_code: u16,
        response_text: String,
    },
    /// The call could not be completed, or the statement did not parse.
    Exception { exception: String },
}

/// One synthesized test case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCase {
    pub difficulty: String,
    pub input: String,
    pub output: CallOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_log: Option<ErrorLog>,
    /// Unrecognized top-level fields, carried through every stage untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct CaseRecord {
    #[serde(default)]
    difficulty: Option<String>,
    input: String,
    output: Value,
    #[serde(default)]
    error_log: Option<ErrorLog>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TestCase {
    /// Decode a case whose output shape is dictated by `kind`.
    pub fn from_value(kind: TargetKind, value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(anyhow!("case is not a JSON object"));
        }
        let record: CaseRecord = serde_json::from_value(value).context("parse case fields")?;
        let output = CallOutput::from_value(kind, record.output)?;
        Ok(Self {
            difficulty: record
                .difficulty
                .unwrap_or_else(|| UNKNOWN_DIFFICULTY.to_string()),
            input: record.input,
            output,
            error_log: record.error_log,
            extra: record.extra,
        })
    }
}

/// Pipeline-owned configuration stored in `caseforge.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub schema_version: u32,
    #[serde(default = "default_docs_dir")]
    pub docs_dir: String,
    #[serde(default = "default_store_dir")]
    pub store_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lm_command: Option<String>,
    #[serde(default = "default_kinds")]
    pub kinds: Vec<TargetKind>,
    #[serde(default = "default_cases_per_difficulty")]
    pub cases_per_difficulty: usize,
    /// Stop requesting a difficulty once the RAW corpus holds this many.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cases_per_difficulty: Option<usize>,
    /// Most-recent prior cases shown to the oracle; all when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_limit: Option<usize>,
    #[serde(default = "default_top_difficulty_label")]
    pub top_difficulty_label: String,
    #[serde(default)]
    pub include_get_operations: bool,
    #[serde(default)]
    pub base_urls: BTreeMap<String, String>,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_annotate_sql_failures")]
    pub annotate_sql_failures: bool,
}

fn default_docs_dir() -> String {
    "system_documentation".to_string()
}

fn default_store_dir() -> String {
    "testcases".to_string()
}

fn default_kinds() -> Vec<TargetKind> {
    TargetKind::ALL.to_vec()
}

fn default_cases_per_difficulty() -> usize {
    1
}

fn default_top_difficulty_label() -> String {
    "Extra Hard".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_annotate_sql_failures() -> bool {
    true
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
