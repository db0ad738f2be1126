//! Pipeline configuration helpers.
//!
//! This module loads, validates, and normalizes `caseforge.json` so every
//! stage runs from the same explicit settings.
use super::{
    Difficulty, PipelineConfig, TargetKind, CONFIG_FILE_NAME, CONFIG_SCHEMA_VERSION,
    LM_COMMAND_ENV, UNKNOWN_DIFFICULTY,
};
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Build the default config used when a pipeline root is first initialized.
pub fn default_config() -> PipelineConfig {
    PipelineConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        docs_dir: "system_documentation".to_string(),
        store_dir: "testcases".to_string(),
        lm_command: None,
        kinds: TargetKind::ALL.to_vec(),
        cases_per_difficulty: 1,
        max_cases_per_difficulty: None,
        context_limit: None,
        top_difficulty_label: "Extra Hard".to_string(),
        include_get_operations: false,
        base_urls: BTreeMap::new(),
        http_timeout_secs: 30,
        annotate_sql_failures: true,
    }
}

/// Load the config from `<root>/caseforge.json`.
pub fn load_config(root: &Path) -> Result<PipelineConfig> {
    let path = root.join(CONFIG_FILE_NAME);
    let bytes = fs::read(&path).with_context(|| {
        format!(
            "read config {} (run `caseforge init` first)",
            path.display()
        )
    })?;
    let config: PipelineConfig =
        serde_json::from_slice(&bytes).context("parse caseforge config JSON")?;
    Ok(config)
}

/// Persist a config to disk in a stable JSON format.
pub fn write_config(root: &Path, config: &PipelineConfig) -> Result<()> {
    fs::create_dir_all(root).with_context(|| format!("create {}", root.display()))?;
    let path = root.join(CONFIG_FILE_NAME);
    let text = serde_json::to_string_pretty(config).context("serialize caseforge config")?;
    fs::write(&path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Validate config schema and user-provided settings.
pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported caseforge config schema_version {}",
            config.schema_version
        ));
    }
    if config.kinds.is_empty() {
        return Err(anyhow!("kinds must name at least one target kind"));
    }
    if config.cases_per_difficulty == 0 {
        return Err(anyhow!("cases_per_difficulty must be at least 1"));
    }
    if config.context_limit == Some(0) {
        return Err(anyhow!("context_limit must be at least 1 when set"));
    }
    let top = config.top_difficulty_label.trim();
    if top.is_empty() {
        return Err(anyhow!("top_difficulty_label must be non-empty"));
    }
    let collides = [
        Difficulty::Easy,
        Difficulty::Medium,
        Difficulty::Hard,
    ]
    .iter()
    .any(|level| level.label(top).eq_ignore_ascii_case(top))
        || top.eq_ignore_ascii_case(UNKNOWN_DIFFICULTY);
    if collides {
        return Err(anyhow!(
            "top_difficulty_label {top:?} collides with another difficulty"
        ));
    }
    validate_relative_path(&config.docs_dir, "docs_dir")?;
    validate_relative_path(&config.store_dir, "store_dir")?;
    for (domain, url) in &config.base_urls {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow!(
                "base_urls.{domain} must be an http(s) URL (got {url:?})"
            ));
        }
    }
    Ok(())
}

/// Resolve the oracle command: CLI flag, then config, then environment.
pub fn resolve_lm_command(cli_flag: Option<&str>, config: &PipelineConfig) -> Option<String> {
    if let Some(cmd) = cli_flag.map(str::trim).filter(|cmd| !cmd.is_empty()) {
        return Some(cmd.to_string());
    }
    if let Some(cmd) = config
        .lm_command
        .as_deref()
        .map(str::trim)
        .filter(|cmd| !cmd.is_empty())
    {
        return Some(cmd.to_string());
    }
    std::env::var(LM_COMMAND_ENV)
        .ok()
        .map(|cmd| cmd.trim().to_string())
        .filter(|cmd| !cmd.is_empty())
}

fn validate_relative_path(rel: &str, label: &str) -> Result<()> {
    let path = Path::new(rel);
    if rel.trim().is_empty() || path.is_absolute() || has_parent_components(path) {
        return Err(anyhow!(
            "{label} must be a relative path without '..' (got {rel:?})"
        ));
    }
    Ok(())
}

fn has_parent_components(path: &Path) -> bool {
    path.components()
        .any(|component| matches!(component, std::path::Component::ParentDir))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
