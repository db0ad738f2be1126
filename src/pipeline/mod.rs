//! Staged case pipeline: synthesize, naturalize, audit, validate.
//!
//! Each stage works one (kind, domain) unit at a time and reads its input set
//! fresh from the artifact store, so any stage can be rerun after an
//! interruption. Per-case and per-cell failures are logged where they happen
//! and never abort the enclosing domain loop.
mod audit;
mod execute;
mod naturalize;
mod run;
mod status;
mod synthesize;
mod validate;

pub(crate) use audit::{audit_domain, run_audit, AuditReport};
pub(crate) use execute::{check_sql, HttpExecutor, UreqExecutor};
pub(crate) use naturalize::{naturalize_domain, run_naturalize, NaturalizeSummary};
pub(crate) use run::run_pipeline;
pub(crate) use status::run_status;
pub(crate) use synthesize::{run_synthesize, synthesize_domain, SynthesisSummary};
pub(crate) use validate::{run_validate, validate_domain, ValidationSummary};

use crate::domain::DocsRoot;
use crate::oracle::CommandOracle;
use crate::store::{self, ArtifactStore, PipelineConfig, Stage, TargetKind};
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

/// Which slice of the corpus a command works on.
#[derive(Debug, Clone, Default)]
pub(crate) struct Selection {
    pub(crate) domain: Option<String>,
    pub(crate) kind: Option<TargetKind>,
}

/// Everything a stage needs, loaded once per command.
pub(crate) struct PipelineContext {
    root: PathBuf,
    pub(crate) config: PipelineConfig,
    pub(crate) store: ArtifactStore,
    pub(crate) docs: DocsRoot,
}

impl PipelineContext {
    /// Load and validate `caseforge.json` under `root`.
    pub(crate) fn load(root: PathBuf) -> Result<Self> {
        let config = store::load_config(&root)?;
        store::validate_config(&config)?;
        Ok(Self::from_config(root, config))
    }

    pub(crate) fn from_config(root: PathBuf, config: PipelineConfig) -> Self {
        let store = ArtifactStore::new(root.join(&config.store_dir));
        let docs = DocsRoot::new(root.join(&config.docs_dir));
        Self {
            root,
            config,
            store,
            docs,
        }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    /// Configured kinds, narrowed to the selected one.
    pub(crate) fn kinds(&self, selection: &Selection) -> Vec<TargetKind> {
        self.config
            .kinds
            .iter()
            .copied()
            .filter(|kind| selection.kind.is_none_or(|wanted| wanted == *kind))
            .collect()
    }

    /// Domains with documentation, narrowed to the selected one.
    pub(crate) fn documented_domains(&self, selection: &Selection) -> Result<Vec<String>> {
        let domains = self.docs.domains()?;
        narrow(domains, selection)
    }

    /// Domains with case files in `stage`, narrowed to the selected one.
    pub(crate) fn stored_domains(
        &self,
        stage: Stage,
        kind: TargetKind,
        selection: &Selection,
    ) -> Result<Vec<String>> {
        let domains = self.store.domains(stage, kind)?;
        Ok(match selection.domain.as_deref() {
            Some(wanted) => domains.into_iter().filter(|d| d == wanted).collect(),
            None => domains,
        })
    }

    /// Build the oracle from the resolved LM command.
    pub(crate) fn oracle(&self, cli_flag: Option<&str>) -> Result<CommandOracle> {
        let command = store::resolve_lm_command(cli_flag, &self.config).ok_or_else(|| {
            anyhow!(
                "no LM command configured (pass --lm, set lm_command in {}, or set {})",
                store::CONFIG_FILE_NAME,
                store::LM_COMMAND_ENV
            )
        })?;
        CommandOracle::from_command_line(&command)
    }
}

fn narrow(domains: Vec<String>, selection: &Selection) -> Result<Vec<String>> {
    match selection.domain.as_deref() {
        Some(wanted) if domains.iter().any(|d| d == wanted) => Ok(vec![wanted.to_string()]),
        Some(wanted) => Err(anyhow!("no documentation for domain {wanted:?}")),
        None => Ok(domains),
    }
}

#[cfg(test)]
pub(crate) mod test_support;
