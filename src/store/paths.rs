//! Typed paths into the artifact store layout.
//!
//! Centralizing path construction keeps file access consistent across stages:
//! `<store>/<stage>/<KIND>/<Domain>/<artifact>.json`.
use super::{Stage, TargetKind};
use std::path::{Path, PathBuf};

/// Convenience wrapper for locating store directories and artifacts.
#[derive(Debug, Clone)]
pub struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    /// Create a new path helper rooted at the store root.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Return the store root used for path derivation.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the directory holding every kind for one stage.
    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        self.root.join(stage.dir_name())
    }

    /// Return the `<stage>/<KIND>/` directory.
    pub fn kind_dir(&self, stage: Stage, kind: TargetKind) -> PathBuf {
        self.stage_dir(stage).join(kind.dir_name())
    }

    /// Return the `<stage>/<KIND>/<Domain>/` directory.
    pub fn domain_dir(&self, stage: Stage, kind: TargetKind, domain: &str) -> PathBuf {
        self.kind_dir(stage, kind).join(domain)
    }

    /// Return the path of a named artifact in one stage.
    pub fn artifact_path(
        &self,
        stage: Stage,
        kind: TargetKind,
        domain: &str,
        file_name: &str,
    ) -> PathBuf {
        self.domain_dir(stage, kind, domain).join(file_name)
    }

    /// Return the `oracle_log.jsonl` path.
    pub fn oracle_log_path(&self) -> PathBuf {
        self.root.join("oracle_log.jsonl")
    }
}
