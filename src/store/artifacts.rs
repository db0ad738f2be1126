//! Directory-backed artifact store.
//!
//! One JSON object per case, one directory tree per stage. Moving a file
//! between stage trees is the only state transition; an `error_log` key inside
//! a file is the only failure signal. The store does no locking: one writer
//! per (stage, domain) at a time.
use super::{difficulty_slug, Stage, StorePaths, TargetKind, TestCase};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const MAX_NAME_ATTEMPTS: usize = 8;

/// Identity of a case file, assigned once at synthesis time.
///
/// Rendered as `{group}_{difficulty}_{seq}_{YYYYmmdd}_{HHMMSS}_{suffix}.json`.
/// Names written before the random suffix existed parse with an empty suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub group: String,
    pub difficulty: String,
    pub seq: usize,
    pub timestamp: String,
    pub suffix: String,
}

impl ArtifactName {
    pub fn new(group: &str, difficulty_label: &str, seq: usize, now: DateTime<Local>) -> Self {
        Self {
            group: group.to_string(),
            difficulty: difficulty_slug(difficulty_label),
            seq,
            timestamp: now.format("%Y%m%d_%H%M%S").to_string(),
            suffix: fresh_suffix(),
        }
    }

    pub fn file_name(&self) -> String {
        let mut name = format!(
            "{}_{}_{}_{}",
            self.group, self.difficulty, self.seq, self.timestamp
        );
        if !self.suffix.is_empty() {
            name.push('_');
            name.push_str(&self.suffix);
        }
        name.push_str(".json");
        name
    }

    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".json")?;
        Self::parse_suffixed(stem).or_else(|| Self::parse_legacy(stem))
    }

    fn parse_suffixed(stem: &str) -> Option<Self> {
        let mut parts = stem.rsplitn(6, '_');
        let suffix = parts.next()?;
        let time = parts.next()?;
        let date = parts.next()?;
        let seq = parts.next()?;
        let difficulty = parts.next()?;
        let group = parts.next()?;
        if suffix.len() != 8 || !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Self::assemble(group, difficulty, seq, date, time, suffix)
    }

    fn parse_legacy(stem: &str) -> Option<Self> {
        let mut parts = stem.rsplitn(5, '_');
        let time = parts.next()?;
        let date = parts.next()?;
        let seq = parts.next()?;
        let difficulty = parts.next()?;
        let group = parts.next()?;
        Self::assemble(group, difficulty, seq, date, time, "")
    }

    fn assemble(
        group: &str,
        difficulty: &str,
        seq: &str,
        date: &str,
        time: &str,
        suffix: &str,
    ) -> Option<Self> {
        let digits = |s: &str, len: usize| s.len() == len && s.chars().all(|c| c.is_ascii_digit());
        if group.is_empty() || difficulty.is_empty() || !digits(date, 8) || !digits(time, 6) {
            return None;
        }
        Some(Self {
            group: group.to_string(),
            difficulty: difficulty_slug(difficulty),
            seq: seq.parse().ok()?,
            timestamp: format!("{date}_{time}"),
            suffix: suffix.to_string(),
        })
    }

    /// Creation order: timestamp first, then running index.
    pub fn sort_key(&self) -> (&str, usize) {
        (&self.timestamp, self.seq)
    }

    fn reroll_suffix(&mut self) {
        self.suffix = fresh_suffix();
    }
}

fn fresh_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// A case read from the store together with its file identity.
#[derive(Debug, Clone)]
pub struct StoredCase {
    pub file_name: String,
    pub case: TestCase,
}

/// Artifact store rooted at the configured store directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    paths: StorePaths,
}

impl ArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            paths: StorePaths::new(root),
        }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Domains that have a directory in `stage` for `kind`, sorted.
    pub fn domains(&self, stage: Stage, kind: TargetKind) -> Result<Vec<String>> {
        let dir = self.paths.kind_dir(stage, kind);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut domains = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("read {}", dir.display()))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }
            domains.push(name);
        }
        domains.sort();
        Ok(domains)
    }

    /// Case file names present in one stage directory, sorted.
    pub fn list(&self, stage: Stage, kind: TargetKind, domain: &str) -> Result<Vec<String>> {
        let dir = self.paths.domain_dir(stage, kind, domain);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("read {}", dir.display()))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !name.ends_with(".json") || !entry.path().is_file() {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    pub fn exists(&self, stage: Stage, kind: TargetKind, domain: &str, file_name: &str) -> bool {
        self.paths
            .artifact_path(stage, kind, domain, file_name)
            .is_file()
    }

    /// Read a case file as untyped JSON.
    pub fn read_value(
        &self,
        stage: Stage,
        kind: TargetKind,
        domain: &str,
        file_name: &str,
    ) -> Result<Value> {
        let path = self.paths.artifact_path(stage, kind, domain, file_name);
        let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))
    }

    /// Read a case file with the output shape of `kind`.
    pub fn read_case(
        &self,
        stage: Stage,
        kind: TargetKind,
        domain: &str,
        file_name: &str,
    ) -> Result<TestCase> {
        let value = self.read_value(stage, kind, domain, file_name)?;
        TestCase::from_value(kind, value).with_context(|| format!("decode case {file_name}"))
    }

    /// Load every decodable case of one stage directory; unreadable files are
    /// logged and skipped.
    pub fn load_cases(
        &self,
        stage: Stage,
        kind: TargetKind,
        domain: &str,
    ) -> Result<Vec<StoredCase>> {
        let mut cases = Vec::new();
        for file_name in self.list(stage, kind, domain)? {
            match self.read_case(stage, kind, domain, &file_name) {
                Ok(case) => cases.push(StoredCase { file_name, case }),
                Err(err) => {
                    let error = format!("{err:#}");
                    tracing::warn!(%stage, %kind, domain, file = %file_name, %error, "skip unreadable case");
                }
            }
        }
        Ok(cases)
    }

    /// Persist a newly synthesized case at RAW under a name no other file has.
    ///
    /// The bytes are written to a hidden temp file first and then hard-linked
    /// under the final name, which fails rather than replacing an existing
    /// file; on a collision the random suffix is re-rolled. A failed write
    /// never leaves a partial case behind. Returns the final file name.
    pub fn append_new(
        &self,
        kind: TargetKind,
        domain: &str,
        name: &mut ArtifactName,
        case: &TestCase,
    ) -> Result<String> {
        let dir = self.paths.domain_dir(Stage::Raw, kind, domain);
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        let bytes = serde_json::to_vec_pretty(case).context("serialize case")?;
        let tmp_path = dir.join(format!(".{}.tmp", name.file_name()));
        let published = fs::write(&tmp_path, &bytes)
            .with_context(|| format!("write {}", tmp_path.display()))
            .and_then(|()| publish_new(&dir, &tmp_path, name));
        if let Err(err) = fs::remove_file(&tmp_path) {
            if err.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %tmp_path.display(), error = %err, "leftover temp file");
            }
        }
        published
    }

    /// Atomically write an untyped case object, keeping fields this tool does
    /// not model exactly as they were read.
    pub fn write_value(
        &self,
        stage: Stage,
        kind: TargetKind,
        domain: &str,
        file_name: &str,
        value: &Value,
    ) -> Result<PathBuf> {
        let dest = self.paths.artifact_path(stage, kind, domain, file_name);
        let bytes = serde_json::to_vec_pretty(value).context("serialize case")?;
        write_atomic(&dest, &bytes)?;
        Ok(dest)
    }

    /// Move a case file from one stage tree to another, keeping its name.
    ///
    /// Refuses to overwrite: a case must never be live in two stages.
    pub fn promote(
        &self,
        from: Stage,
        to: Stage,
        kind: TargetKind,
        domain: &str,
        file_name: &str,
    ) -> Result<PathBuf> {
        let source = self.paths.artifact_path(from, kind, domain, file_name);
        let dest = self.paths.artifact_path(to, kind, domain, file_name);
        if dest.exists() {
            return Err(anyhow!(
                "{} already exists; refusing to overwrite",
                dest.display()
            ));
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::rename(&source, &dest)
            .with_context(|| format!("move {} to {}", source.display(), dest.display()))?;
        Ok(dest)
    }
}

/// Link `tmp_path` into `dir` under the first free name, re-rolling the
/// suffix of `name` on each collision.
fn publish_new(dir: &Path, tmp_path: &Path, name: &mut ArtifactName) -> Result<String> {
    for _ in 0..MAX_NAME_ATTEMPTS {
        let file_name = name.file_name();
        let path = dir.join(&file_name);
        match fs::hard_link(tmp_path, &path) {
            Ok(()) => return Ok(file_name),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => name.reroll_suffix(),
            Err(err) => {
                return Err(err).with_context(|| format!("publish {}", path.display()));
            }
        }
    }
    Err(anyhow!(
        "could not find a free artifact name for {} after {MAX_NAME_ATTEMPTS} attempts",
        name.file_name()
    ))
}

fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    let file_name = dest
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("case");
    let tmp_path = parent.join(format!(".{file_name}.tmp"));
    fs::write(&tmp_path, bytes).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, dest).with_context(|| format!("publish {}", dest.display()))?;
    Ok(())
}
