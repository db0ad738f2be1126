//! Read-only RAW vs NATURALIZED consistency check.
//!
//! Every RAW case must have a mirror whose fields other than `input` (and the
//! validator-owned `error_log`) are equal to the RAW copy. A case that already
//! passed validation is looked up in VALIDATED instead.
use super::{PipelineContext, Selection};
use crate::store::{ArtifactStore, Stage, TargetKind};
use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

const IGNORED_FIELDS: [&str; 2] = ["input", "error_log"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct MissingCase {
    pub(crate) kind: TargetKind,
    pub(crate) domain: String,
    pub(crate) file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct DriftedCase {
    pub(crate) kind: TargetKind,
    pub(crate) domain: String,
    pub(crate) file: String,
    /// Stage the mirror was found in.
    pub(crate) stage: Stage,
    /// Top-level fields whose values differ.
    pub(crate) fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub(crate) struct AuditReport {
    /// RAW cases examined.
    pub(crate) checked: usize,
    pub(crate) missing: Vec<MissingCase>,
    pub(crate) drifted: Vec<DriftedCase>,
}

impl AuditReport {
    pub(crate) fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.drifted.is_empty()
    }
}

/// `caseforge audit`
pub(crate) fn run_audit(ctx: &PipelineContext, selection: &Selection) -> Result<AuditReport> {
    let mut report = AuditReport::default();
    for kind in ctx.kinds(selection) {
        for domain in ctx.stored_domains(Stage::Raw, kind, selection)? {
            audit_domain(&ctx.store, kind, &domain, &mut report)?;
        }
    }
    Ok(report)
}

/// Check every RAW case of one domain, adding findings to `report`.
pub(crate) fn audit_domain(
    store: &ArtifactStore,
    kind: TargetKind,
    domain: &str,
    report: &mut AuditReport,
) -> Result<()> {
    for file_name in store.list(Stage::Raw, kind, domain)? {
        report.checked += 1;
        let Some(stage) = [Stage::Naturalized, Stage::Validated]
            .into_iter()
            .find(|stage| store.exists(*stage, kind, domain, &file_name))
        else {
            report.missing.push(MissingCase {
                kind,
                domain: domain.to_string(),
                file: file_name,
            });
            continue;
        };

        let pair = store
            .read_value(Stage::Raw, kind, domain, &file_name)
            .and_then(|raw| Ok((raw, store.read_value(stage, kind, domain, &file_name)?)));
        let fields = match pair {
            Ok((raw, mirror)) => differing_fields(&raw, &mirror),
            Err(err) => {
                let error = format!("{err:#}");
                tracing::warn!(%kind, domain, file = %file_name, %error, "unreadable case during audit");
                vec!["<unreadable>".to_string()]
            }
        };
        if !fields.is_empty() {
            tracing::warn!(%kind, domain, file = %file_name, ?fields, "naturalized case drifted");
            report.drifted.push(DriftedCase {
                kind,
                domain: domain.to_string(),
                file: file_name,
                stage,
                fields,
            });
        }
    }
    Ok(())
}

/// Top-level fields that differ once the ignored fields are removed.
fn differing_fields(raw: &Value, mirror: &Value) -> Vec<String> {
    let (Some(raw), Some(mirror)) = (raw.as_object(), mirror.as_object()) else {
        return if raw == mirror {
            Vec::new()
        } else {
            vec!["<document>".to_string()]
        };
    };
    let raw = without_ignored(raw);
    let mirror = without_ignored(mirror);
    let keys: BTreeSet<&String> = raw.keys().chain(mirror.keys()).collect();
    keys.into_iter()
        .filter(|key| raw.get(*key) != mirror.get(*key))
        .cloned()
        .collect()
}

fn without_ignored(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .filter(|(key, _)| !IGNORED_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
