//! Corpus status: where every case sits in the pipeline.
use super::{PipelineContext, Selection};
use crate::store::{load_oracle_log, ArtifactStore, OracleOutcome, Stage, TargetKind};
use crate::util::display_path;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeSet;

/// Case counts for one (kind, domain).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct DomainCounts {
    pub(crate) kind: TargetKind,
    pub(crate) domain: String,
    pub(crate) raw: usize,
    /// RAW cases with no mirror in NATURALIZED or VALIDATED.
    pub(crate) unmirrored: usize,
    /// NATURALIZED cases without a recorded failure.
    pub(crate) pending: usize,
    /// NATURALIZED cases carrying an `error_log`.
    pub(crate) failing: usize,
    /// NATURALIZED files that do not parse as JSON.
    pub(crate) unreadable: usize,
    pub(crate) validated: usize,
}

impl DomainCounts {
    /// Cases not yet accepted.
    pub(crate) fn remaining(&self) -> usize {
        self.unmirrored + self.pending + self.failing + self.unreadable
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub(crate) struct OracleStats {
    pub(crate) calls: usize,
    pub(crate) success: usize,
    pub(crate) recovered: usize,
    pub(crate) failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub(crate) struct StatusReport {
    pub(crate) domains: Vec<DomainCounts>,
    pub(crate) oracle: OracleStats,
}

/// `caseforge status`
pub(crate) fn run_status(ctx: &PipelineContext, selection: &Selection, json: bool) -> Result<()> {
    let report = status_report(ctx, selection)?;
    if json {
        let text = serde_json::to_string_pretty(&report)?;
        println!("{text}");
        return Ok(());
    }
    if report.domains.is_empty() {
        println!(
            "no cases under {} (documentation in {})",
            display_path(ctx.store.paths().root(), Some(ctx.root())),
            display_path(ctx.docs.root(), Some(ctx.root()))
        );
    }
    for counts in &report.domains {
        println!("{}", format_counts(counts));
    }
    let oracle = &report.oracle;
    println!(
        "oracle: {} calls ({} success, {} recovered, {} failed)",
        oracle.calls, oracle.success, oracle.recovered, oracle.failed
    );
    Ok(())
}

pub(crate) fn status_report(ctx: &PipelineContext, selection: &Selection) -> Result<StatusReport> {
    let mut report = StatusReport::default();
    for kind in ctx.kinds(selection) {
        let mut domains = BTreeSet::new();
        for stage in Stage::ALL {
            domains.extend(ctx.stored_domains(stage, kind, selection)?);
        }
        for domain in domains {
            report.domains.push(domain_counts(&ctx.store, kind, &domain)?);
        }
    }

    for entry in load_oracle_log(ctx.store.paths())? {
        if selection.domain.as_deref().is_some_and(|wanted| wanted != entry.domain) {
            continue;
        }
        report.oracle.calls += 1;
        match entry.outcome {
            OracleOutcome::Success => report.oracle.success += 1,
            OracleOutcome::Recovered => report.oracle.recovered += 1,
            OracleOutcome::Failed => report.oracle.failed += 1,
        }
    }
    Ok(report)
}

/// Count one (kind, domain) across the three stage trees.
pub(crate) fn domain_counts(
    store: &ArtifactStore,
    kind: TargetKind,
    domain: &str,
) -> Result<DomainCounts> {
    let raw = store.list(Stage::Raw, kind, domain)?;
    let naturalized: BTreeSet<String> = store
        .list(Stage::Naturalized, kind, domain)?
        .into_iter()
        .collect();
    let validated: BTreeSet<String> = store
        .list(Stage::Validated, kind, domain)?
        .into_iter()
        .collect();

    let mut failing = 0;
    let mut unreadable = 0;
    for file_name in &naturalized {
        match store.read_value(Stage::Naturalized, kind, domain, file_name) {
            Ok(value) if value.get("error_log").is_some() => failing += 1,
            Ok(_) => {}
            Err(err) => {
                unreadable += 1;
                let error = format!("{err:#}");
                tracing::warn!(%kind, domain, file = %file_name, %error, "unreadable case");
            }
        }
    }
    let unmirrored = raw
        .iter()
        .filter(|name| !naturalized.contains(*name) && !validated.contains(*name))
        .count();

    Ok(DomainCounts {
        kind,
        domain: domain.to_string(),
        raw: raw.len(),
        unmirrored,
        pending: naturalized.len() - failing - unreadable,
        failing,
        unreadable,
        validated: validated.len(),
    })
}

pub(crate) fn format_counts(counts: &DomainCounts) -> String {
    let unreadable = if counts.unreadable > 0 {
        format!(", unreadable {}", counts.unreadable)
    } else {
        String::new()
    };
    format!(
        "{} {}: raw {}, unmirrored {}, pending {}, failing {}{unreadable}, validated {} (remaining {})",
        counts.kind,
        counts.domain,
        counts.raw,
        counts.unmirrored,
        counts.pending,
        counts.failing,
        counts.validated,
        counts.remaining()
    )
}
