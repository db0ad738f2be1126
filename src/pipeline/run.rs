//! Full pipeline driver for `caseforge run`.
//!
//! Stages run in order per (kind, domain): synthesize, naturalize, audit,
//! validate. A domain whose documentation is missing still gets its existing
//! cases naturalized and validated.
use super::status::{domain_counts, format_counts, DomainCounts};
use super::{
    audit_domain, naturalize_domain, synthesize_domain, validate_domain, AuditReport,
    HttpExecutor, NaturalizeSummary, PipelineContext, Selection, SynthesisSummary,
    ValidationSummary,
};
use crate::oracle::Oracle;
use crate::store::{Stage, TargetKind};
use anyhow::Result;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Wall time spent in each stage across all domains.
#[derive(Debug, Default, Clone)]
pub(crate) struct StageTimings {
    pub(crate) synthesize: Duration,
    pub(crate) naturalize: Duration,
    pub(crate) audit: Duration,
    pub(crate) validate: Duration,
}

/// What one (kind, domain) went through in a run.
#[derive(Debug, Clone)]
pub(crate) struct DomainRun {
    pub(crate) synthesis: SynthesisSummary,
    pub(crate) naturalize: NaturalizeSummary,
    pub(crate) validation: ValidationSummary,
    pub(crate) counts: DomainCounts,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct PipelineReport {
    pub(crate) domains: Vec<DomainRun>,
    pub(crate) audit: AuditReport,
    pub(crate) timings: StageTimings,
}

/// Run every stage over the selected corpus and print a summary.
pub(crate) fn run_pipeline(
    ctx: &PipelineContext,
    oracle: &dyn Oracle,
    executor: &dyn HttpExecutor,
    selection: &Selection,
    count: Option<usize>,
) -> Result<PipelineReport> {
    let started = Instant::now();
    let mut report = PipelineReport::default();
    for kind in ctx.kinds(selection) {
        for domain in run_domains(ctx, kind, selection)? {
            match run_domain(ctx, oracle, executor, kind, &domain, count, &mut report) {
                Ok(run) => report.domains.push(run),
                Err(err) => {
                    let error = format!("{err:#}");
                    tracing::error!(%kind, domain, %error, "domain run aborted");
                }
            }
        }
    }

    let timings = &report.timings;
    for (stage, elapsed) in [
        ("synthesize", timings.synthesize),
        ("naturalize", timings.naturalize),
        ("audit", timings.audit),
        ("validate", timings.validate),
    ] {
        println!("{stage}: {:.2}s", elapsed.as_secs_f64());
    }
    for run in &report.domains {
        println!(
            "{} [+{} generated, {} naturalized, {} passed, {} failed]",
            format_counts(&run.counts),
            run.synthesis.written,
            run.naturalize.naturalized,
            run.validation.passed,
            run.validation.failed
        );
    }
    let remaining: usize = report.domains.iter().map(|run| run.counts.remaining()).sum();
    let validated: usize = report.domains.iter().map(|run| run.counts.validated).sum();
    println!(
        "total: {validated} validated, {remaining} remaining, {} missing, {} drifted ({:.2}s)",
        report.audit.missing.len(),
        report.audit.drifted.len(),
        started.elapsed().as_secs_f64()
    );
    Ok(report)
}

/// Documented domains plus any domain that already has cases in flight.
fn run_domains(ctx: &PipelineContext, kind: TargetKind, selection: &Selection) -> Result<Vec<String>> {
    let mut domains: BTreeSet<String> = match ctx.documented_domains(selection) {
        Ok(domains) => domains.into_iter().collect(),
        Err(err) => {
            let error = format!("{err:#}");
            tracing::warn!(%kind, %error, "no documented domains");
            BTreeSet::new()
        }
    };
    for stage in [Stage::Raw, Stage::Naturalized] {
        domains.extend(ctx.stored_domains(stage, kind, selection)?);
    }
    Ok(domains.into_iter().collect())
}

fn run_domain(
    ctx: &PipelineContext,
    oracle: &dyn Oracle,
    executor: &dyn HttpExecutor,
    kind: TargetKind,
    domain: &str,
    count: Option<usize>,
    report: &mut PipelineReport,
) -> Result<DomainRun> {
    let span = tracing::info_span!("domain", %kind, domain);
    let _enter = span.enter();

    let start = Instant::now();
    let synthesis = synthesize_domain(ctx, oracle, kind, domain, count).unwrap_or_else(|err| {
        let error = format!("{err:#}");
        tracing::warn!(%error, "synthesis skipped");
        SynthesisSummary::default()
    });
    report.timings.synthesize += elapsed("synthesize", start);

    let start = Instant::now();
    let naturalize = naturalize_domain(ctx, oracle, kind, domain)?;
    report.timings.naturalize += elapsed("naturalize", start);

    let start = Instant::now();
    audit_domain(&ctx.store, kind, domain, &mut report.audit)?;
    report.timings.audit += elapsed("audit", start);

    let start = Instant::now();
    let validation = validate_domain(ctx, executor, kind, domain)?;
    report.timings.validate += elapsed("validate", start);

    Ok(DomainRun {
        synthesis,
        naturalize,
        validation,
        counts: domain_counts(&ctx.store, kind, domain)?,
    })
}

fn elapsed(stage: &str, start: Instant) -> Duration {
    let elapsed = start.elapsed();
    tracing::info!(stage, elapsed_ms = elapsed.as_millis() as u64, "stage complete");
    elapsed
}
