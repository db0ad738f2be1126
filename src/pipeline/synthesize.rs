//! Case synthesis.
//!
//! One oracle call per (domain, operation) asks for every difficulty cell the
//! quota still leaves open. The grounding context shows the oracle the cases
//! it already wrote for that operation so it can diverge from them.
use super::{PipelineContext, Selection};
use crate::domain::{Domain, Operation};
use crate::error::CaseError;
use crate::oracle::Oracle;
use crate::store::{
    append_oracle_log, difficulty_slug, ArtifactName, Difficulty, OracleCallKind,
    OracleLogBuilder, Stage, StoredCase, TargetKind, TestCase, UNKNOWN_DIFFICULTY,
};
use anyhow::{Context, Result};
use chrono::Local;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

const SYNTHESIZE_API: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/synthesize_api.md"
));
const SYNTHESIZE_SQL: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/synthesize_sql.md"
));

/// Counts for one synthesis pass over a domain.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct SynthesisSummary {
    /// Operations (or SQL groups) the oracle was asked about.
    pub(crate) requested: usize,
    /// Operations whose quota was already met.
    pub(crate) saturated: usize,
    /// Operations whose oracle call or parse failed.
    pub(crate) failed: usize,
    /// Case files written at RAW.
    pub(crate) written: usize,
}

impl SynthesisSummary {
    fn absorb(&mut self, other: &SynthesisSummary) {
        self.requested += other.requested;
        self.saturated += other.saturated;
        self.failed += other.failed;
        self.written += other.written;
    }
}

/// What one call targets: an API operation or a whole SQL domain.
struct Target<'a> {
    group: String,
    operation: Option<&'a Operation>,
}

/// `caseforge synthesize`
pub(crate) fn run_synthesize(
    ctx: &PipelineContext,
    oracle: &dyn Oracle,
    selection: &Selection,
    count: Option<usize>,
) -> Result<SynthesisSummary> {
    let mut total = SynthesisSummary::default();
    for kind in ctx.kinds(selection) {
        for domain in ctx.documented_domains(selection)? {
            match synthesize_domain(ctx, oracle, kind, &domain, count) {
                Ok(summary) => total.absorb(&summary),
                Err(err) => {
                    let error = format!("{err:#}");
                    tracing::warn!(%kind, domain, %error, "skip domain for synthesis");
                }
            }
        }
    }
    Ok(total)
}

/// Synthesize new RAW cases for every target of one domain.
///
/// Fails only when the domain documentation cannot be loaded; per-target
/// failures are logged and counted.
pub(crate) fn synthesize_domain(
    ctx: &PipelineContext,
    oracle: &dyn Oracle,
    kind: TargetKind,
    domain_name: &str,
    count: Option<usize>,
) -> Result<SynthesisSummary> {
    let domain = ctx.docs.load(domain_name, kind)?;
    let combined = match kind {
        TargetKind::Sql => ctx.docs.combined_schema()?,
        TargetKind::Api => None,
    };
    let per_difficulty = count.unwrap_or(ctx.config.cases_per_difficulty);

    let operations = domain
        .interface
        .as_ref()
        .map(|interface| interface.operations(ctx.config.include_get_operations))
        .unwrap_or_default();
    let targets: Vec<Target<'_>> = match kind {
        TargetKind::Api => operations
            .iter()
            .map(|op| Target {
                group: op.group(),
                operation: Some(op),
            })
            .collect(),
        TargetKind::Sql => vec![Target {
            group: domain.name.clone(),
            operation: None,
        }],
    };
    if targets.is_empty() {
        tracing::info!(%kind, domain = domain_name, "no operations to synthesize for");
    }

    let mut summary = SynthesisSummary::default();
    for target in &targets {
        let raw_cases = ctx.store.load_cases(Stage::Raw, kind, domain_name)?;
        let history = History::for_group(raw_cases, &target.group, &ctx.config.top_difficulty_label);
        let requests = history.open_requests(per_difficulty, ctx.config.max_cases_per_difficulty);
        if requests.is_empty() {
            tracing::debug!(%kind, domain = domain_name, group = %target.group, "quota met");
            summary.saturated += 1;
            continue;
        }
        summary.requested += 1;
        match synthesize_target(ctx, oracle, kind, &domain, combined.as_deref(), target, &history, &requests) {
            Ok(written) => summary.written += written,
            Err(err) => {
                summary.failed += 1;
                let error = format!("{err:#}");
                tracing::error!(%kind, domain = domain_name, group = %target.group, %error, "synthesis failed");
            }
        }
    }
    Ok(summary)
}

#[allow(clippy::too_many_arguments)]
fn synthesize_target(
    ctx: &PipelineContext,
    oracle: &dyn Oracle,
    kind: TargetKind,
    domain: &Domain,
    combined_schema: Option<&str>,
    target: &Target<'_>,
    history: &History,
    requests: &[(Difficulty, usize)],
) -> Result<usize> {
    let top_label = &ctx.config.top_difficulty_label;
    let system = system_prompt(kind, top_label);
    let prior = history.context(ctx.config.context_limit)?;
    let user = user_prompt(domain, combined_schema, target.operation, &prior, requests, top_label);
    let grounding: Option<&Path> = domain.interface.as_ref().map(|doc| doc.path.as_path());

    let log = OracleLogBuilder::new(OracleCallKind::Synthesis, &domain.name, &target.group)
        .with_prompt_preview(&user);
    let reply = match oracle.complete(&system, &user, grounding) {
        Ok(reply) => reply,
        Err(err) => {
            record(ctx, log.failed(format!("{err:#}")));
            return Err(err);
        }
    };
    let (elements, recovered) = match parse_case_array(&reply) {
        Ok(parsed) => parsed,
        Err(err) => {
            record(ctx, log.failed(err.to_string()));
            return Err(err.into());
        }
    };
    if recovered {
        tracing::warn!(domain = %domain.name, group = %target.group, "generation parsed only after array extraction");
    }

    let mut next_seq = history.next_seq.clone();
    let mut written = 0;
    for element in elements {
        let mut case = match TestCase::from_value(kind, element) {
            Ok(case) => case,
            Err(err) => {
                let error = format!("{err:#}");
                tracing::warn!(domain = %domain.name, group = %target.group, %error, "skip invalid generated case");
                continue;
            }
        };
        case.difficulty = normalize_difficulty(&case.difficulty, top_label);
        let slug = difficulty_slug(&case.difficulty);
        let seq = next_seq.entry(slug).or_insert(1);
        let mut name = ArtifactName::new(&target.group, &case.difficulty, *seq, Local::now());
        *seq += 1;
        let file_name = ctx
            .store
            .append_new(kind, &domain.name, &mut name, &case)
            .with_context(|| format!("persist case for {}", target.group))?;
        tracing::info!(%kind, domain = %domain.name, file = %file_name, "generated");
        written += 1;
    }

    let entry = if recovered {
        log.recovered(written)
    } else {
        log.success(Some(written))
    };
    record(ctx, entry);
    Ok(written)
}

fn record(ctx: &PipelineContext, entry: crate::store::OracleLogEntry) {
    if let Err(err) = append_oracle_log(ctx.store.paths(), &entry) {
        let error = format!("{err:#}");
        tracing::warn!(%error, "failed to append oracle log");
    }
}

/// Decode an oracle reply as a JSON array of case objects.
///
/// A strict parse is tried first; failing that, the widest bracket-delimited
/// substring is parsed. The flag is true when only the second step worked.
pub(crate) fn parse_case_array(text: &str) -> std::result::Result<(Vec<Value>, bool), CaseError> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text) {
        return Ok((items, false));
    }
    let array = Regex::new(r"(?s)\[.*\]").expect("regex for JSON array extraction");
    let Some(found) = array.find(text) else {
        return Err(CaseError::MalformedGeneration(
            "no JSON array in oracle reply".to_string(),
        ));
    };
    match serde_json::from_str::<Value>(found.as_str()) {
        Ok(Value::Array(items)) => Ok((items, true)),
        Ok(_) => Err(CaseError::MalformedGeneration(
            "extracted text is not a JSON array".to_string(),
        )),
        Err(err) => Err(CaseError::MalformedGeneration(format!(
            "extracted array does not parse: {err}"
        ))),
    }
}

/// Canonical label for a generated difficulty, or `Unknown`.
fn normalize_difficulty(label: &str, top_label: &str) -> String {
    Difficulty::recognize(label, top_label)
        .map(|level| level.label(top_label))
        .unwrap_or_else(|| UNKNOWN_DIFFICULTY.to_string())
}

/// Prior cases of one group plus the bookkeeping derived from their names.
struct History {
    /// Oldest first.
    cases: Vec<(ArtifactName, StoredCase)>,
    /// Next sequence number per difficulty slug.
    next_seq: BTreeMap<String, usize>,
    /// Existing case count per recognized difficulty.
    counts: BTreeMap<Difficulty, usize>,
}

impl History {
    fn for_group(raw_cases: Vec<StoredCase>, group: &str, top_label: &str) -> Self {
        let mut cases: Vec<(ArtifactName, StoredCase)> = raw_cases
            .into_iter()
            .filter_map(|stored| {
                let name = ArtifactName::parse(&stored.file_name)?;
                (name.group == group).then_some((name, stored))
            })
            .collect();
        cases.sort_by(|a, b| a.0.sort_key().cmp(&b.0.sort_key()));

        let mut next_seq = BTreeMap::new();
        let mut counts = BTreeMap::new();
        for (name, stored) in &cases {
            let next = next_seq.entry(name.difficulty.clone()).or_insert(1);
            *next = (*next).max(name.seq + 1);
            if let Some(level) = Difficulty::recognize(&stored.case.difficulty, top_label) {
                *counts.entry(level).or_insert(0) += 1;
            }
        }
        Self {
            cases,
            next_seq,
            counts,
        }
    }

    /// Cases still wanted per difficulty, honoring the quota.
    fn open_requests(&self, per_difficulty: usize, quota: Option<usize>) -> Vec<(Difficulty, usize)> {
        Difficulty::ALL
            .iter()
            .filter_map(|level| {
                let have = self.counts.get(level).copied().unwrap_or(0);
                let want = match quota {
                    Some(quota) => per_difficulty.min(quota.saturating_sub(have)),
                    None => per_difficulty,
                };
                (want > 0).then_some((*level, want))
            })
            .collect()
    }

    /// The most recent `limit` cases (all when unset), serialized oldest first.
    fn context(&self, limit: Option<usize>) -> Result<String> {
        let skip = limit.map_or(0, |limit| self.cases.len().saturating_sub(limit));
        let recent: Vec<&TestCase> = self
            .cases
            .iter()
            .skip(skip)
            .map(|(_, stored)| &stored.case)
            .collect();
        serde_json::to_string_pretty(&recent).context("serialize prior cases")
    }
}

fn system_prompt(kind: TargetKind, top_label: &str) -> String {
    let template = match kind {
        TargetKind::Api => SYNTHESIZE_API,
        TargetKind::Sql => SYNTHESIZE_SQL,
    };
    let labels: Vec<String> = Difficulty::ALL
        .iter()
        .map(|level| level.label(top_label))
        .collect();
    template
        .replace("{difficulties}", &labels.join(", "))
        .replace("{top_label}", top_label)
}

fn user_prompt(
    domain: &Domain,
    combined_schema: Option<&str>,
    operation: Option<&Operation>,
    prior: &str,
    requests: &[(Difficulty, usize)],
    top_label: &str,
) -> String {
    let mut prompt = format!(
        "# Database structure\n{}\n\n",
        domain.schema_text.trim()
    );
    if let Some(combined) = combined_schema {
        prompt.push_str(&format!(
            "# Combined database structure\n{}\n\n",
            combined.trim()
        ));
    }
    prompt.push_str(&format!(
        "# Domain description\n{}\n\n",
        domain.description.trim()
    ));
    if let Some(op) = operation {
        let fragment = serde_json::to_string_pretty(&op.fragment).unwrap_or_default();
        prompt.push_str(&format!(
            "# Focus operation\n{} {}\n\n{fragment}\n\n",
            op.method, op.path
        ));
    } else {
        prompt.push_str(&format!(
            "# Tables\n{}\n\n",
            domain.schema.outline()
        ));
    }
    prompt.push_str(&format!("# Previously written test cases\n{prior}\n\n"));

    let total: usize = requests.iter().map(|(_, n)| n).sum();
    let breakdown: Vec<String> = requests
        .iter()
        .map(|(level, n)| format!("{n} {}", level.label(top_label)))
        .collect();
    prompt.push_str(&format!(
        "# Request\nWrite {total} new test cases: {}.\n",
        breakdown.join(", ")
    ));
    prompt
}

#[cfg(test)]
#[path = "synthesize_tests.rs"]
mod tests;
