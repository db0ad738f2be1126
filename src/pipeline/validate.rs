//! Case validation.
//!
//! Only files still under NATURALIZED are input, so passed cases are never
//! executed again and failed ones are retried verbatim on every run. A pass
//! drops any stale `error_log` and moves the file to VALIDATED; a failure is
//! written into the file where it sits.
use super::{check_sql, HttpExecutor, PipelineContext, Selection};
use crate::error::CaseError;
use crate::store::{ApiCall, CallOutput, ErrorLog, HttpMethod, Stage, TargetKind, TestCase};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;

const PASS_STATUSES: [u16; 3] = [200, 201, 204];

/// Outcome of checking one case output against its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Verdict {
    Passed,
    Failed(ErrorLog),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ValidationSummary {
    pub(crate) passed: usize,
    pub(crate) failed: usize,
    /// Cases naming a verb the validator cannot dispatch; left untouched.
    pub(crate) unsupported: usize,
    /// Cases that could not be read or moved.
    pub(crate) errors: usize,
    /// API domains without a configured base URL.
    pub(crate) skipped_domains: usize,
}

impl ValidationSummary {
    fn absorb(&mut self, other: &ValidationSummary) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.unsupported += other.unsupported;
        self.errors += other.errors;
        self.skipped_domains += other.skipped_domains;
    }
}

/// `caseforge validate`
pub(crate) fn run_validate(
    ctx: &PipelineContext,
    executor: &dyn HttpExecutor,
    selection: &Selection,
) -> Result<ValidationSummary> {
    let mut total = ValidationSummary::default();
    for kind in ctx.kinds(selection) {
        for domain in ctx.stored_domains(Stage::Naturalized, kind, selection)? {
            match validate_domain(ctx, executor, kind, &domain) {
                Ok(summary) => total.absorb(&summary),
                Err(err) => {
                    let error = format!("{err:#}");
                    tracing::warn!(%kind, domain, %error, "skip domain for validation");
                }
            }
        }
    }
    Ok(total)
}

/// Validate every NATURALIZED case of one domain.
pub(crate) fn validate_domain(
    ctx: &PipelineContext,
    executor: &dyn HttpExecutor,
    kind: TargetKind,
    domain: &str,
) -> Result<ValidationSummary> {
    let mut summary = ValidationSummary::default();
    let base_url = match kind {
        TargetKind::Api => match ctx.config.base_urls.get(domain) {
            Some(url) => Some(url.as_str()),
            None => {
                tracing::warn!(domain, "no base URL configured; skipping API validation");
                summary.skipped_domains += 1;
                return Ok(summary);
            }
        },
        TargetKind::Sql => None,
    };

    for file_name in ctx.store.list(Stage::Naturalized, kind, domain)? {
        match validate_case(ctx, executor, kind, domain, base_url, &file_name) {
            Ok(Verdict::Passed) => {
                summary.passed += 1;
                tracing::info!(%kind, domain, file = %file_name, "validated");
            }
            Ok(Verdict::Failed(log)) => {
                summary.failed += 1;
                tracing::warn!(%kind, domain, file = %file_name, error_log = ?log, "validation failed");
            }
            Err(err) => match err.downcast_ref::<CaseError>() {
                Some(CaseError::UnsupportedMethod(method)) => {
                    summary.unsupported += 1;
                    tracing::warn!(%kind, domain, file = %file_name, method = %method, "unsupported HTTP method; case left untouched");
                }
                _ => {
                    summary.errors += 1;
                    let error = format!("{err:#}");
                    tracing::error!(%kind, domain, file = %file_name, %error, "validation error");
                }
            },
        }
    }
    Ok(summary)
}

fn validate_case(
    ctx: &PipelineContext,
    executor: &dyn HttpExecutor,
    kind: TargetKind,
    domain: &str,
    base_url: Option<&str>,
    file_name: &str,
) -> Result<Verdict> {
    let mut value = ctx
        .store
        .read_value(Stage::Naturalized, kind, domain, file_name)?;
    let case = TestCase::from_value(kind, value.clone())
        .with_context(|| format!("decode case {file_name}"))?;

    let verdict = match (&case.output, base_url) {
        (CallOutput::Api(call), Some(base_url)) => judge_api(executor, base_url, call)?,
        (CallOutput::Api(_), None) => return Err(anyhow!("no base URL for API case")),
        (CallOutput::Sql(query), _) => judge_sql(&query.sql),
    };

    let fields = value
        .as_object_mut()
        .ok_or_else(|| anyhow!("case {file_name} is not a JSON object"))?;
    match &verdict {
        Verdict::Passed => {
            if fields.shift_remove("error_log").is_some() {
                ctx.store
                    .write_value(Stage::Naturalized, kind, domain, file_name, &value)?;
            }
            ctx.store
                .promote(Stage::Naturalized, Stage::Validated, kind, domain, file_name)?;
        }
        Verdict::Failed(log) => {
            let annotate = kind == TargetKind::Api || ctx.config.annotate_sql_failures;
            if annotate {
                fields.insert(
                    "error_log".to_string(),
                    serde_json::to_value(log).context("serialize error_log")?,
                );
                ctx.store
                    .write_value(Stage::Naturalized, kind, domain, file_name, &value)?;
            }
        }
    }
    Ok(verdict)
}

/// Execute an API call. Only an unsupported verb is an error; everything the
/// target does is a verdict.
fn judge_api(executor: &dyn HttpExecutor, base_url: &str, call: &ApiCall) -> Result<Verdict> {
    let method: HttpMethod = call.method.parse()?;
    let url = join_url(base_url, &call.endpoint);
    let verdict = match executor.execute(method, &url, call.body.as_ref()) {
        Ok(reply) if PASS_STATUSES.contains(&reply.status) => Verdict::Passed,
        Ok(reply) => Verdict::Failed(ErrorLog::Response {
            status_code: reply.status,
            response_text: response_text(&reply.body),
        }),
        Err(err) => Verdict::Failed(ErrorLog::Exception {
            exception: format!("{err:#}"),
        }),
    };
    Ok(verdict)
}

fn judge_sql(sql: &str) -> Verdict {
    match check_sql(sql) {
        Ok(()) => Verdict::Passed,
        Err(err) => Verdict::Failed(ErrorLog::Exception {
            exception: err.to_string(),
        }),
    }
}

fn join_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if endpoint.starts_with('/') {
        format!("{base}{endpoint}")
    } else {
        format!("{base}/{endpoint}")
    }
}

/// JSON bodies are kept as compact JSON text, anything else verbatim.
fn response_text(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| serde_json::to_string(&json).ok())
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
