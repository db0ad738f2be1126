//! Input naturalization.
//!
//! The oracle rewrites only the `input` sentence of a RAW case. Everything else
//! is copied from the RAW file as read, so the NATURALIZED mirror differs from
//! its source in that one field.
use super::{PipelineContext, Selection};
use crate::error::CaseError;
use crate::oracle::Oracle;
use crate::store::{
    append_oracle_log, OracleCallKind, OracleLogBuilder, Stage, TargetKind, TestCase,
};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;

const NATURALIZE_API: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/naturalize_api.md"
));
const NATURALIZE_SQL: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/naturalize_sql.md"
));

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct NaturalizeSummary {
    pub(crate) naturalized: usize,
    /// Already mirrored in NATURALIZED or VALIDATED.
    pub(crate) skipped: usize,
    pub(crate) failed: usize,
}

impl NaturalizeSummary {
    fn absorb(&mut self, other: &NaturalizeSummary) {
        self.naturalized += other.naturalized;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// `caseforge naturalize`
pub(crate) fn run_naturalize(
    ctx: &PipelineContext,
    oracle: &dyn Oracle,
    selection: &Selection,
) -> Result<NaturalizeSummary> {
    let mut total = NaturalizeSummary::default();
    for kind in ctx.kinds(selection) {
        for domain in ctx.stored_domains(Stage::Raw, kind, selection)? {
            match naturalize_domain(ctx, oracle, kind, &domain) {
                Ok(summary) => total.absorb(&summary),
                Err(err) => {
                    let error = format!("{err:#}");
                    tracing::warn!(%kind, domain, %error, "skip domain for naturalization");
                }
            }
        }
    }
    Ok(total)
}

/// Mirror every not-yet-mirrored RAW case of one domain into NATURALIZED.
pub(crate) fn naturalize_domain(
    ctx: &PipelineContext,
    oracle: &dyn Oracle,
    kind: TargetKind,
    domain: &str,
) -> Result<NaturalizeSummary> {
    let mut summary = NaturalizeSummary::default();
    for file_name in ctx.store.list(Stage::Raw, kind, domain)? {
        let mirrored = [Stage::Naturalized, Stage::Validated]
            .iter()
            .any(|stage| ctx.store.exists(*stage, kind, domain, &file_name));
        if mirrored {
            summary.skipped += 1;
            continue;
        }
        match naturalize_case(ctx, oracle, kind, domain, &file_name) {
            Ok(()) => {
                summary.naturalized += 1;
                tracing::info!(%kind, domain, file = %file_name, "naturalized");
            }
            Err(err) => {
                summary.failed += 1;
                let error = format!("{err:#}");
                tracing::warn!(%kind, domain, file = %file_name, %error, "naturalization failed");
            }
        }
    }
    Ok(summary)
}

fn naturalize_case(
    ctx: &PipelineContext,
    oracle: &dyn Oracle,
    kind: TargetKind,
    domain: &str,
    file_name: &str,
) -> Result<()> {
    let mut value = ctx.store.read_value(Stage::Raw, kind, domain, file_name)?;
    TestCase::from_value(kind, value.clone())
        .with_context(|| format!("decode case {file_name}"))?;

    let system = match kind {
        TargetKind::Api => NATURALIZE_API,
        TargetKind::Sql => NATURALIZE_SQL,
    };
    let user = serde_json::to_string(&value).context("serialize case for oracle")?;
    let log = OracleLogBuilder::new(OracleCallKind::Naturalization, domain, file_name)
        .with_prompt_preview(&user);

    let rewritten = oracle
        .complete(system, &user, None)
        .and_then(|reply| {
            clean_rewrite(&reply).ok_or_else(|| {
                CaseError::Naturalization {
                    case: file_name.to_string(),
                    reason: "oracle returned an empty rewrite".to_string(),
                }
                .into()
            })
        });
    let entry = match &rewritten {
        Ok(_) => log.success(None),
        Err(err) => log.failed(format!("{err:#}")),
    };
    if let Err(err) = append_oracle_log(ctx.store.paths(), &entry) {
        let error = format!("{err:#}");
        tracing::warn!(%error, "failed to append oracle log");
    }
    let rewritten = rewritten?;

    let fields = value
        .as_object_mut()
        .ok_or_else(|| anyhow!("case {file_name} is not a JSON object"))?;
    fields.insert("input".to_string(), Value::String(rewritten));
    ctx.store
        .write_value(Stage::Naturalized, kind, domain, file_name, &value)?;
    Ok(())
}

/// Trim the reply and drop one pair of wrapping quotes; `None` when nothing is left.
fn clean_rewrite(reply: &str) -> Option<String> {
    let trimmed = reply.trim();
    let unquoted = [('"', '"'), ('\'', '\''), ('\u{201c}', '\u{201d}')]
        .iter()
        .find_map(|(open, close)| {
            trimmed
                .strip_prefix(*open)
                .and_then(|rest| rest.strip_suffix(*close))
        })
        .unwrap_or(trimmed)
        .trim();
    (!unquoted.is_empty()).then(|| unquoted.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{fixture_context, FakeOracle};
    use crate::store::{load_oracle_log, ArtifactName, OracleOutcome};
    use serde_json::json;

    const RAW_NAME: &str = "Transfer_POST_Easy_1_20240501_093000_0a1b2c3d.json";

    fn seed_raw(ctx: &PipelineContext) -> Value {
        let value = json!({
            "difficulty": "Easy",
            "input": "transfer 50 EUR from acct A to acct B",
            "output": {"method": "POST", "endpoint": "/Transfer",
                       "body": {"from": "A", "to": "B", "amount": 50, "currency": "EUR"}},
            "reviewer": "ops-team"
        });
        ctx.store
            .write_value(Stage::Raw, TargetKind::Api, "Accounts", RAW_NAME, &value)
            .expect("seed raw");
        value
    }

    #[test]
    fn rewrites_only_the_input() {
        let root = tempfile::tempdir().expect("tempdir");
        let ctx = fixture_context(root.path());
        let raw = seed_raw(&ctx);
        let oracle = FakeOracle::replying(&[
            "  \"Hey, could you move 50 euros from account A over to account B?\"\n",
        ]);

        let summary =
            naturalize_domain(&ctx, &oracle, TargetKind::Api, "Accounts").expect("naturalize");
        assert_eq!(summary.naturalized, 1);

        let natural = ctx
            .store
            .read_value(Stage::Naturalized, TargetKind::Api, "Accounts", RAW_NAME)
            .expect("read naturalized");
        assert_eq!(
            natural["input"],
            json!("Hey, could you move 50 euros from account A over to account B?")
        );
        for field in ["difficulty", "output", "reviewer"] {
            assert_eq!(natural[field], raw[field], "{field} must survive unchanged");
        }

        let calls = oracle.calls.borrow();
        assert!(calls[0].user.contains("\"endpoint\":\"/Transfer\""));
        assert!(calls[0].system.contains("Never change an ID"));
        assert!(calls[0].grounding.is_none());
    }

    #[test]
    fn non_input_bytes_match_the_raw_file() {
        let root = tempfile::tempdir().expect("tempdir");
        let ctx = fixture_context(root.path());
        let case = TestCase::from_value(
            TargetKind::Api,
            json!({"difficulty": "Easy", "input": "Move 50 EUR from account A to account B",
                   "output": {"method": "POST", "endpoint": "/Transfer",
                              "body": {"from": "A", "to": "B", "amount": 50, "currency": "EUR"}}}),
        )
        .expect("decode case");
        let mut name = ArtifactName::new("Transfer_POST", "Easy", 1, chrono::Local::now());
        let file_name = ctx
            .store
            .append_new(TargetKind::Api, "Accounts", &mut name, &case)
            .expect("append raw");
        let oracle = FakeOracle::replying(&["Could you send 50 euros from A to B?"]);

        naturalize_domain(&ctx, &oracle, TargetKind::Api, "Accounts").expect("naturalize");

        let text = |stage: Stage| {
            let path = ctx
                .store
                .paths()
                .artifact_path(stage, TargetKind::Api, "Accounts", &file_name);
            let text = std::fs::read_to_string(path).expect("read case file");
            text.lines()
                .filter(|line| !line.trim_start().starts_with("\"input\""))
                .map(str::to_string)
                .collect::<Vec<_>>()
        };
        let raw = text(Stage::Raw);
        assert!(raw.iter().any(|line| line.contains("\"method\": \"POST\"")));
        assert_eq!(raw, text(Stage::Naturalized));
    }

    #[test]
    fn mirrored_cases_are_skipped_on_rerun() {
        let root = tempfile::tempdir().expect("tempdir");
        let ctx = fixture_context(root.path());
        seed_raw(&ctx);
        let oracle = FakeOracle::replying(&["Please move fifty euros from A to B."]);

        naturalize_domain(&ctx, &oracle, TargetKind::Api, "Accounts").expect("first pass");
        ctx.store
            .promote(Stage::Naturalized, Stage::Validated, TargetKind::Api, "Accounts", RAW_NAME)
            .expect("promote");
        let summary =
            naturalize_domain(&ctx, &oracle, TargetKind::Api, "Accounts").expect("second pass");

        assert_eq!(summary.skipped, 1);
        assert_eq!(oracle.call_count(), 1);
        assert!(!ctx
            .store
            .exists(Stage::Naturalized, TargetKind::Api, "Accounts", RAW_NAME));
    }

    #[test]
    fn failed_rewrite_leaves_case_unmirrored() {
        let root = tempfile::tempdir().expect("tempdir");
        let ctx = fixture_context(root.path());
        seed_raw(&ctx);
        let oracle = FakeOracle::default();
        oracle.push_failure("timeout talking to model");

        let summary =
            naturalize_domain(&ctx, &oracle, TargetKind::Api, "Accounts").expect("naturalize");
        assert_eq!(summary.failed, 1);
        assert!(!ctx
            .store
            .exists(Stage::Naturalized, TargetKind::Api, "Accounts", RAW_NAME));

        oracle.push_reply("\"\"");
        let summary =
            naturalize_domain(&ctx, &oracle, TargetKind::Api, "Accounts").expect("retry");
        assert_eq!(summary.failed, 1, "an empty rewrite is a failure too");

        let log = load_oracle_log(ctx.store.paths()).expect("oracle log");
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|entry| entry.outcome == OracleOutcome::Failed));
    }

    #[test]
    fn clean_rewrite_strips_one_quote_pair() {
        assert_eq!(clean_rewrite("  plain text \n").as_deref(), Some("plain text"));
        assert_eq!(clean_rewrite("\"quoted\"").as_deref(), Some("quoted"));
        assert_eq!(clean_rewrite("'single'").as_deref(), Some("single"));
        assert_eq!(
            clean_rewrite("\u{201c}curly\u{201d}").as_deref(),
            Some("curly")
        );
        assert_eq!(
            clean_rewrite("\"\"nested\"\"").as_deref(),
            Some("\"nested\"")
        );
        assert_eq!(clean_rewrite("   "), None);
    }
}
