use super::*;
use crate::pipeline::test_support::{fixture_context, FakeOracle};
use crate::store::{load_oracle_log, CallOutput, OracleOutcome, SqlQuery};
use serde_json::{json, Map};

const TRANSFER_EASY: &str = r#"[{"difficulty":"Easy","input":"Move 50 EUR from account A to account B","output":{"method":"POST","endpoint":"/Transfer","body":{"from":"A","to":"B","amount":50,"currency":"EUR"}}}]"#;

fn raw_names(ctx: &PipelineContext, kind: TargetKind, domain: &str) -> Vec<String> {
    ctx.store.list(Stage::Raw, kind, domain).expect("list raw")
}

fn sql_case(difficulty: &str, input: &str) -> TestCase {
    TestCase {
        difficulty: difficulty.to_string(),
        input: input.to_string(),
        output: CallOutput::Sql(SqlQuery {
            sql: "SELECT id FROM cards".to_string(),
            extra: Map::new(),
        }),
        error_log: None,
        extra: Map::new(),
    }
}

fn seed_raw(ctx: &PipelineContext, file_name: &str, case: &TestCase) {
    let value = serde_json::to_value(case).expect("encode case");
    ctx.store
        .write_value(Stage::Raw, TargetKind::Sql, "Cards", file_name, &value)
        .expect("seed case");
}

#[test]
fn transfer_generation_writes_exactly_one_raw_file() {
    let root = tempfile::tempdir().expect("tempdir");
    let ctx = fixture_context(root.path());
    let oracle = FakeOracle::replying(&[TRANSFER_EASY]);

    let summary =
        synthesize_domain(&ctx, &oracle, TargetKind::Api, "Accounts", None).expect("synthesize");

    assert_eq!(summary.requested, 1);
    assert_eq!(summary.written, 1);
    let names = raw_names(&ctx, TargetKind::Api, "Accounts");
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("Transfer_POST_Easy_1_"), "{}", names[0]);

    let case = ctx
        .store
        .read_case(Stage::Raw, TargetKind::Api, "Accounts", &names[0])
        .expect("read case");
    assert_eq!(case.input, "Move 50 EUR from account A to account B");
    match case.output {
        CallOutput::Api(call) => {
            assert_eq!(call.method, "POST");
            assert_eq!(call.body, Some(json!({"from":"A","to":"B","amount":50,"currency":"EUR"})));
        }
        other => panic!("expected API output, got {other:?}"),
    }

    let calls = oracle.calls.borrow();
    assert_eq!(calls.len(), 1, "GET operation is not a target by default");
    assert!(calls[0].user.contains("POST /Transfer"));
    assert!(calls[0].user.contains("1 Easy, 1 Medium, 1 Hard, 1 Extra Hard"));
    assert!(calls[0].system.contains("Extra Hard"));
    assert!(!calls[0].system.contains("{top_label}"));
    let grounding = calls[0].grounding.as_ref().expect("interface attached");
    assert!(grounding.ends_with("Accounts/API_Accounts.json"));

    let log = load_oracle_log(ctx.store.paths()).expect("oracle log");
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].outcome, OracleOutcome::Success);
    assert_eq!(log[0].cases, Some(1));
}

#[test]
fn prose_wrapped_array_is_recovered_and_metered() {
    let root = tempfile::tempdir().expect("tempdir");
    let ctx = fixture_context(root.path());
    let reply = format!("Sure! Here are the cases:\n```json\n{TRANSFER_EASY}\n```\nEnjoy.");
    let oracle = FakeOracle::replying(&[&reply]);

    let summary =
        synthesize_domain(&ctx, &oracle, TargetKind::Api, "Accounts", None).expect("synthesize");

    assert_eq!(summary.written, 1);
    let log = load_oracle_log(ctx.store.paths()).expect("oracle log");
    assert_eq!(log[0].outcome, OracleOutcome::Recovered);
}

#[test]
fn malformed_generation_skips_the_cell_without_writing() {
    let root = tempfile::tempdir().expect("tempdir");
    let ctx = fixture_context(root.path());
    let oracle = FakeOracle::replying(&["I am unable to produce test cases today."]);

    let summary =
        synthesize_domain(&ctx, &oracle, TargetKind::Api, "Accounts", None).expect("synthesize");

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.written, 0);
    assert!(raw_names(&ctx, TargetKind::Api, "Accounts").is_empty());
    let log = load_oracle_log(ctx.store.paths()).expect("oracle log");
    assert_eq!(log[0].outcome, OracleOutcome::Failed);
    assert!(log[0]
        .error
        .as_deref()
        .is_some_and(|error| error.contains("malformed generation")));
}

#[test]
fn failing_operation_does_not_stop_the_next_one() {
    let root = tempfile::tempdir().expect("tempdir");
    let mut ctx = fixture_context(root.path());
    ctx.config.include_get_operations = true;
    let oracle = FakeOracle::default();
    oracle.push_failure("connection reset");
    oracle.push_reply(TRANSFER_EASY);

    let summary =
        synthesize_domain(&ctx, &oracle, TargetKind::Api, "Accounts", None).expect("synthesize");

    assert_eq!(oracle.call_count(), 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.written, 1);
    let names = raw_names(&ctx, TargetKind::Api, "Accounts");
    assert!(names[0].starts_with("Transfer_POST_"));
}

#[test]
fn difficulties_are_normalized_or_tagged_unknown() {
    let root = tempfile::tempdir().expect("tempdir");
    let ctx = fixture_context(root.path());
    let reply = json!([
        {"difficulty": "very-hard", "input": "a", "output": {"sql": "SELECT id FROM cards"}},
        {"difficulty": "Impossible", "input": "b", "output": {"sql": "SELECT id FROM cards"}},
        {"input": "c", "output": {"sql": "SELECT id FROM cards"}},
        {"difficulty": "Easy", "input": "no sql here", "output": {"query": "SELECT 1"}}
    ])
    .to_string();
    let oracle = FakeOracle::replying(&[&reply]);

    let summary =
        synthesize_domain(&ctx, &oracle, TargetKind::Sql, "Cards", None).expect("synthesize");

    assert_eq!(summary.written, 3, "the element without `sql` is skipped");
    let names = raw_names(&ctx, TargetKind::Sql, "Cards");
    assert!(names.iter().any(|n| n.starts_with("Cards_Extra-Hard_1_")));
    assert!(names.iter().any(|n| n.starts_with("Cards_Unknown_1_")));
    assert!(names.iter().any(|n| n.starts_with("Cards_Unknown_2_")));

    let difficulties: Vec<String> = ctx
        .store
        .load_cases(Stage::Raw, TargetKind::Sql, "Cards")
        .expect("load")
        .into_iter()
        .map(|stored| stored.case.difficulty)
        .collect();
    assert!(difficulties.contains(&"Extra Hard".to_string()));
    assert_eq!(difficulties.iter().filter(|d| *d == "Unknown").count(), 2);
}

#[test]
fn history_is_shown_and_sequence_continues() {
    let root = tempfile::tempdir().expect("tempdir");
    let ctx = fixture_context(root.path());
    let first = json!([{"difficulty": "Easy", "input": "How many cards exist?",
        "output": {"sql": "SELECT COUNT(*) FROM cards"}}])
    .to_string();
    let second = json!([{"difficulty": "Easy", "input": "List every card id.",
        "output": {"sql": "SELECT id FROM cards"}}])
    .to_string();
    let oracle = FakeOracle::replying(&[&first, &second]);

    synthesize_domain(&ctx, &oracle, TargetKind::Sql, "Cards", None).expect("first pass");
    synthesize_domain(&ctx, &oracle, TargetKind::Sql, "Cards", None).expect("second pass");

    let calls = oracle.calls.borrow();
    assert!(!calls[0].user.contains("How many cards exist?"));
    assert!(calls[1].user.contains("How many cards exist?"));
    assert!(calls[1].user.contains("# Tables\n- cards\n  - id\n"));
    assert!(calls[1].grounding.is_none());

    let names = raw_names(&ctx, TargetKind::Sql, "Cards");
    assert_eq!(names.len(), 2);
    assert!(names.iter().any(|n| n.starts_with("Cards_Easy_1_")));
    assert!(names.iter().any(|n| n.starts_with("Cards_Easy_2_")));
}

#[test]
fn quota_stops_requests_once_met() {
    let root = tempfile::tempdir().expect("tempdir");
    let mut ctx = fixture_context(root.path());
    ctx.config.max_cases_per_difficulty = Some(1);
    for (seq, difficulty) in ["Easy", "Medium", "Hard"].iter().enumerate() {
        let name = format!("Cards_{difficulty}_1_20240101_00000{seq}_0000000{seq}.json");
        seed_raw(&ctx, &name, &sql_case(difficulty, "x"));
    }
    let reply = json!([{"difficulty": "Extra Hard", "input": "top", "output": {"sql": "SELECT id FROM cards"}}])
        .to_string();
    let oracle = FakeOracle::replying(&[&reply]);

    let first =
        synthesize_domain(&ctx, &oracle, TargetKind::Sql, "Cards", None).expect("synthesize");
    assert_eq!(first.requested, 1);
    {
        let calls = oracle.calls.borrow();
        assert!(calls[0].user.contains("Write 1 new test cases: 1 Extra Hard."));
    }

    let second =
        synthesize_domain(&ctx, &oracle, TargetKind::Sql, "Cards", None).expect("synthesize");
    assert_eq!(second.saturated, 1);
    assert_eq!(oracle.call_count(), 1, "no call once every difficulty is full");
}

#[test]
fn context_limit_keeps_most_recent_cases() {
    let root = tempfile::tempdir().expect("tempdir");
    let mut ctx = fixture_context(root.path());
    ctx.config.context_limit = Some(1);
    seed_raw(
        &ctx,
        "Cards_Easy_1_20240101_000000_aaaaaaaa.json",
        &sql_case("Easy", "older request"),
    );
    seed_raw(
        &ctx,
        "Cards_Easy_2_20240301_000000_bbbbbbbb.json",
        &sql_case("Easy", "newer request"),
    );
    let oracle = FakeOracle::replying(&["[]"]);

    synthesize_domain(&ctx, &oracle, TargetKind::Sql, "Cards", None).expect("synthesize");

    let calls = oracle.calls.borrow();
    assert!(calls[0].user.contains("newer request"));
    assert!(!calls[0].user.contains("older request"));
}

#[test]
fn api_needs_interface_document() {
    let root = tempfile::tempdir().expect("tempdir");
    let ctx = fixture_context(root.path());
    let oracle = FakeOracle::default();

    let err = synthesize_domain(&ctx, &oracle, TargetKind::Api, "Cards", None)
        .expect_err("Cards has no API document");
    assert!(matches!(
        err.downcast_ref::<CaseError>(),
        Some(CaseError::MissingDocumentation { .. })
    ));
    assert_eq!(oracle.call_count(), 0);
}

#[test]
fn parse_case_array_prefers_strict_json() {
    let (items, recovered) = parse_case_array("[{\"a\": 1}]").expect("parse");
    assert_eq!(items.len(), 1);
    assert!(!recovered);

    let (items, recovered) = parse_case_array("noise [1, 2] trailing").expect("parse");
    assert_eq!(items, vec![json!(1), json!(2)]);
    assert!(recovered);

    assert!(matches!(
        parse_case_array("{\"difficulty\": \"Easy\"}"),
        Err(CaseError::MalformedGeneration(_))
    ));
    assert!(matches!(
        parse_case_array("[broken"),
        Err(CaseError::MalformedGeneration(_))
    ));
}
