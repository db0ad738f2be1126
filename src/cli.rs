//! CLI argument parsing for the case pipeline.
//!
//! The CLI is thin: every command maps onto one pipeline entry point and the
//! shared `--root`/`--verbose` flags.
use crate::pipeline::Selection;
use crate::store::TargetKind;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "caseforge",
    version,
    about = "Synthesize, naturalize, audit, and validate API/SQL test cases with an LM oracle",
    after_help = "Commands:\n  init                 Write caseforge.json\n  synthesize           Generate RAW cases from domain documentation\n  naturalize           Rewrite RAW inputs into NATURALIZED cases\n  audit                Compare RAW and NATURALIZED cases\n  validate             Execute NATURALIZED cases and promote passes\n  run                  All stages in order, per domain\n  status               Count cases per stage\n\nExamples:\n  caseforge init\n  caseforge run --lm 'llm -m gpt-4o-mini'\n  caseforge synthesize --domain Accounts --kind api --count 2\n  caseforge audit --json\n  caseforge status --kind sql",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Pipeline root holding caseforge.json
    #[arg(long, value_name = "DIR", default_value = ".", global = true)]
    pub root: PathBuf,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a caseforge.json stub
    Init(InitArgs),
    /// Generate RAW cases from domain documentation
    Synthesize(SynthesizeArgs),
    /// Rewrite RAW inputs into NATURALIZED cases
    Naturalize(NaturalizeArgs),
    /// Compare RAW and NATURALIZED cases without changing either
    Audit(ReportArgs),
    /// Execute NATURALIZED cases and promote passes to VALIDATED
    Validate(ScopeArgs),
    /// Run every stage in order, per domain
    Run(SynthesizeArgs),
    /// Count cases per stage
    Status(ReportArgs),
}

/// Init command inputs.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing caseforge.json
    #[arg(long)]
    pub force: bool,
}

/// Domain/kind narrowing shared by every stage.
#[derive(Args, Debug, Clone)]
pub struct ScopeArgs {
    /// Only this domain
    #[arg(long, value_name = "NAME")]
    pub domain: Option<String>,

    /// Only this target kind
    #[arg(long, value_enum)]
    pub kind: Option<TargetKind>,
}

impl ScopeArgs {
    pub(crate) fn selection(&self) -> Selection {
        Selection {
            domain: self.domain.clone(),
            kind: self.kind,
        }
    }
}

/// Synthesis (and full run) inputs.
#[derive(Args, Debug)]
pub struct SynthesizeArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// LM command (overrides lm_command and CASEFORGE_LM_COMMAND)
    #[arg(long, value_name = "CMD")]
    pub lm: Option<String>,

    /// Cases requested per difficulty (overrides cases_per_difficulty)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub count: Option<u32>,
}

/// Naturalization inputs.
#[derive(Args, Debug)]
pub struct NaturalizeArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// LM command (overrides lm_command and CASEFORGE_LM_COMMAND)
    #[arg(long, value_name = "CMD")]
    pub lm: Option<String>,
}

/// Read-only report inputs (audit, status).
#[derive(Args, Debug)]
pub struct ReportArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}
