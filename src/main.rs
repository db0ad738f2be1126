//! `caseforge`: LM-driven synthesis, naturalization, and validation of
//! API/SQL test cases.
mod cli;
mod domain;
mod error;
mod oracle;
mod pipeline;
mod store;
mod util;

use anyhow::{anyhow, Result};
use clap::Parser;
use cli::{Command, RootArgs};
use pipeline::{PipelineContext, UreqExecutor};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() {
    let args = RootArgs::parse();
    init_tracing(args.verbose);
    if let Err(err) = run(args) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: RootArgs) -> Result<()> {
    let root = args.root;
    match args.command {
        Command::Init(init) => run_init(&root, init.force),
        Command::Synthesize(synth) => {
            let ctx = PipelineContext::load(root)?;
            let oracle = ctx.oracle(synth.lm.as_deref())?;
            let count = synth.count.map(|n| n as usize);
            let summary =
                pipeline::run_synthesize(&ctx, &oracle, &synth.scope.selection(), count)?;
            println!(
                "synthesize: {} written ({} targets requested, {} saturated, {} failed)",
                summary.written, summary.requested, summary.saturated, summary.failed
            );
            Ok(())
        }
        Command::Naturalize(natural) => {
            let ctx = PipelineContext::load(root)?;
            let oracle = ctx.oracle(natural.lm.as_deref())?;
            let summary = pipeline::run_naturalize(&ctx, &oracle, &natural.scope.selection())?;
            println!(
                "naturalize: {} naturalized, {} already mirrored, {} failed",
                summary.naturalized, summary.skipped, summary.failed
            );
            Ok(())
        }
        Command::Audit(report_args) => {
            let ctx = PipelineContext::load(root)?;
            let report = pipeline::run_audit(&ctx, &report_args.scope.selection())?;
            if report_args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for missing in &report.missing {
                    println!("missing {} {}/{}", missing.kind, missing.domain, missing.file);
                }
                for drifted in &report.drifted {
                    println!(
                        "drifted {} {}/{} ({}: {})",
                        drifted.kind,
                        drifted.domain,
                        drifted.file,
                        drifted.stage,
                        drifted.fields.join(", ")
                    );
                }
                println!(
                    "audit: {} checked, {} missing, {} drifted",
                    report.checked,
                    report.missing.len(),
                    report.drifted.len()
                );
            }
            if !report.is_clean() {
                tracing::warn!(
                    missing = report.missing.len(),
                    drifted = report.drifted.len(),
                    "audit found discrepancies"
                );
            }
            Ok(())
        }
        Command::Validate(scope) => {
            let ctx = PipelineContext::load(root)?;
            let executor = UreqExecutor::new(ctx.config.http_timeout_secs);
            let summary = pipeline::run_validate(&ctx, &executor, &scope.selection())?;
            println!(
                "validate: {} passed, {} failed, {} unsupported, {} errors, {} domains without base URL",
                summary.passed,
                summary.failed,
                summary.unsupported,
                summary.errors,
                summary.skipped_domains
            );
            Ok(())
        }
        Command::Run(run_args) => {
            let ctx = PipelineContext::load(root)?;
            let oracle = ctx.oracle(run_args.lm.as_deref())?;
            let executor = UreqExecutor::new(ctx.config.http_timeout_secs);
            let count = run_args.count.map(|n| n as usize);
            pipeline::run_pipeline(&ctx, &oracle, &executor, &run_args.scope.selection(), count)?;
            Ok(())
        }
        Command::Status(report_args) => {
            let ctx = PipelineContext::load(root)?;
            pipeline::run_status(&ctx, &report_args.scope.selection(), report_args.json)
        }
    }
}

fn run_init(root: &Path, force: bool) -> Result<()> {
    let config_path = root.join(store::CONFIG_FILE_NAME);
    if config_path.is_file() && !force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            config_path.display()
        ));
    }
    store::write_config(root, &store::default_config())?;
    println!("wrote {}", util::display_path(&config_path, None));
    Ok(())
}
