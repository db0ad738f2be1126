//! Generative oracle client.
//!
//! The oracle is any local command that reads a prompt and prints a reply:
//! `llm`, `ollama run`, a wrapper script around a hosted model. Synthesis and
//! naturalization only see the [`Oracle`] trait, so tests swap in a fake.
//!
//! # Prompt protocol
//!
//! Argument placeholders are substituted before spawning:
//!
//! - `{system}`: the system instructions; when present, stdin carries only the
//!   user content.
//! - `{file}`: path of a grounding document; when absent, the document is
//!   appended to stdin instead.
//!
//! Without `{system}` the command receives on stdin:
//!
//! ```text
//! # Instructions
//! <system>
//!
//! # Request
//! <user>
//!
//! # Attached document: API_Accounts.json
//! <document>
//! ```
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Instant;

const SYSTEM_PLACEHOLDER: &str = "{system}";
const FILE_PLACEHOLDER: &str = "{file}";

/// A text-completion service.
pub trait Oracle {
    /// Complete `user` under `system` instructions, optionally grounded on a
    /// document. Returns the trimmed reply.
    fn complete(&self, system: &str, user: &str, grounding: Option<&Path>) -> Result<String>;
}

/// Oracle backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    argv: Vec<String>,
}

impl CommandOracle {
    /// Parse a shell-quoted command line.
    pub fn from_command_line(command: &str) -> Result<Self> {
        let argv =
            shell_words::split(command).with_context(|| format!("parse LM command: {command}"))?;
        if argv.is_empty() {
            return Err(anyhow!("LM command is empty"));
        }
        Ok(Self { argv })
    }

    fn render(
        &self,
        system: &str,
        user: &str,
        grounding: Option<&Path>,
    ) -> Result<(Vec<String>, String)> {
        let takes_system = self.argv.iter().any(|arg| arg.contains(SYSTEM_PLACEHOLDER));
        let takes_file = self.argv.iter().any(|arg| arg.contains(FILE_PLACEHOLDER));
        let file_arg = grounding
            .map(|path| path.display().to_string())
            .unwrap_or_default();

        let argv = self
            .argv
            .iter()
            .map(|arg| {
                arg.replace(SYSTEM_PLACEHOLDER, system)
                    .replace(FILE_PLACEHOLDER, &file_arg)
            })
            .collect();

        let mut stdin = if takes_system {
            user.to_string()
        } else {
            format!("# Instructions\n{}\n\n# Request\n{}", system.trim_end(), user)
        };
        if let Some(path) = grounding.filter(|_| !takes_file) {
            let document = fs::read_to_string(path)
                .with_context(|| format!("read grounding document {}", path.display()))?;
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            stdin.push_str(&format!("\n\n# Attached document: {name}\n{document}"));
        }
        Ok((argv, stdin))
    }
}

impl Oracle for CommandOracle {
    fn complete(&self, system: &str, user: &str, grounding: Option<&Path>) -> Result<String> {
        let (argv, prompt) = self.render(system, user, grounding)?;

        let start = Instant::now();
        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn LM command: {}", argv[0]))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .context("write prompt to LM stdin")?;
        }

        let output = child.wait_with_output().context("wait for LM command")?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            elapsed_ms,
            prompt_bytes = prompt.len(),
            response_bytes = output.stdout.len(),
            "lm invoke complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "LM command failed with status {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        let text = String::from_utf8(output.stdout).context("decode LM stdout as UTF-8")?;
        Ok(text.trim().to_string())
    }
}
