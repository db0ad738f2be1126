//! Shared test infrastructure for CLI integration tests.

use serde_json::{json, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// A pipeline root in a temp dir, driven through the built binary.
pub struct Workspace {
    dir: TempDir,
}

fn manifest_dir() -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()))
}

fn write(path: &Path, text: &str) {
    fs::create_dir_all(path.parent().expect("parent dir")).expect("create parent");
    fs::write(path, text).expect("write file");
}

impl Workspace {
    /// Empty pipeline root holding the `Accounts` documentation.
    pub fn with_accounts_docs() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let domain = dir.path().join("system_documentation").join("Accounts");
        write(
            &domain.join("DB_Accounts.json"),
            &json!({"tables": [{"name": "accounts",
                "columns": [{"name": "id", "format": "string"},
                            {"name": "balance", "format": "number"}]}]})
            .to_string(),
        );
        write(
            &domain.join("API_Accounts.json"),
            &json!({"paths": {"/Transfer": {"post": {"summary": "Move money"}}}}).to_string(),
        );
        write(&domain.join("Accounts.txt"), "Accounts hold customer balances.");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Run `caseforge <args> --root <workspace>`.
    pub fn caseforge(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_caseforge"))
            .args(args)
            .arg("--root")
            .arg(self.root())
            .env_remove("CASEFORGE_LM_COMMAND")
            .env("RUST_LOG", "warn")
            .output()
            .expect("run caseforge")
    }

    /// Point the config at the mock oracle and an unreachable API host.
    pub fn configure_mock_oracle(&self) {
        let path = self.root().join("caseforge.json");
        let text = fs::read_to_string(&path).expect("read config");
        let mut config: Value = serde_json::from_str(&text).expect("parse config");
        let script = manifest_dir().join("tests/fixtures/mock-oracle.sh");
        config["lm_command"] = json!(format!("sh {}", script.display()));
        config["base_urls"] = json!({"Accounts": "http://127.0.0.1:9"});
        config["http_timeout_secs"] = json!(5);
        write(
            &path,
            &serde_json::to_string_pretty(&config).expect("serialize config"),
        );
    }

    /// Parse the stdout of a `--json` command.
    pub fn json(&self, args: &[&str]) -> Value {
        let output = self.caseforge(args);
        assert!(
            output.status.success(),
            "caseforge {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("parse JSON output")
    }

    /// File names under `<store>/<stage>/<KIND>/Accounts/`.
    pub fn stored(&self, stage: &str, kind: &str) -> Vec<String> {
        let dir = self
            .root()
            .join("testcases")
            .join(stage)
            .join(kind)
            .join("Accounts");
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
