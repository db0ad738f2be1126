//! Pipeline-owned configuration, on-disk case types, and the artifact store.
//!
//! The store module centralizes schema versions, path handling, and typed JSON
//! structures so every stage reads and writes the same layout.
/// Current schema version for `caseforge.json`.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;
/// Current schema version for `oracle_log.jsonl` entries.
pub const ORACLE_LOG_SCHEMA_VERSION: u32 = 1;

/// Config file name at the pipeline root.
pub const CONFIG_FILE_NAME: &str = "caseforge.json";
/// Environment variable consulted last when resolving the oracle command.
pub const LM_COMMAND_ENV: &str = "CASEFORGE_LM_COMMAND";

mod artifacts;
mod config;
mod oracle_log;
mod paths;
mod types;

pub use artifacts::{ArtifactName, ArtifactStore, StoredCase};
pub use config::{default_config, load_config, resolve_lm_command, validate_config, write_config};
pub use oracle_log::{
    append_oracle_log, load_oracle_log, OracleCallKind, OracleLogBuilder, OracleLogEntry,
    OracleOutcome,
};
pub use paths::StorePaths;
pub use types::*;
