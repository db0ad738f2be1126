//! Named failure classes of the case pipeline.
//!
//! Every variant is caught where it originates and logged; none of them aborts
//! the enclosing per-domain loop.
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CaseError {
    /// Oracle text could not be decoded as a JSON array of cases.
    #[error("malformed generation: {0}")]
    MalformedGeneration(String),

    /// The input rewrite round-trip failed; the case stays un-mirrored.
    #[error("naturalization failed for {case}: {reason}")]
    Naturalization { case: String, reason: String },

    /// The case names an HTTP verb the validator cannot dispatch.
    #[error("unsupported HTTP method {0:?}")]
    UnsupportedMethod(String),

    /// The SQL output does not parse as a query.
    #[error("SQL syntax check failed: {0}")]
    Syntax(String),

    /// A domain lacks the documents a stage needs; the domain is skipped.
    #[error("domain {domain} is missing {what} under {}", dir.display())]
    MissingDocumentation {
        domain: String,
        what: &'static str,
        dir: PathBuf,
    },
}
