//! Target surfaces a case output is checked against.
use crate::error::CaseError;
use crate::store::HttpMethod;
use anyhow::{anyhow, Result};
use serde_json::Value;
use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::time::Duration;

/// Largest response body kept for `error_log.response_text`.
const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HttpReply {
    pub(crate) status: u16,
    pub(crate) body: String,
}

/// Verb-dispatching HTTP client. Non-success statuses are replies, not errors;
/// an `Err` means the request never completed.
pub(crate) trait HttpExecutor {
    fn execute(&self, method: HttpMethod, url: &str, body: Option<&Value>) -> Result<HttpReply>;
}

/// Blocking client over `ureq` with one global timeout per request.
pub(crate) struct UreqExecutor {
    agent: ureq::Agent,
}

impl UreqExecutor {
    pub(crate) fn new(timeout_secs: u64) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(timeout_secs)))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl HttpExecutor for UreqExecutor {
    fn execute(&self, method: HttpMethod, url: &str, body: Option<&Value>) -> Result<HttpReply> {
        // GET and DELETE carry a body when the case has one.
        let sent = match (method, body) {
            (HttpMethod::Get, None) => self.agent.get(url).call(),
            (HttpMethod::Get, Some(body)) => self.agent.get(url).force_send_body().send_json(body),
            (HttpMethod::Delete, None) => self.agent.delete(url).call(),
            (HttpMethod::Delete, Some(body)) => {
                self.agent.delete(url).force_send_body().send_json(body)
            }
            (HttpMethod::Post, Some(body)) => self.agent.post(url).send_json(body),
            (HttpMethod::Post, None) => self.agent.post(url).send_empty(),
            (HttpMethod::Put, Some(body)) => self.agent.put(url).send_json(body),
            (HttpMethod::Put, None) => self.agent.put(url).send_empty(),
            (HttpMethod::Patch, Some(body)) => self.agent.patch(url).send_json(body),
            (HttpMethod::Patch, None) => self.agent.patch(url).send_empty(),
        };
        let mut response = sent.map_err(|err| anyhow!("{method} {url}: {err}"))?;
        let status = response.status().as_u16();
        // The status alone decides the verdict; a body that cannot be read is
        // reported in its place.
        let body = match response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_vec()
        {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => {
                tracing::warn!(%method, url, status, error = %err, "response body unreadable");
                format!("<unreadable response body: {err}>")
            }
        };
        tracing::debug!(%method, url, status, "http call complete");
        Ok(HttpReply { status, body })
    }
}

/// Parse `sql` and require exactly one statement, a query.
pub(crate) fn check_sql(sql: &str) -> std::result::Result<(), CaseError> {
    let statements = Parser::parse_sql(&GenericDialect {}, sql)
        .map_err(|err| CaseError::Syntax(err.to_string()))?;
    match statements.as_slice() {
        [] => Err(CaseError::Syntax("no statement found".to_string())),
        [Statement::Query(_)] => Ok(()),
        [other] => Err(CaseError::Syntax(format!("not a SELECT query: {other}"))),
        many => Err(CaseError::Syntax(format!(
            "expected a single statement, found {}",
            many.len()
        ))),
    }
}
