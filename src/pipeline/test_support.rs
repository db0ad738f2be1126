//! Scripted collaborators and fixture builders for stage tests.
use super::execute::HttpReply;
use super::{HttpExecutor, PipelineContext};
use crate::oracle::Oracle;
use crate::store::{default_config, HttpMethod};
use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

/// One recorded oracle call.
#[derive(Debug, Clone)]
pub(crate) struct OracleCall {
    pub(crate) system: String,
    pub(crate) user: String,
    pub(crate) grounding: Option<PathBuf>,
}

/// Oracle that replays queued replies; an `Err` entry simulates a transport
/// failure.
#[derive(Default)]
pub(crate) struct FakeOracle {
    replies: RefCell<VecDeque<Result<String, String>>>,
    pub(crate) calls: RefCell<Vec<OracleCall>>,
}

impl FakeOracle {
    pub(crate) fn replying(replies: &[&str]) -> Self {
        let oracle = Self::default();
        for reply in replies {
            oracle.push_reply(reply);
        }
        oracle
    }

    pub(crate) fn push_reply(&self, reply: &str) {
        self.replies.borrow_mut().push_back(Ok(reply.to_string()));
    }

    pub(crate) fn push_failure(&self, error: &str) {
        self.replies.borrow_mut().push_back(Err(error.to_string()));
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Oracle for FakeOracle {
    fn complete(&self, system: &str, user: &str, grounding: Option<&Path>) -> Result<String> {
        self.calls.borrow_mut().push(OracleCall {
            system: system.to_string(),
            user: user.to_string(),
            grounding: grounding.map(Path::to_path_buf),
        });
        match self.replies.borrow_mut().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(error)) => Err(anyhow!(error)),
            None => Err(anyhow!("fake oracle has no reply queued")),
        }
    }
}

/// One recorded HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HttpCall {
    pub(crate) method: HttpMethod,
    pub(crate) url: String,
    pub(crate) body: Option<Value>,
}

/// Executor answering every request with the next scripted reply.
#[derive(Default)]
pub(crate) struct ScriptedExecutor {
    replies: RefCell<VecDeque<Result<HttpReply, String>>>,
    pub(crate) calls: RefCell<Vec<HttpCall>>,
}

impl ScriptedExecutor {
    pub(crate) fn push_status(&self, status: u16, body: &str) {
        self.replies.borrow_mut().push_back(Ok(HttpReply {
            status,
            body: body.to_string(),
        }));
    }

    pub(crate) fn push_transport_error(&self, error: &str) {
        self.replies.borrow_mut().push_back(Err(error.to_string()));
    }
}

impl HttpExecutor for ScriptedExecutor {
    fn execute(&self, method: HttpMethod, url: &str, body: Option<&Value>) -> Result<HttpReply> {
        self.calls.borrow_mut().push(HttpCall {
            method,
            url: url.to_string(),
            body: body.cloned(),
        });
        match self.replies.borrow_mut().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(error)) => Err(anyhow!(error)),
            None => Err(anyhow!("scripted executor has no reply queued")),
        }
    }
}

/// A pipeline root with default config and the documentation of two domains:
/// `Accounts` (API + SQL, one POST and one GET operation) and `Cards` (SQL only).
pub(crate) fn fixture_context(root: &Path) -> PipelineContext {
    let docs = root.join("system_documentation");
    write(
        &docs.join("Accounts").join("DB_Accounts.json"),
        &json!({"tables": [{"name": "accounts", "description": "Customer accounts",
            "columns": [{"name": "id", "description": "Account id", "format": "string"},
                        {"name": "balance", "description": "Current balance", "format": "number"}]}]})
        .to_string(),
    );
    write(
        &docs.join("Accounts").join("API_Accounts.json"),
        &json!({"paths": {"/Transfer": {
            "post": {"summary": "Move money between accounts"},
            "get": {"summary": "List transfers"}
        }}})
        .to_string(),
    );
    write(
        &docs.join("Accounts").join("Accounts.txt"),
        "Accounts hold customer balances.",
    );
    write(
        &docs.join("Cards").join("DB_Cards.json"),
        &json!({"tables": [{"name": "cards", "columns": [{"name": "id"}]}]}).to_string(),
    );
    write(&docs.join("Cards").join("Cards.txt"), "Payment cards.");

    let mut config = default_config();
    config
        .base_urls
        .insert("Accounts".to_string(), "http://bank.test".to_string());
    PipelineContext::from_config(root.to_path_buf(), config)
}

pub(crate) fn write(path: &Path, text: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, text).expect("write file");
}
