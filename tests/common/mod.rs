//! Common test utilities and helpers for repomirror tests

#![allow(dead_code)]

use async_trait::async_trait;
use repomirror::error::SyncOutcome;
use repomirror::{Logger, Options, SyncContext, SyncError};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// One recorded command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl Invocation {
    pub fn subcommand(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }
}

/// Command runner that records invocations and replays scripted outcomes.
///
/// Outcomes are consumed in order; once the script runs out every command
/// succeeds.
#[derive(Default)]
pub struct RecordingRunner {
    pub invocations: Mutex<Vec<Invocation>>,
    script: Mutex<VecDeque<bool>>,
}

impl RecordingRunner {
    pub fn scripted(outcomes: &[bool]) -> Self {
        Self {
            invocations: Mutex::new(Vec::new()),
            script: Mutex::new(outcomes.iter().copied().collect()),
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn subcommands(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.subcommand().to_string()).collect()
    }
}

#[async_trait]
impl repomirror::CommandRunner for RecordingRunner {
    async fn run(&self, program: &str, args: &[String], working_dir: &Path) -> SyncOutcome<String> {
        self.invocations.lock().unwrap().push(Invocation {
            program: program.to_string(),
            args: args.to_vec(),
            working_dir: working_dir.to_path_buf(),
        });

        let ok = self.script.lock().unwrap().pop_front().unwrap_or(true);
        if ok {
            Ok(String::new())
        } else {
            Err(SyncError::Process {
                command: format!("{} {}", program, args.join(" ")),
                working_dir: working_dir.to_path_buf(),
                exit: "exit code 1".to_string(),
            })
        }
    }
}

/// Logger that keeps every line, tagged with its level
#[derive(Default)]
pub struct RecordingLogger {
    pub lines: Mutex<Vec<(&'static str, String)>>,
}

impl RecordingLogger {
    pub fn at(&self, level: &str) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl Logger for RecordingLogger {
    fn info(&self, msg: &str) {
        self.lines.lock().unwrap().push(("info", msg.to_string()));
    }

    fn success(&self, msg: &str) {
        self.lines.lock().unwrap().push(("success", msg.to_string()));
    }

    fn error(&self, msg: &str) {
        self.lines.lock().unwrap().push(("error", msg.to_string()));
    }
}

pub fn context(root: &Path, dry_run: bool) -> (SyncContext, Arc<RecordingLogger>) {
    let logger = Arc::new(RecordingLogger::default());
    let opts = Options {
        user: Some("alice".to_string()),
        auth_token: Some("secret".to_string()),
        dry_run,
    };
    let ctx = SyncContext::new(root, opts, logger.clone()).expect("valid options");
    (ctx, logger)
}

/// Serve `pages` for `endpoint`, followed by an empty page
pub async fn mount_pages(server: &MockServer, endpoint: &str, pages: Vec<Value>) {
    let count = pages.len();
    for (index, page) in pages.into_iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .and(query_param("page", (index + 1).to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(page))
            .mount(server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path(endpoint))
        .and(query_param("page", (count + 1).to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

pub fn repo(name: &str, owner: &str) -> Value {
    json!({ "name": name, "owner": { "login": owner } })
}
