//! Planner and classifier backed by an external command.
//!
//! The prompt goes to the command's stdin and its stdout is the answer. The
//! default planner command is an LLM CLI in print mode.

use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use vaultwork_core::Folder;
use vaultwork_engine::{Classification, Classifier, CollaboratorError, Planner};

const PLAN_PROMPT: &str = "You are an AI employee.

Read this item and write a plan with these sections:
## Intent
## Proposed Action
## Draft Response

When the plan is a reply, put `To:` and `Subject:` lines before the draft and
separate the draft text from them with a line containing only `---`.

ITEM:
";

const CLASSIFY_PROMPT: &str = r#"You must respond ONLY with valid JSON. Do not ask questions. Do not add explanations.

Analyze this file and respond with this exact JSON structure:
{
  "category": "Report|Email|Task|Meeting|Note",
  "summary": "one sentence summary",
  "priority": "high|medium|low",
  "destination": "Needs_Action" or "Done"
}

File content:
"#;

/// Classifier input is cut to this many characters.
const CLASSIFY_INPUT_LIMIT: usize = 2000;

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("Invalid fence regex"));
static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("Invalid object regex"));

/// Runs a configured argv with a timeout, feeding input on stdin.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }

    /// Run the command and return its trimmed stdout.
    pub async fn run(&self, input: &str) -> Result<String, CollaboratorError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(CollaboratorError::Unavailable("no command configured".to_string()));
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CollaboratorError::Unavailable(format!("{program}: {e}")))?;

        // Stdin is fed concurrently with reading stdout.
        if let Some(mut stdin) = child.stdin.take() {
            let input = input.to_string();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    tracing::debug!(error = %e, "Command closed stdin early");
                }
            });
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(CollaboratorError::Failed(format!("{program}: {e}"))),
            Err(_) => {
                tracing::warn!(command = %program, timeout_secs = self.timeout.as_secs(), "Command timed out");
                return Err(CollaboratorError::Timeout(self.timeout.as_secs()));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollaboratorError::Failed(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

pub struct CommandPlanner {
    runner: CommandRunner,
}

impl CommandPlanner {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Planner for CommandPlanner {
    async fn plan(&self, text: &str) -> Result<String, CollaboratorError> {
        self.runner.run(&format!("{PLAN_PROMPT}{text}\n")).await
    }
}

pub struct CommandClassifier {
    runner: CommandRunner,
}

impl CommandClassifier {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Classifier for CommandClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, CollaboratorError> {
        let content: String = text.chars().take(CLASSIFY_INPUT_LIMIT).collect();
        let output = self.runner.run(&format!("{CLASSIFY_PROMPT}{content}")).await?;
        parse_classification(&output)
    }
}

#[derive(Deserialize)]
struct Verdict {
    #[serde(default = "default_category")]
    category: String,
    #[serde(default)]
    summary: String,
    #[serde(default = "default_priority")]
    priority: String,
    #[serde(default)]
    destination: Option<String>,
}

fn default_category() -> String {
    "Note".to_string()
}

fn default_priority() -> String {
    "medium".to_string()
}

/// Pull the JSON verdict out of command output that may wrap it in a
/// fenced block or surrounding prose.
fn parse_classification(output: &str) -> Result<Classification, CollaboratorError> {
    let json = FENCED_JSON
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .or_else(|| JSON_OBJECT.find(output).map(|m| m.as_str()))
        .ok_or_else(|| CollaboratorError::InvalidResponse("no JSON object in classifier output".to_string()))?;

    let verdict: Verdict = serde_json::from_str(json).map_err(invalid)?;
    // Anything other than an explicit archive keeps the item.
    let destination = match verdict.destination.as_deref().map(str::parse::<Folder>) {
        Some(Ok(Folder::Done)) => Folder::Done,
        _ => Folder::NeedsAction,
    };

    Ok(Classification {
        category: verdict.category,
        summary: verdict.summary,
        priority: verdict.priority,
        destination,
    })
}

fn invalid(e: impl std::fmt::Display) -> CollaboratorError {
    CollaboratorError::InvalidResponse(e.to_string())
}
