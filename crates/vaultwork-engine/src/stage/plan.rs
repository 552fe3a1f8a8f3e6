//! Plan stage: ask the planner for a plan and write it next to the item.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use vaultwork_core::config::ActionsConfig;
use vaultwork_core::{Folder, RecordKind, Status};

use crate::collaborator::Planner;
use crate::record::Record;
use crate::stage::{RecordStage, Selector};
use crate::state_machine::Actor;
use crate::store::VaultStore;
use crate::types::Outcome;

/// For each `new` email or item in `Needs_Action`, writes a sibling
/// `PLAN_<stem>.md` awaiting approval and flips the source to `planned`.
pub struct PlanStage {
    planner: Arc<dyn Planner>,
    actions: ActionsConfig,
    selector: Selector,
}

impl PlanStage {
    pub fn new(planner: Arc<dyn Planner>, actions: ActionsConfig) -> Self {
        Self {
            planner,
            actions,
            selector: Selector::new(Folder::NeedsAction, "*")
                .kinds(&[RecordKind::Email, RecordKind::InboxItem])
                .statuses(&[Status::New]),
        }
    }

    fn action_for(&self, kind: RecordKind) -> &str {
        match kind {
            RecordKind::Email => &self.actions.email_action,
            _ => &self.actions.item_action,
        }
    }
}

/// One-line description of what the source is about.
fn derive_intent(record: &Record) -> String {
    let subject = record
        .field("subject")
        .or_else(|| record.field("title"))
        .map(str::to_string)
        .or_else(|| {
            record.body.lines().find_map(|line| {
                let line = line.trim();
                let (key, value) = line.split_once(':')?;
                (key.trim().eq_ignore_ascii_case("subject") && !value.trim().is_empty())
                    .then(|| value.trim().to_string())
            })
        })
        .or_else(|| {
            record
                .body
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty() && *line != "---")
                .map(|line| line.chars().take(120).collect())
        })
        .unwrap_or_else(|| record.id.clone());

    match record.field("from") {
        Some(sender) => format!("{subject} (from {sender})"),
        None => subject,
    }
}

fn has_intent_heading(text: &str) -> bool {
    text.lines().any(|line| {
        let line = line.trim();
        line.starts_with('#') && line.trim_start_matches('#').trim().eq_ignore_ascii_case("intent")
    })
}

/// Planner output as the plan body, wrapped in sections unless it already
/// has an Intent heading.
pub fn plan_body(source: &Record, action: &str, planner_output: &str) -> String {
    let output = planner_output.trim();
    if has_intent_heading(output) {
        return format!("{output}\n");
    }
    format!(
        "## Intent\n{}\n\n## Proposed Action\n{}\n\n## Plan\n{}\n",
        derive_intent(source),
        action,
        output
    )
}

#[async_trait]
impl RecordStage for PlanStage {
    fn name(&self) -> &str {
        "plan"
    }

    fn actor(&self) -> Actor {
        Actor::Plan
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }

    async fn handle(&self, store: &VaultStore, record: &Record) -> Outcome {
        let stem = format!("PLAN_{}", record.id);
        let file_name = format!("{stem}.md");

        // A plan from an interrupted run is kept as is.
        if store.find(Folder::NeedsAction, &file_name).is_some() {
            tracing::info!(record = %record.file_name(), plan = %file_name, "Plan already exists");
            return Outcome::success(Status::Planned).with_field("plan", file_name);
        }

        let output = match self.planner.plan(&record.to_text()).await {
            Ok(output) => output,
            Err(e) => return Outcome::retry(format!("planner error: {e}")),
        };
        if output.trim().is_empty() {
            return Outcome::fail("planner returned an empty plan");
        }

        let action = self.action_for(record.kind).to_string();
        let mut plan = Record::new(stem.clone(), Status::AwaitingApproval)
            .with_field("original_file", record.file_name())
            .with_field("action", action.as_str())
            .with_field("timestamp", Utc::now().to_rfc3339())
            .with_body(plan_body(record, &action, &output));
        if let Some(subject) = record.metadata.get("subject") {
            plan.set_field("subject", subject);
        }

        match store.create_named(Folder::NeedsAction, &stem, plan) {
            Ok(handle) => {
                tracing::info!(record = %record.file_name(), plan = %handle.file_name, "Plan written");
                Outcome::success(Status::Planned).with_field("plan", handle.file_name)
            }
            Err(e) => Outcome::retry(format!("could not write plan: {e}")),
        }
    }
}
