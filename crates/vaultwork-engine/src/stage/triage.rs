//! Triage stage: classify new inbox items and route them onward.

use std::sync::Arc;

use async_trait::async_trait;
use vaultwork_core::{Folder, Status};

use crate::collaborator::Classifier;
use crate::error::CollaboratorError;
use crate::record::Record;
use crate::stage::{RecordStage, Selector};
use crate::state_machine::Actor;
use crate::store::VaultStore;
use crate::types::Outcome;

/// Moves `Inbox` items with status `new` to `Needs_Action`, or archives
/// them as `done` when the classifier says they need nothing.
pub struct TriageStage {
    classifier: Arc<dyn Classifier>,
    selector: Selector,
}

impl TriageStage {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier,
            selector: Selector::new(Folder::Inbox, "*").statuses(&[Status::New]),
        }
    }
}

#[async_trait]
impl RecordStage for TriageStage {
    fn name(&self) -> &str {
        "triage"
    }

    fn actor(&self) -> Actor {
        Actor::Triage
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }

    async fn handle(&self, _store: &VaultStore, record: &Record) -> Outcome {
        let verdict = match self.classifier.classify(&record.to_text()).await {
            Ok(verdict) => verdict,
            Err(e @ CollaboratorError::InvalidResponse(_)) => {
                return Outcome::fail(format!("classifier verdict unusable: {e}"))
            }
            Err(e) => return Outcome::retry(format!("classifier error: {e}")),
        };

        let outcome = match verdict.destination {
            Folder::Done => Outcome::relocate(Status::Done, Folder::Done),
            Folder::NeedsAction => Outcome::relocate(Status::New, Folder::NeedsAction),
            other => return Outcome::fail(format!("classifier chose unsupported destination: {other}")),
        };
        outcome
            .with_field("category", one_line(&verdict.category))
            .with_field("priority", one_line(&verdict.priority))
            .with_field("summary", one_line(&verdict.summary))
    }

    fn dashboard_line(&self, record: &Record, outcome: &Outcome) -> Option<String> {
        match outcome {
            Outcome::Success { .. } => Some(format!(
                "[{}] {}: {} (Priority: {})",
                record.field("category").unwrap_or("general"),
                record.file_name(),
                record.field("summary").unwrap_or(""),
                record.field("priority").unwrap_or("normal"),
            )),
            _ => Some(format!("[triage] {}: {}", record.file_name(), outcome)),
        }
    }
}

fn one_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
