//! `draft_post` action: turn an approved plan into a feed post draft.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use vaultwork_core::{Folder, Status};

use crate::collaborator::Drafter;
use crate::handler::{source_stem, ActionHandler};
use crate::record::Record;
use crate::store::VaultStore;
use crate::types::Outcome;

pub const ACTION: &str = "draft_post";

/// Writes `Drafts/DRAFT_<source>.md` with `type: post`.
pub struct DraftPostHandler {
    drafter: Arc<dyn Drafter>,
}

impl DraftPostHandler {
    pub fn new(drafter: Arc<dyn Drafter>) -> Self {
        Self { drafter }
    }
}

#[async_trait]
impl ActionHandler for DraftPostHandler {
    fn action(&self) -> &str {
        ACTION
    }

    async fn execute(&self, store: &VaultStore, plan: &Record) -> Outcome {
        let stem = format!("DRAFT_{}", source_stem(plan));
        let file_name = format!("{stem}.md");

        if store.find(Folder::Drafts, &file_name).is_some() {
            tracing::info!(record = %plan.file_name(), draft = %file_name, "Draft already exists");
            return Outcome::relocate(Status::Done, Folder::Done)
                .with_field("draft", file_name)
                .with_field("completed_at", Utc::now().to_rfc3339());
        }

        let message = match self.drafter.draft(&plan.body).await {
            Ok(message) => message,
            Err(e) => return Outcome::retry(format!("drafter error: {e}")),
        };
        let body = message.body.trim();
        if body.is_empty() {
            return Outcome::fail("post draft is empty");
        }

        let mut draft = Record::new(stem.clone(), Status::AwaitingApproval)
            .with_field("type", "post")
            .with_field("plan", plan.file_name())
            .with_field("timestamp", Utc::now().to_rfc3339())
            .with_body(body.to_string());
        if let Some(original) = plan.field("original_file") {
            draft.set_field("original_file", original);
        }

        match store.create_named(Folder::Drafts, &stem, draft) {
            Ok(handle) => {
                tracing::info!(record = %plan.file_name(), draft = %handle.file_name, "Post draft written");
                Outcome::relocate(Status::Done, Folder::Done)
                    .with_field("draft", handle.file_name)
                    .with_field("completed_at", Utc::now().to_rfc3339())
            }
            Err(e) => Outcome::retry(format!("could not write draft: {e}")),
        }
    }

    fn describe(&self, plan: &Record) -> String {
        format!("Draft post for {}", source_stem(plan))
    }
}
