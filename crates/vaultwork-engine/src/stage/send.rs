//! Send stage: deliver approved drafts.
//!
//! Drafts with `type: post` go to the feed poster; everything else is sent
//! as an email. A delivered draft is archived as `sent`/`posted`; a refused
//! one stays in `Drafts` as `failed` with the reason.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use vaultwork_core::{Folder, RecordKind, Status};

use crate::collaborator::{FeedPoster, Transport};
use crate::record::Record;
use crate::stage::{RecordStage, Selector};
use crate::state_machine::Actor;
use crate::store::VaultStore;
use crate::types::Outcome;

pub const DEFAULT_SUBJECT: &str = "(No Subject)";

pub struct SendStage {
    transport: Arc<dyn Transport>,
    poster: Arc<dyn FeedPoster>,
    selector: Selector,
}

impl SendStage {
    pub fn new(transport: Arc<dyn Transport>, poster: Arc<dyn FeedPoster>) -> Self {
        Self {
            transport,
            poster,
            selector: Selector::new(Folder::Drafts, "DRAFT_*")
                .kinds(&[RecordKind::Draft])
                .statuses(&[Status::Approved]),
        }
    }

    async fn post(&self, record: &Record) -> Outcome {
        let text = record.body.trim();
        if text.is_empty() {
            return Outcome::fail("post has no body");
        }
        match self.poster.post_to_feed(text).await {
            Ok(receipt) if receipt.success => {
                let posted_at = receipt.timestamp.unwrap_or_else(Utc::now).to_rfc3339();
                let mut outcome = Outcome::relocate(Status::Posted, Folder::Done).with_field("posted_at", posted_at);
                if let Some(url) = receipt.url {
                    outcome = outcome.with_field("url", url);
                }
                outcome
            }
            Ok(receipt) => Outcome::fail(
                receipt
                    .error
                    .unwrap_or_else(|| "feed poster reported failure".to_string()),
            ),
            Err(e) => Outcome::fail(format!("feed poster error: {e}")),
        }
    }

    async fn email(&self, record: &Record) -> Outcome {
        let Some(recipient) = record.field("recipient") else {
            return Outcome::fail("draft has no recipient");
        };
        let body = record.body.trim();
        if body.is_empty() {
            return Outcome::fail("draft has no body");
        }
        let subject = record.field("subject").unwrap_or(DEFAULT_SUBJECT);

        match self.transport.send(recipient, subject, body).await {
            Ok(true) => Outcome::relocate(Status::Sent, Folder::Done).with_field("sent_at", Utc::now().to_rfc3339()),
            Ok(false) => Outcome::fail(format!("transport refused message to {recipient}")),
            Err(e) => Outcome::fail(format!("transport error: {e}")),
        }
    }
}

#[async_trait]
impl RecordStage for SendStage {
    fn name(&self) -> &str {
        "send"
    }

    fn actor(&self) -> Actor {
        Actor::Send
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }

    fn claim_status(&self) -> Option<Status> {
        Some(Status::Pending)
    }

    async fn handle(&self, _store: &VaultStore, record: &Record) -> Outcome {
        match record.field("type") {
            Some(kind) if kind.eq_ignore_ascii_case("post") => self.post(record).await,
            _ => self.email(record).await,
        }
    }

    fn dashboard_line(&self, record: &Record, outcome: &Outcome) -> Option<String> {
        let target = record.field("recipient").unwrap_or("feed");
        Some(match outcome {
            Outcome::Success { status, .. } => format!("[send] {} {} to {}", record.file_name(), status, target),
            other => format!("[send] {} to {}: {}", record.file_name(), target, other),
        })
    }
}
