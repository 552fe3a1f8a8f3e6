//! Worker stage: execute approved plans and archive them with their source.

use async_trait::async_trait;
use chrono::Utc;
use vaultwork_core::{Folder, RecordKind, Status};

use crate::error::StageError;
use crate::handler::Dispatcher;
use crate::record::Record;
use crate::stage::{RecordStage, Selector};
use crate::state_machine::{apply, Actor, Transition};
use crate::store::{RecordHandle, VaultStore};
use crate::types::Outcome;

/// Folders searched for a plan's source record, in order.
const SOURCE_FOLDERS: [Folder; 2] = [Folder::NeedsAction, Folder::Inbox];

pub struct WorkerStage {
    dispatcher: Dispatcher,
    selector: Selector,
}

impl WorkerStage {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            selector: Selector::new(Folder::NeedsAction, "PLAN_*")
                .kinds(&[RecordKind::Plan])
                .statuses(&[Status::Approved]),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Flip the plan's source to `done` and move it to the archive.
    fn archive_source(&self, store: &VaultStore, plan: &Record) -> Result<(), StageError> {
        let Some(original) = plan.field("original_file") else {
            tracing::warn!(plan = %plan.file_name(), "Plan has no original_file");
            return Ok(());
        };
        let Some(handle) = SOURCE_FOLDERS
            .iter()
            .find_map(|folder| store.find(*folder, original))
        else {
            tracing::warn!(plan = %plan.file_name(), source = %original, "Source record not found");
            return Ok(());
        };

        let source = store.read_record(&handle)?;
        let transition = Transition::new(Status::Done, Actor::Worker)
            .with_field("completed_at", Utc::now().to_rfc3339());
        let archived = match apply(&source, &transition) {
            Ok(archived) => archived,
            Err(rejected) => {
                tracing::warn!(plan = %plan.file_name(), source = %handle.file_name, reason = %rejected, "Source not archived");
                return Ok(());
            }
        };
        store.write_record(&handle, &archived)?;
        store.relocate(&handle, Folder::Done)?;
        tracing::info!(plan = %plan.file_name(), source = %handle.file_name, "Source archived");
        Ok(())
    }
}

#[async_trait]
impl RecordStage for WorkerStage {
    fn name(&self) -> &str {
        "worker"
    }

    fn actor(&self) -> Actor {
        Actor::Worker
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }

    fn claim_status(&self) -> Option<Status> {
        Some(Status::Pending)
    }

    async fn handle(&self, store: &VaultStore, record: &Record) -> Outcome {
        let Some(action) = record.field("action") else {
            return Outcome::fail("plan has no action");
        };
        match self.dispatcher.dispatch(action, store, record).await {
            Outcome::Success {
                status,
                relocate_to,
                fields,
            } => Outcome::Success {
                status,
                relocate_to: relocate_to.or(Some(Folder::Done)),
                fields,
            },
            other => other,
        }
    }

    async fn after_success(
        &self,
        store: &VaultStore,
        record: &Record,
        _handle: &RecordHandle,
    ) -> Result<(), StageError> {
        if record.status == Status::Done {
            self.archive_source(store, record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ActionHandler;
    use crate::retry::RetryPolicy;
    use crate::stage::{RecordLoop, Stage};
    use std::sync::Arc;

    struct Done;

    #[async_trait]
    impl ActionHandler for Done {
        fn action(&self) -> &str {
            "draft_email"
        }

        async fn execute(&self, _store: &VaultStore, _plan: &Record) -> Outcome {
            Outcome::success(Status::Done).with_field("draft", "DRAFT_EMAIL_1.md")
        }
    }

    struct Broken;

    #[async_trait]
    impl ActionHandler for Broken {
        fn action(&self) -> &str {
            "draft_email"
        }

        async fn execute(&self, _store: &VaultStore, _plan: &Record) -> Outcome {
            Outcome::fail("drafter rejected plan")
        }
    }

    fn setup(plan_status: Status) -> (tempfile::TempDir, VaultStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = VaultStore::new(dir.path());
        store.ensure_layout().unwrap();
        store
            .create_named(Folder::NeedsAction, "EMAIL_1", Record::new("EMAIL_1", Status::Planned))
            .unwrap();
        let plan = Record::new("PLAN_EMAIL_1", plan_status)
            .with_field("original_file", "EMAIL_1.md")
            .with_field("action", "draft_email");
        store.create_named(Folder::NeedsAction, "PLAN_EMAIL_1", plan).unwrap();
        (dir, store)
    }

    fn worker(handler: Arc<dyn ActionHandler>, store: &VaultStore) -> RecordLoop<WorkerStage> {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_handler(handler);
        RecordLoop::new(WorkerStage::new(dispatcher), store.clone(), RetryPolicy::unbounded())
    }

    #[tokio::test]
    async fn test_approved_plan_archived_with_source() {
        let (_dir, store) = setup(Status::Approved);
        let mut stage = worker(Arc::new(Done), &store);

        let report = stage.tick().await.unwrap();
        assert_eq!(report.succeeded, 1);

        let plan = store
            .read_record(&store.find(Folder::Done, "PLAN_EMAIL_1.md").unwrap())
            .unwrap();
        assert_eq!(plan.status, Status::Done);
        assert_eq!(plan.field("draft"), Some("DRAFT_EMAIL_1.md"));

        let source = store
            .read_record(&store.find(Folder::Done, "EMAIL_1.md").unwrap())
            .unwrap();
        assert_eq!(source.status, Status::Done);
        assert!(source.field("completed_at").is_some());
        assert!(store.list(Folder::NeedsAction, "*").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unapproved_plan_untouched() {
        let (_dir, store) = setup(Status::AwaitingApproval);
        let handle = store.find(Folder::NeedsAction, "PLAN_EMAIL_1.md").unwrap();
        let before = store.read_raw(&handle).unwrap();
        let mut stage = worker(Arc::new(Done), &store);

        let report = stage.tick().await.unwrap();
        assert_eq!(report.processed(), 0);
        assert_eq!(store.read_raw(&handle).unwrap(), before);
    }

    #[tokio::test]
    async fn test_failed_action_leaves_plan_in_place() {
        let (_dir, store) = setup(Status::Approved);
        let mut stage = worker(Arc::new(Broken), &store);

        assert_eq!(stage.tick().await.unwrap().failed, 1);
        let plan = store
            .read_record(&store.find(Folder::NeedsAction, "PLAN_EMAIL_1.md").unwrap())
            .unwrap();
        assert_eq!(plan.status, Status::Failed);
        assert_eq!(plan.field("error"), Some("drafter rejected plan"));

        let source = store
            .read_record(&store.find(Folder::NeedsAction, "EMAIL_1.md").unwrap())
            .unwrap();
        assert_eq!(source.status, Status::Planned);
    }

    #[tokio::test]
    async fn test_unknown_action_fails() {
        let (_dir, store) = setup(Status::Approved);
        let mut stage = RecordLoop::new(
            WorkerStage::new(Dispatcher::new()),
            store.clone(),
            RetryPolicy::unbounded(),
        );
        assert_eq!(stage.tick().await.unwrap().failed, 1);
        let plan = store
            .read_record(&store.find(Folder::NeedsAction, "PLAN_EMAIL_1.md").unwrap())
            .unwrap();
        assert_eq!(plan.field("error"), Some("no handler for action: draft_email"));
    }

    #[tokio::test]
    async fn test_missing_source_is_not_fatal() {
        let (_dir, store) = setup(Status::Approved);
        let source = store.find(Folder::NeedsAction, "EMAIL_1.md").unwrap();
        std::fs::remove_file(&source.path).unwrap();
        let mut stage = worker(Arc::new(Done), &store);

        assert_eq!(stage.tick().await.unwrap().succeeded, 1);
        assert!(store.find(Folder::Done, "PLAN_EMAIL_1.md").is_some());
    }
}
