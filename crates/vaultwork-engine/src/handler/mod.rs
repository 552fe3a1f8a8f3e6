//! Action handler trait and dispatcher.
//!
//! Approved plans name an `action`; the worker stage looks it up in the
//! [`Dispatcher`] and runs the registered [`ActionHandler`].

pub mod draft_email;
pub mod draft_post;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::record::Record;
use crate::store::VaultStore;
use crate::types::Outcome;

pub use draft_email::DraftEmailHandler;
pub use draft_post::DraftPostHandler;

/// Executes one named action for an approved plan.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Action name as written in a plan's `action` field.
    fn action(&self) -> &str;

    /// Run the action. Success means the plan is finished.
    async fn execute(&self, store: &VaultStore, plan: &Record) -> Outcome;

    /// One-line description for logs and the dashboard.
    fn describe(&self, plan: &Record) -> String {
        format!("{} for {}", self.action(), plan.file_name())
    }
}

/// Registry mapping action names to handlers.
#[derive(Default, Clone)]
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own action name, replacing any previous one.
    pub fn register_handler(&mut self, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(handler.action().to_string(), handler);
    }

    /// Register a handler under an explicit name (an alias).
    pub fn register(&mut self, action: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(action.into(), handler);
    }

    pub fn get(&self, action: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(action).cloned()
    }

    pub fn contains(&self, action: &str) -> bool {
        self.handlers.contains_key(action)
    }

    /// Registered action names, sorted.
    pub fn actions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run the handler for `action`. An unknown action fails the plan.
    pub async fn dispatch(&self, action: &str, store: &VaultStore, plan: &Record) -> Outcome {
        match self.get(action) {
            Some(handler) => {
                tracing::info!(
                    record = %plan.file_name(),
                    action = %action,
                    "{}",
                    handler.describe(plan)
                );
                handler.execute(store, plan).await
            }
            None => {
                tracing::warn!(record = %plan.file_name(), action = %action, "No handler registered");
                Outcome::fail(format!("no handler for action: {}", action))
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("actions", &self.actions())
            .finish()
    }
}

/// Stem of the source record a plan was made for.
///
/// Uses the `original_file` pairing key, falling back to the plan's own id
/// without its `PLAN_` prefix.
pub(crate) fn source_stem(plan: &Record) -> String {
    if let Some(original) = plan.field("original_file") {
        let name = std::path::Path::new(original)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(original);
        return name.strip_suffix(".md").unwrap_or(name).to_string();
    }
    plan.id.strip_prefix("PLAN_").unwrap_or(&plan.id).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultwork_core::{Folder, Status};

    struct Echo;

    #[async_trait]
    impl ActionHandler for Echo {
        fn action(&self) -> &str {
            "echo"
        }

        async fn execute(&self, _store: &VaultStore, plan: &Record) -> Outcome {
            Outcome::relocate(Status::Done, Folder::Done).with_field("echo", plan.id.clone())
        }
    }

    fn plan() -> Record {
        Record::new("PLAN_EMAIL_1", Status::Pending).with_field("action", "echo")
    }

    #[test]
    fn test_register_and_lookup() {
        let mut dispatcher = Dispatcher::new();
        assert!(!dispatcher.contains("echo"));
        dispatcher.register_handler(Arc::new(Echo));
        dispatcher.register("reply", Arc::new(Echo));
        assert!(dispatcher.contains("echo"));
        assert!(dispatcher.get("reply").is_some());
        assert_eq!(dispatcher.actions(), vec!["echo", "reply"]);
    }

    #[tokio::test]
    async fn test_dispatch_runs_handler() {
        let dir = tempfile::tempdir().unwrap();
        let store = VaultStore::new(dir.path());
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_handler(Arc::new(Echo));

        let outcome = dispatcher.dispatch("echo", &store, &plan()).await;
        assert_eq!(
            outcome,
            Outcome::relocate(Status::Done, Folder::Done).with_field("echo", "PLAN_EMAIL_1")
        );
    }

    #[tokio::test]
    async fn test_dispatch_unknown_action_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = VaultStore::new(dir.path());
        let outcome = Dispatcher::new().dispatch("send_fax", &store, &plan()).await;
        assert_eq!(outcome, Outcome::fail("no handler for action: send_fax"));
    }

    #[test]
    fn test_source_stem() {
        let plan = Record::new("PLAN_EMAIL_1", Status::Approved).with_field("original_file", "EMAIL_1.md");
        assert_eq!(source_stem(&plan), "EMAIL_1");
        let plan = Record::new("PLAN_EMAIL_2", Status::Approved);
        assert_eq!(source_stem(&plan), "EMAIL_2");
        let plan = Record::new("PLAN_X", Status::Approved)
            .with_field("original_file", "Needs_Action/LINKEDIN_POST_1.md");
        assert_eq!(source_stem(&plan), "LINKEDIN_POST_1");
    }
}
