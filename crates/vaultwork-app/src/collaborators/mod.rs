//! Collaborator implementations shipped with the binary.
//!
//! The engine only sees the traits; everything here can be swapped for a
//! real mail transport or feed client without touching the stages.

pub mod command;
pub mod drafter;
pub mod outbox;
pub mod spool;

use std::sync::Arc;
use std::time::Duration;

use vaultwork_core::VaultConfig;
use vaultwork_engine::{Classifier, Drafter, FeedPoster, PassThroughClassifier, Planner, Transport};

pub use command::{CommandClassifier, CommandPlanner, CommandRunner};
pub use drafter::PlanTextDrafter;
pub use outbox::{OutboxFeedPoster, OutboxTransport};
pub use spool::SpoolSource;

/// The full set of collaborators the stages are wired with.
#[derive(Clone)]
pub struct Collaborators {
    pub planner: Arc<dyn Planner>,
    pub classifier: Arc<dyn Classifier>,
    pub drafter: Arc<dyn Drafter>,
    pub transport: Arc<dyn Transport>,
    pub poster: Arc<dyn FeedPoster>,
}

impl Collaborators {
    pub fn from_config(config: &VaultConfig) -> Self {
        let settings = &config.collaborators;
        let timeout = Duration::from_secs(settings.command_timeout_secs.max(1));

        let classifier: Arc<dyn Classifier> = if settings.classifier_command.is_empty() {
            Arc::new(PassThroughClassifier)
        } else {
            Arc::new(CommandClassifier::new(CommandRunner::new(
                settings.classifier_command.clone(),
                timeout,
            )))
        };

        let outbox = config.outbox_dir();
        Self {
            planner: Arc::new(CommandPlanner::new(CommandRunner::new(
                settings.planner_command.clone(),
                timeout,
            ))),
            classifier,
            drafter: Arc::new(PlanTextDrafter::new()),
            transport: Arc::new(OutboxTransport::new(outbox.clone())),
            poster: Arc::new(OutboxFeedPoster::new(outbox)),
        }
    }
}
