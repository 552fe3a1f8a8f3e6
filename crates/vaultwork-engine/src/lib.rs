//! Vault orchestration engine.
//!
//! Records are small frontmatter files in a shared vault directory. Stage
//! loops scan folders on a timer, move records through their lifecycle with
//! validated transitions, and call out to external collaborators. The
//! filesystem is the only coordination medium.

pub mod codec;
pub mod collaborator;
pub mod dedup;
pub mod error;
pub mod handler;
pub mod record;
pub mod retry;
pub mod runner;
pub mod stage;
pub mod state_machine;
pub mod store;
pub mod types;

pub use collaborator::{
    Classification, Classifier, DraftMessage, Drafter, FeedPoster, PassThroughClassifier, Planner,
    PostReceipt, Transport,
};
pub use dedup::{content_hash, DedupCache};
pub use error::{CollaboratorError, DedupError, ParseError, StageError, StoreError, TransitionRejected};
pub use handler::{ActionHandler, Dispatcher, DraftEmailHandler, DraftPostHandler};
pub use record::{Frontmatter, Metadata, Record};
pub use retry::{RetryPolicy, RetryTracker};
pub use runner::{ShutdownHandle, StageRunner};
pub use stage::{
    ExternalEvent, IngestSource, IngestStage, PlanStage, RecordLoop, RecordStage, SendStage, Selector,
    Stage, TriageStage, WorkerStage,
};
pub use state_machine::{Actor, Transition};
pub use store::{RecordHandle, VaultStore};
pub use types::{Outcome, TickReport};
