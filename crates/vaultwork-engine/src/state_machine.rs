//! Record state machine with validated transitions.
//!
//! Each record kind has its own status set and transition table. Transitions
//! are keyed by the actor that applies them, so a stage can only move records
//! along the edges it owns:
//!
//! Email/InboxItem: new -> planned -> done, new -> done (triage), new -> failed
//! Plan: awaiting_approval -> approved -> pending -> done/failed
//! Draft: awaiting_approval -> approved -> pending -> sent/posted/failed

use std::fmt;

use serde::{Deserialize, Serialize};
use vaultwork_core::{RecordKind, Status};

use crate::error::TransitionRejected;
use crate::record::Record;

/// Who applies a transition: one of the stage loops, or a person editing
/// the vault by hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Human,
    Ingest,
    Triage,
    Plan,
    Worker,
    Send,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Human => write!(f, "human"),
            Actor::Ingest => write!(f, "ingest"),
            Actor::Triage => write!(f, "triage"),
            Actor::Plan => write!(f, "plan"),
            Actor::Worker => write!(f, "worker"),
            Actor::Send => write!(f, "send"),
        }
    }
}

/// Statuses a record of `kind` may carry.
pub fn legal_statuses(kind: RecordKind) -> &'static [Status] {
    match kind {
        RecordKind::Email | RecordKind::InboxItem => &[
            Status::New,
            Status::Planned,
            Status::Done,
            Status::Failed,
        ],
        RecordKind::Plan => &[
            Status::AwaitingApproval,
            Status::Approved,
            Status::Pending,
            Status::Done,
            Status::Failed,
        ],
        RecordKind::Draft => &[
            Status::AwaitingApproval,
            Status::Approved,
            Status::Pending,
            Status::Sent,
            Status::Posted,
            Status::Failed,
        ],
    }
}

pub fn is_legal(kind: RecordKind, status: Status) -> bool {
    legal_statuses(kind).contains(&status)
}

/// Check a single edge of the transition table.
fn allowed(kind: RecordKind, from: Status, to: Status, actor: Actor) -> bool {
    use Actor as A;
    use Status as S;

    match kind {
        RecordKind::Email | RecordKind::InboxItem => matches!(
            (from, to, actor),
            (S::New, S::Planned, A::Plan)
                | (S::New, S::Failed, A::Plan)
                | (S::New, S::Done, A::Triage)
                | (S::New, S::Failed, A::Triage)
                | (S::Planned, S::Done, A::Worker)
                | (S::Failed, S::New, A::Human)
        ),
        RecordKind::Plan => matches!(
            (from, to, actor),
            (S::AwaitingApproval, S::Approved, A::Human)
                | (S::AwaitingApproval, S::Failed, A::Human)
                | (S::Failed, S::Approved, A::Human)
                | (S::Approved, S::Pending, A::Worker)
                | (S::Approved | S::Pending, S::Done | S::Failed, A::Worker)
        ),
        RecordKind::Draft => matches!(
            (from, to, actor),
            (S::AwaitingApproval, S::Approved, A::Human)
                | (S::Failed, S::Approved, A::Human)
                | (S::Approved, S::Pending, A::Send)
                | (S::Approved | S::Pending, S::Sent | S::Posted | S::Failed, A::Send)
        ),
    }
}

/// Validate that `actor` may move a `kind` record from `from` to `to`.
///
/// Self-transitions on a legal status are always allowed; they cover stages
/// that route a record between folders without changing its status.
pub fn validate_transition(
    kind: RecordKind,
    from: Status,
    to: Status,
    actor: Actor,
) -> Result<(), TransitionRejected> {
    let valid = if from == to {
        is_legal(kind, from)
    } else {
        is_legal(kind, from) && is_legal(kind, to) && allowed(kind, from, to, actor)
    };

    if valid {
        Ok(())
    } else {
        Err(TransitionRejected {
            kind,
            from,
            to,
            actor,
        })
    }
}

/// Targets `actor` may move a `kind` record to from `from`.
pub fn transitions(kind: RecordKind, from: Status, actor: Actor) -> Vec<Status> {
    legal_statuses(kind)
        .iter()
        .copied()
        .filter(|to| *to != from && allowed(kind, from, *to, actor))
        .collect()
}

/// A requested status change plus result fields to record alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub to: Status,
    pub actor: Actor,
    pub fields: Vec<(String, String)>,
}

impl Transition {
    pub fn new(to: Status, actor: Actor) -> Self {
        Self {
            to,
            actor,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }
}

/// Apply a transition, returning the updated record.
///
/// Only `status` and the transition's fields change; body and every other
/// metadata value are carried over untouched.
pub fn apply(record: &Record, transition: &Transition) -> Result<Record, TransitionRejected> {
    validate_transition(record.kind, record.status, transition.to, transition.actor)?;
    let mut updated = record.clone();
    updated.status = transition.to;
    for (key, value) in &transition.fields {
        updated.set_field(key.as_str(), value.as_str());
    }
    Ok(updated)
}
