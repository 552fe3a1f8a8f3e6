use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VaultError;

// =============================================================================
// Enums
// =============================================================================

/// Logical location inside the vault.
///
/// A record's folder encodes coarse stage membership; combined with its
/// status it determines what the record is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Folder {
    /// Freshly ingested items awaiting triage.
    Inbox,
    /// Items (and their plans) that need planning or a human decision.
    NeedsAction,
    /// Outgoing messages and posts awaiting approval or delivery.
    Drafts,
    /// Archive. Records here are finished and never selected again.
    Done,
}

impl Folder {
    pub const ALL: [Folder; 4] = [
        Folder::Inbox,
        Folder::NeedsAction,
        Folder::Drafts,
        Folder::Done,
    ];

    /// Directory name under the vault root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Folder::Inbox => "Inbox",
            Folder::NeedsAction => "Needs_Action",
            Folder::Drafts => "Drafts",
            Folder::Done => "Done",
        }
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Folder {
    type Err = VaultError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inbox" => Ok(Folder::Inbox),
            "needs_action" | "needs-action" => Ok(Folder::NeedsAction),
            "drafts" => Ok(Folder::Drafts),
            "done" | "archive" => Ok(Folder::Done),
            _ => Err(VaultError::Unknown {
                kind: "folder",
                value: s.to_string(),
            }),
        }
    }
}

/// Kind of record, derived from the filename prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Generic ingested item (notification, message, dropped file).
    InboxItem,
    /// Plan produced for an item, awaiting human approval.
    Plan,
    /// Outgoing email or feed post.
    Draft,
    /// Ingested email.
    Email,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::InboxItem,
        RecordKind::Plan,
        RecordKind::Draft,
        RecordKind::Email,
    ];

    /// Filename prefix (without the trailing underscore).
    pub fn prefix(&self) -> &'static str {
        match self {
            RecordKind::InboxItem => "ITEM",
            RecordKind::Plan => "PLAN",
            RecordKind::Draft => "DRAFT",
            RecordKind::Email => "EMAIL",
        }
    }

    /// Classify a record file name. Unknown prefixes are inbox items, so
    /// sources may pick their own prefix (`LINKEDIN_MESSAGE_...`).
    pub fn from_file_name(name: &str) -> Self {
        if name.starts_with("PLAN_") {
            RecordKind::Plan
        } else if name.starts_with("DRAFT_") {
            RecordKind::Draft
        } else if name.starts_with("EMAIL_") {
            RecordKind::Email
        } else {
            RecordKind::InboxItem
        }
    }

    /// Whether records of this kind come from an ingestion source.
    pub fn is_source(&self) -> bool {
        matches!(self, RecordKind::InboxItem | RecordKind::Email)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::InboxItem => write!(f, "inbox_item"),
            RecordKind::Plan => write!(f, "plan"),
            RecordKind::Draft => write!(f, "draft"),
            RecordKind::Email => write!(f, "email"),
        }
    }
}

impl FromStr for RecordKind {
    type Err = VaultError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbox_item" => Ok(RecordKind::InboxItem),
            "plan" => Ok(RecordKind::Plan),
            "draft" => Ok(RecordKind::Draft),
            "email" => Ok(RecordKind::Email),
            _ => Err(VaultError::Unknown {
                kind: "record kind",
                value: s.to_string(),
            }),
        }
    }
}

/// Record status vocabulary (union over all kinds).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    New,
    Planned,
    AwaitingApproval,
    Approved,
    Pending,
    Sent,
    Posted,
    Done,
    Failed,
}

impl Status {
    pub const ALL: [Status; 9] = [
        Status::New,
        Status::Planned,
        Status::AwaitingApproval,
        Status::Approved,
        Status::Pending,
        Status::Sent,
        Status::Posted,
        Status::Done,
        Status::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::New => "new",
            Status::Planned => "planned",
            Status::AwaitingApproval => "awaiting_approval",
            Status::Approved => "approved",
            Status::Pending => "pending",
            Status::Sent => "sent",
            Status::Posted => "posted",
            Status::Done => "done",
            Status::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = VaultError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| VaultError::Unknown {
                kind: "status",
                value: s.to_string(),
            })
    }
}

/// Application log level.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
