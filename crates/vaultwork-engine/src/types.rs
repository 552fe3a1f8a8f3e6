//! Value types shared by stages and handlers.

use std::fmt;

use vaultwork_core::{Folder, Status};

// =============================================================================
// Outcome
// =============================================================================

/// Result of handling a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Move the record to `status`, record `fields`, and optionally relocate.
    Success {
        status: Status,
        relocate_to: Option<Folder>,
        fields: Vec<(String, String)>,
    },
    /// Transient problem; leave the record as it was and try again later.
    Retry { reason: String },
    /// Permanent problem; mark the record `failed` with `reason`.
    Fail { reason: String },
}

impl Outcome {
    pub fn success(status: Status) -> Self {
        Outcome::Success {
            status,
            relocate_to: None,
            fields: Vec::new(),
        }
    }

    /// Success that also moves the record to `folder`.
    pub fn relocate(status: Status, folder: Folder) -> Self {
        Outcome::Success {
            status,
            relocate_to: Some(folder),
            fields: Vec::new(),
        }
    }

    /// Attach a result field. No effect on `Retry`/`Fail`.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Outcome::Success { fields, .. } = &mut self {
            fields.push((key.into(), value.into()));
        }
        self
    }

    pub fn retry(reason: impl Into<String>) -> Self {
        Outcome::Retry {
            reason: reason.into(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Outcome::Fail {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success {
                status,
                relocate_to: Some(folder),
                ..
            } => write!(f, "{} -> {}", status, folder),
            Outcome::Success { status, .. } => write!(f, "{}", status),
            Outcome::Retry { reason } => write!(f, "retry: {}", reason),
            Outcome::Fail { reason } => write!(f, "failed: {}", reason),
        }
    }
}

// =============================================================================
// TickReport
// =============================================================================

/// Counters for one stage tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Candidates listed by the selector's folder and pattern.
    pub scanned: usize,
    pub succeeded: usize,
    pub retried: usize,
    pub failed: usize,
    /// Not ours (status or kind mismatch, rejected transition) or corrupt.
    pub skipped: usize,
    /// Waiting out a retry backoff, or unreadable this tick.
    pub deferred: usize,
}

impl TickReport {
    /// Records that were acted on.
    pub fn processed(&self) -> usize {
        self.succeeded + self.retried + self.failed
    }

    pub fn merge(&mut self, other: &TickReport) {
        self.scanned += other.scanned;
        self.succeeded += other.succeeded;
        self.retried += other.retried;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.deferred += other.deferred;
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned={} succeeded={} retried={} failed={} skipped={} deferred={}",
            self.scanned, self.succeeded, self.retried, self.failed, self.skipped, self.deferred
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_builders() {
        let outcome = Outcome::relocate(Status::Sent, Folder::Done).with_field("sent_at", "now");
        assert_eq!(
            outcome,
            Outcome::Success {
                status: Status::Sent,
                relocate_to: Some(Folder::Done),
                fields: vec![("sent_at".to_string(), "now".to_string())],
            }
        );
        assert!(outcome.is_success());
        assert!(!Outcome::retry("later").is_success());
    }

    #[test]
    fn test_with_field_ignored_on_failure() {
        assert_eq!(
            Outcome::fail("boom").with_field("x", "y"),
            Outcome::Fail {
                reason: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::success(Status::Planned).to_string(), "planned");
        assert_eq!(
            Outcome::relocate(Status::Done, Folder::Done).to_string(),
            "done -> Done"
        );
        assert_eq!(Outcome::retry("timeout").to_string(), "retry: timeout");
        assert_eq!(Outcome::fail("no recipient").to_string(), "failed: no recipient");
    }

    #[test]
    fn test_tick_report_merge_and_display() {
        let mut total = TickReport {
            scanned: 2,
            succeeded: 1,
            skipped: 1,
            ..Default::default()
        };
        total.merge(&TickReport {
            scanned: 3,
            failed: 1,
            retried: 1,
            deferred: 1,
            ..Default::default()
        });
        assert_eq!(total.scanned, 5);
        assert_eq!(total.processed(), 3);
        assert_eq!(
            total.to_string(),
            "scanned=5 succeeded=1 retried=1 failed=1 skipped=1 deferred=1"
        );
    }
}
