//! Narrow contracts for the external services the stages call.
//!
//! The engine never talks to a model, a mail server or a social feed
//! directly; it goes through these traits and the binary supplies the
//! implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vaultwork_core::Folder;

use crate::error::CollaboratorError;

/// Turns a record's text into a plan.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, text: &str) -> Result<String, CollaboratorError>;
}

/// Structured outgoing message extracted from an approved plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftMessage {
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub body: String,
}

/// Turns plan text into a draft message.
#[async_trait]
pub trait Drafter: Send + Sync {
    async fn draft(&self, text: &str) -> Result<DraftMessage, CollaboratorError>;
}

/// Delivers an email. `Ok(false)` means the transport refused it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<bool, CollaboratorError>;
}

/// Result of publishing to a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReceipt {
    pub success: bool,
    pub url: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl PostReceipt {
    pub fn posted(url: Option<String>) -> Self {
        Self {
            success: true,
            url,
            timestamp: Some(Utc::now()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            url: None,
            timestamp: Some(Utc::now()),
            error: Some(error.into()),
        }
    }
}

/// Publishes a post to a social feed.
#[async_trait]
pub trait FeedPoster: Send + Sync {
    async fn post_to_feed(&self, text: &str) -> Result<PostReceipt, CollaboratorError>;
}

/// Triage verdict for an inbox item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub summary: String,
    pub priority: String,
    /// `NeedsAction` to keep the item, `Done` to archive it.
    pub destination: Folder,
}

/// Decides where an inbox item goes.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, CollaboratorError>;
}

/// Classifier that keeps every item.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughClassifier;

#[async_trait]
impl Classifier for PassThroughClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, CollaboratorError> {
        let summary = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && *line != "---" && !line.contains(": "))
            .unwrap_or("")
            .chars()
            .take(80)
            .collect();
        Ok(Classification {
            category: "general".to_string(),
            summary,
            priority: "normal".to_string(),
            destination: Folder::NeedsAction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pass_through_keeps_everything() {
        let verdict = PassThroughClassifier
            .classify("---\nstatus: new\nsubject: Hi\n---\n\nPlease call me back.")
            .await
            .unwrap();
        assert_eq!(verdict.destination, Folder::NeedsAction);
        assert_eq!(verdict.category, "general");
        assert_eq!(verdict.summary, "Please call me back.");
    }

    #[tokio::test]
    async fn test_pass_through_truncates_summary() {
        let text = "x".repeat(200);
        let verdict = PassThroughClassifier.classify(&text).await.unwrap();
        assert_eq!(verdict.summary.len(), 80);
    }

    #[test]
    fn test_post_receipt_builders() {
        let ok = PostReceipt::posted(Some("https://feed/1".to_string()));
        assert!(ok.success);
        assert!(ok.error.is_none());
        let failed = PostReceipt::failed("rate limited");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("rate limited"));
    }
}
