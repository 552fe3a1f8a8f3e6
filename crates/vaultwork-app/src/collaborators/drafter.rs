//! Drafter that reads the outgoing message straight out of the plan text.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use vaultwork_engine::{CollaboratorError, DraftMessage, Drafter};

// `<key>:` at the start of a line, tolerating list markers and bold.
static TO_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^[\s\-*]*(?:\*\*)?To:(?:\*\*)?[ \t]*(.+?)\s*$").expect("Invalid recipient regex")
});
static SUBJECT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^[\s\-*]*(?:\*\*)?Subject:(?:\*\*)?[ \t]*(.+?)\s*$").expect("Invalid subject regex")
});

/// Extracts `To:` and `Subject:` lines and takes the text after the first
/// `---` as the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanTextDrafter;

impl PlanTextDrafter {
    pub fn new() -> Self {
        Self
    }
}

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

#[async_trait]
impl Drafter for PlanTextDrafter {
    async fn draft(&self, text: &str) -> Result<DraftMessage, CollaboratorError> {
        let body = text
            .split_once("---")
            .map(|(_, rest)| rest.trim().to_string())
            .unwrap_or_default();
        Ok(DraftMessage {
            recipient: capture(&TO_LINE, text),
            subject: capture(&SUBJECT_LINE, text),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_extracts_plain_plan() {
        let drafter = PlanTextDrafter::new();
        let message = drafter.draft("To: a@b.com\nSubject: Hi\n---\nHello").await.unwrap();
        assert_eq!(message.recipient.as_deref(), Some("a@b.com"));
        assert_eq!(message.subject.as_deref(), Some("Hi"));
        assert_eq!(message.body, "Hello");
    }

    #[tokio::test]
    async fn test_extracts_markdown_plan() {
        let plan = "## Intent\nReply\n\n## Draft Response\n- **To:** bob@example.com\n- **Subject:** \"Re: Numbers\"\n\n---\n\nHi Bob,\n\nAttached.\n";
        let message = PlanTextDrafter::new().draft(plan).await.unwrap();
        assert_eq!(message.recipient.as_deref(), Some("bob@example.com"));
        assert_eq!(message.subject.as_deref(), Some("Re: Numbers"));
        assert_eq!(message.body, "Hi Bob,\n\nAttached.");
    }

    #[tokio::test]
    async fn test_missing_parts_are_empty() {
        let message = PlanTextDrafter::new().draft("Just post this.").await.unwrap();
        assert_eq!(message.recipient, None);
        assert_eq!(message.subject, None);
        assert_eq!(message.body, "");
    }

    #[tokio::test]
    async fn test_key_must_start_line() {
        let message = PlanTextDrafter::new()
            .draft("Reply-To: x@y.com\nSend it to: nobody\n---\nbody")
            .await
            .unwrap();
        assert_eq!(message.recipient, None);
    }
}
