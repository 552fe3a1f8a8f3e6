//! Ingestion source that reads JSON event files from a spool directory.
//!
//! Watchers (mail pollers, feed scrapers, scripts) drop one `*.json` file per
//! event. Files are left in place; the dedup cache keeps them from being
//! ingested twice.
//!
//! ```json
//! {"kind": "EMAIL", "type": "email", "id": "18c2", "source": "gmail",
//!  "fields": {"from": "a@b.com", "subject": "Hi"}, "body": "Hello"}
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use vaultwork_engine::{CollaboratorError, ExternalEvent, IngestSource};

#[derive(Debug, Deserialize)]
struct SpoolEvent {
    #[serde(alias = "prefix", default = "default_kind")]
    kind: String,
    #[serde(rename = "type", default = "default_type")]
    event_type: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default = "default_source")]
    source: String,
    #[serde(default)]
    fields: BTreeMap<String, String>,
    #[serde(default)]
    body: String,
}

fn default_kind() -> String {
    "ITEM".to_string()
}

fn default_type() -> String {
    "item".to_string()
}

fn default_source() -> String {
    "spool".to_string()
}

impl From<SpoolEvent> for ExternalEvent {
    fn from(spooled: SpoolEvent) -> Self {
        let mut event = ExternalEvent::new(spooled.kind, spooled.event_type, spooled.source).with_body(spooled.body);
        if let Some(id) = spooled.id.filter(|id| !id.trim().is_empty()) {
            event = event.with_id(id);
        }
        for (key, value) in spooled.fields {
            event = event.with_field(key, value);
        }
        event
    }
}

#[derive(Debug, Clone)]
pub struct SpoolSource {
    dir: PathBuf,
}

impl SpoolSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl IngestSource for SpoolSource {
    fn name(&self) -> &str {
        "spool"
    }

    async fn poll(&self) -> Result<Vec<ExternalEvent>, CollaboratorError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CollaboratorError::Unavailable(format!("{}: {e}", self.dir.display())));
            }
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CollaboratorError::Failed(format!("{}: {e}", self.dir.display())))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut events = Vec::with_capacity(paths.len());
        for path in paths {
            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Spool file unreadable");
                    continue;
                }
            };
            match serde_json::from_str::<SpoolEvent>(&raw) {
                Ok(spooled) => events.push(spooled.into()),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Spool file is not a valid event"),
            }
        }
        tracing::debug!(dir = %self.dir.display(), events = events.len(), "Spool polled");
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = SpoolSource::new(dir.path().join("Spool"));
        assert!(source.poll().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reads_json_events() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            r#"{"kind": "EMAIL", "type": "email", "id": "18c2", "source": "gmail",
                "fields": {"from": "a@b.com", "subject": "Hi"}, "body": "Hello"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("b.json"), r#"{"body": "Ping"}"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let events = SpoolSource::new(dir.path()).poll().await.unwrap();
        assert_eq!(events.len(), 2);

        assert_eq!(events[0].kind, "EMAIL");
        assert_eq!(events[0].event_type, "email");
        assert_eq!(events[0].discriminator.as_deref(), Some("18c2"));
        assert_eq!(events[0].source, "gmail");
        assert_eq!(
            events[0].fields,
            vec![
                ("from".to_string(), "a@b.com".to_string()),
                ("subject".to_string(), "Hi".to_string())
            ]
        );
        assert_eq!(events[0].body, "Hello");

        assert_eq!(events[1].kind, "ITEM");
        assert_eq!(events[1].source, "spool");
        assert_eq!(events[1].discriminator, None);
    }

    #[tokio::test]
    async fn test_prefix_accepted_for_kind() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("e.json"), r#"{"prefix": "LINKEDIN_MESSAGE", "body": "x"}"#).unwrap();
        let events = SpoolSource::new(dir.path()).poll().await.unwrap();
        assert_eq!(events[0].kind, "LINKEDIN_MESSAGE");
    }

    #[tokio::test]
    async fn test_invalid_file_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("good.json"), r#"{"body": "ok"}"#).unwrap();

        let events = SpoolSource::new(dir.path()).poll().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].body, "ok");
    }

    #[tokio::test]
    async fn test_blank_id_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("e.json"), r#"{"id": "  ", "body": "x"}"#).unwrap();
        let events = SpoolSource::new(dir.path()).poll().await.unwrap();
        assert_eq!(events[0].discriminator, None);
    }
}
