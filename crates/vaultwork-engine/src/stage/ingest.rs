//! Ingest stage: pull events from sources and write them into the inbox.
//!
//! Each event is hashed over its canonical form; hashes already in the
//! dedup cache are skipped, so a source may return the same event on every
//! poll. The cache is persisted once per tick, not per event.

use async_trait::async_trait;
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use vaultwork_core::{Folder, Status};

use crate::dedup::{content_hash, DedupCache};
use crate::error::{CollaboratorError, StageError};
use crate::record::Record;
use crate::stage::Stage;
use crate::store::VaultStore;
use crate::types::TickReport;

/// An item observed by an ingestion source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEvent {
    /// Record kind as a file name prefix without trailing underscore, e.g.
    /// `EMAIL` or `LINKEDIN_MESSAGE`.
    pub kind: String,
    /// Value for the `type` field, e.g. `email`, `message`.
    pub event_type: String,
    /// Upstream id, used as the file name discriminator when present.
    #[serde(default)]
    pub discriminator: Option<String>,
    pub source: String,
    /// Extra header fields (`from`, `subject`, `title`...).
    #[serde(default)]
    pub fields: Vec<(String, String)>,
    #[serde(default)]
    pub body: String,
    /// Canonical string the dedup hash is computed over. Empty means derive
    /// it from the other fields.
    #[serde(default)]
    pub canonical: String,
}

impl ExternalEvent {
    pub fn new(kind: impl Into<String>, event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            event_type: event_type.into(),
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.discriminator = Some(id.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_canonical(mut self, canonical: impl Into<String>) -> Self {
        self.canonical = canonical.into();
        self
    }

    /// String the dedup hash is computed over.
    pub fn canonical_form(&self) -> String {
        if !self.canonical.is_empty() {
            return self.canonical.clone();
        }
        let mut out = format!("{}|{}|{}", self.source, self.event_type, self.discriminator.as_deref().unwrap_or(""));
        for (k, v) in &self.fields {
            out.push('|');
            out.push_str(k);
            out.push('=');
            out.push_str(v);
        }
        out.push('|');
        out.push_str(&self.body);
        out
    }

    pub fn hash(&self) -> String {
        content_hash(&self.canonical_form())
    }

    /// File stem: `<PREFIX>_<id>` or `<PREFIX>_<YYYYmmddHHMMSS>_<hash8>`.
    pub fn file_stem(&self, hash: &str) -> String {
        let prefix = sanitize(&self.kind.to_uppercase());
        let prefix = if prefix.is_empty() { "ITEM".to_string() } else { prefix };
        match self.discriminator.as_deref().map(sanitize).filter(|id| !id.is_empty()) {
            Some(id) => format!("{prefix}_{id}"),
            None => format!(
                "{prefix}_{}_{}",
                Local::now().format("%Y%m%d%H%M%S"),
                &hash[..hash.len().min(8)]
            ),
        }
    }
}

fn sanitize(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// A place events come from: a mailbox, a notification feed, a spool dir.
#[async_trait]
pub trait IngestSource: Send + Sync {
    fn name(&self) -> &str;

    async fn poll(&self) -> Result<Vec<ExternalEvent>, CollaboratorError>;

    /// Called once the event's record is written (mark read upstream, etc).
    async fn acknowledge(&self, _event: &ExternalEvent) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// Polls every source and writes unseen events into the inbox as `new`.
pub struct IngestStage {
    sources: Vec<Box<dyn IngestSource>>,
    store: VaultStore,
    cache: DedupCache,
    folder: Folder,
}

impl IngestStage {
    pub fn new(store: VaultStore, cache: DedupCache) -> Self {
        Self {
            sources: Vec::new(),
            store,
            cache,
            folder: Folder::Inbox,
        }
    }

    pub fn with_source(mut self, source: Box<dyn IngestSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Folder new records land in. Defaults to `Inbox`.
    pub fn with_folder(mut self, folder: Folder) -> Self {
        self.folder = folder;
        self
    }

    pub fn cache(&self) -> &DedupCache {
        &self.cache
    }

    fn build_record(event: &ExternalEvent, hash: &str) -> Record {
        let mut record = Record::new("", Status::New)
            .with_field("type", event.event_type.as_str())
            .with_field("source", event.source.as_str())
            .with_field("timestamp", Utc::now().to_rfc3339())
            .with_field("hash", hash);
        if let Some(id) = &event.discriminator {
            record.set_field("id", id.as_str());
        }
        for (key, value) in &event.fields {
            let key = key.trim();
            if key.is_empty() || key.contains(':') {
                continue;
            }
            record.set_field(key, value.replace(['\r', '\n'], " ").trim());
        }
        record.with_body(event.body.clone())
    }

    async fn ingest(&mut self, source_index: usize, event: ExternalEvent, report: &mut TickReport) {
        report.scanned += 1;
        let source_name = self.sources[source_index].name().to_string();
        let hash = event.hash();
        if self.cache.contains(&hash) {
            report.skipped += 1;
            return;
        }

        let stem = event.file_stem(&hash);
        if self.store.find(self.folder, &format!("{stem}.md")).is_some() {
            tracing::debug!(source = %source_name, record = %stem, "Record already present, marking seen");
            self.cache.mark_seen(hash);
            report.skipped += 1;
            return;
        }

        let record = Self::build_record(&event, &hash);
        match self.store.create_named(self.folder, &stem, record) {
            Ok(handle) => {
                self.cache.mark_seen(hash);
                report.succeeded += 1;
                tracing::info!(source = %source_name, record = %handle.file_name, "Ingested event");
                if let Err(e) = self.sources[source_index].acknowledge(&event).await {
                    tracing::warn!(source = %source_name, record = %handle.file_name, error = %e, "Acknowledge failed");
                }
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(source = %source_name, record = %stem, error = %e, "Could not write event");
            }
        }
    }
}

#[async_trait]
impl Stage for IngestStage {
    fn name(&self) -> &str {
        "ingest"
    }

    async fn tick(&mut self) -> Result<TickReport, StageError> {
        let mut report = TickReport::default();
        for index in 0..self.sources.len() {
            let events = match self.sources[index].poll().await {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!(source = %self.sources[index].name(), error = %e, "Source poll failed");
                    report.deferred += 1;
                    continue;
                }
            };
            for event in events {
                self.ingest(index, event, &mut report).await;
            }
        }

        if self.cache.is_dirty() {
            self.cache.persist()?;
        }
        if report.succeeded > 0 {
            tracing::info!(stage = "ingest", %report, "Tick complete");
        }
        Ok(report)
    }

    async fn shutdown(&mut self) -> Result<(), StageError> {
        if self.cache.is_dirty() {
            self.cache.persist()?;
        }
        Ok(())
    }
}
