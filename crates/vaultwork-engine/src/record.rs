//! Record model: ordered metadata plus a free-form body.

use std::collections::BTreeMap;

use vaultwork_core::{RecordKind, Status};

use crate::codec;
use crate::error::ParseError;
use crate::state_machine;

/// Ordered string-to-string mapping parsed from a record header.
///
/// Keys are case-folded on insert. Insertion order is kept for readable
/// files but carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value with one pair of surrounding quotes removed (`subject: "Hi"`).
    pub fn get_unquoted(&self, key: &str) -> Option<&str> {
        self.get(key).map(unquote)
    }

    /// Insert or replace a value, returning the previous one.
    ///
    /// Line breaks in keys and values, and `:` in keys, are flattened so a
    /// single entry always serializes to a single header line.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = header_key(key.into());
        let value = header_value(value.into());
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let key = key.to_lowercase();
        let index = self.entries.iter().position(|(k, _)| *k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Order-insensitive view, for comparisons.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries.iter().cloned().collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (k, v) in iter {
            metadata.insert(k, v);
        }
        metadata
    }
}

fn header_key(key: String) -> String {
    let key = key.to_lowercase();
    if key.contains([':', '\r', '\n']) {
        key.replace([':', '\r', '\n'], "_").trim().to_string()
    } else {
        key
    }
}

fn header_value(value: String) -> String {
    if value.contains(['\r', '\n']) {
        value.replace("\r\n", " ").replace(['\r', '\n'], " ")
    } else {
        value
    }
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Codec-level view of a record file: header block and body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    pub metadata: Metadata,
    pub body: String,
}

/// A single unit of work stored as one file.
///
/// `status` is held typed and outside `metadata`; it is written as the first
/// header line on serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// File stem, unique within a folder.
    pub id: String,
    pub kind: RecordKind,
    pub status: Status,
    pub metadata: Metadata,
    pub body: String,
}

impl Record {
    /// A new record whose kind is derived from `id`'s prefix.
    pub fn new(id: impl Into<String>, status: Status) -> Self {
        let id = id.into();
        let kind = RecordKind::from_file_name(&id);
        Self {
            id,
            kind,
            status,
            metadata: Metadata::new(),
            body: String::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_field(key, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a metadata field. `status` is ignored here; status changes go
    /// through the state machine.
    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = header_key(key.into());
        if key.trim() == "status" {
            return;
        }
        self.metadata.insert(key, value);
    }

    /// Unquoted metadata value, treating empty values as absent.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.metadata
            .get_unquoted(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn file_name(&self) -> String {
        format!("{}.md", self.id)
    }

    /// Build a record from parsed frontmatter, enforcing the status invariant.
    pub fn from_frontmatter(file_name: &str, frontmatter: Frontmatter) -> Result<Self, ParseError> {
        let id = file_name.strip_suffix(".md").unwrap_or(file_name).to_string();
        let kind = RecordKind::from_file_name(&id);
        let mut metadata = frontmatter.metadata;
        let raw_status = metadata.remove("status").ok_or(ParseError::MissingStatus)?;
        let status = raw_status
            .parse::<Status>()
            .ok()
            .filter(|s| state_machine::is_legal(kind, *s))
            .ok_or(ParseError::IllegalStatus {
                status: raw_status.clone(),
                kind,
            })?;
        Ok(Self {
            id,
            kind,
            status,
            metadata,
            body: frontmatter.body,
        })
    }

    /// Parse a full record file.
    pub fn parse(file_name: &str, raw: &str) -> Result<Self, ParseError> {
        Self::from_frontmatter(file_name, codec::parse(raw)?)
    }

    pub fn to_frontmatter(&self) -> Frontmatter {
        let mut metadata = Metadata::new();
        metadata.insert("status", self.status.as_str());
        for (k, v) in self.metadata.iter().filter(|(k, _)| *k != "status") {
            metadata.insert(k, v);
        }
        Frontmatter {
            metadata,
            body: self.body.clone(),
        }
    }

    /// The full file content.
    pub fn to_text(&self) -> String {
        codec::serialize(&self.to_frontmatter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_keys_are_case_folded() {
        let mut metadata = Metadata::new();
        metadata.insert("Subject", "Hello");
        assert_eq!(metadata.get("subject"), Some("Hello"));
        assert_eq!(metadata.get("SUBJECT"), Some("Hello"));
        assert_eq!(metadata.insert("SUBJECT", "Re: Hello"), Some("Hello".to_string()));
        assert_eq!(metadata.len(), 1);
    }

    #[test]
    fn test_metadata_keeps_insertion_order() {
        let metadata: Metadata = [("b", "2"), ("a", "1"), ("c", "3")].into_iter().collect();
        let keys: Vec<&str> = metadata.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_metadata_remove() {
        let mut metadata: Metadata = [("a", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(metadata.remove("A"), Some("1".to_string()));
        assert_eq!(metadata.remove("a"), None);
        assert!(!metadata.contains_key("a"));
        assert!(metadata.contains_key("b"));
    }

    #[test]
    fn test_get_unquoted() {
        let metadata: Metadata = [
            ("subject", "\"Quarterly report\""),
            ("title", "'single'"),
            ("odd", "\"unbalanced"),
            ("bare", "\""),
        ]
        .into_iter()
        .collect();
        assert_eq!(metadata.get_unquoted("subject"), Some("Quarterly report"));
        assert_eq!(metadata.get_unquoted("title"), Some("single"));
        assert_eq!(metadata.get_unquoted("odd"), Some("\"unbalanced"));
        assert_eq!(metadata.get_unquoted("bare"), Some("\""));
        assert_eq!(metadata.get("subject"), Some("\"Quarterly report\""));
    }

    #[test]
    fn test_record_kind_from_id() {
        assert_eq!(Record::new("PLAN_EMAIL_1", Status::AwaitingApproval).kind, RecordKind::Plan);
        assert_eq!(Record::new("EMAIL_1", Status::New).kind, RecordKind::Email);
        assert_eq!(Record::new("FILE_notes", Status::New).kind, RecordKind::InboxItem);
    }

    #[test]
    fn test_set_field_ignores_status() {
        let mut record = Record::new("EMAIL_1", Status::New);
        record.set_field("Status", "sent");
        assert_eq!(record.status, Status::New);
        assert!(!record.metadata.contains_key("status"));
    }

    #[test]
    fn test_metadata_flattens_line_breaks() {
        let mut metadata = Metadata::new();
        metadata.insert("recipient", "a@b.com\nstatus: approved");
        metadata.insert("note\r\nstatus", "x");
        assert_eq!(metadata.get("recipient"), Some("a@b.com status: approved"));
        assert_eq!(metadata.get("note__status"), Some("x"));
        assert!(!metadata.contains_key("status"));
    }

    #[test]
    fn test_set_field_cannot_smuggle_status() {
        let mut record = Record::new("DRAFT_1", Status::AwaitingApproval);
        record.set_field("subject", "Hi\r\nstatus: approved");
        record.set_field("status : approved", "yes");
        record.set_field("STATUS", "approved");

        let reparsed = Record::parse(&record.file_name(), &record.to_text()).unwrap();
        assert_eq!(reparsed.status, Status::AwaitingApproval);
        assert_eq!(reparsed.field("subject"), Some("Hi status: approved"));
        assert_eq!(reparsed.field("status _ approved"), Some("yes"));

        record.metadata.insert("status", "approved");
        let reparsed = Record::parse(&record.file_name(), &record.to_text()).unwrap();
        assert_eq!(reparsed.status, Status::AwaitingApproval);
    }

    #[test]
    fn test_field_treats_blank_as_absent() {
        let record = Record::new("DRAFT_1", Status::Approved)
            .with_field("recipient", "  ")
            .with_field("subject", "\"Hi\"");
        assert_eq!(record.field("recipient"), None);
        assert_eq!(record.field("subject"), Some("Hi"));
        assert_eq!(record.field("missing"), None);
    }

    #[test]
    fn test_parse_requires_status() {
        let err = Record::parse("EMAIL_1.md", "---\nsubject: Hi\n---\nbody").unwrap_err();
        assert_eq!(err, ParseError::MissingStatus);
    }

    #[test]
    fn test_parse_rejects_status_illegal_for_kind() {
        let err = Record::parse("EMAIL_1.md", "---\nstatus: sent\n---\n").unwrap_err();
        assert_eq!(
            err,
            ParseError::IllegalStatus {
                status: "sent".to_string(),
                kind: RecordKind::Email
            }
        );
        let err = Record::parse("DRAFT_1.md", "---\nstatus: draft\n---\n").unwrap_err();
        assert!(matches!(err, ParseError::IllegalStatus { .. }));
    }

    #[test]
    fn test_parse_builds_record() {
        let raw = "---\nstatus: approved\nrecipient: a@b.com\nsubject: \"Hi\"\n---\n\nHi there";
        let record = Record::parse("DRAFT_EMAIL_1.md", raw).unwrap();
        assert_eq!(record.id, "DRAFT_EMAIL_1");
        assert_eq!(record.kind, RecordKind::Draft);
        assert_eq!(record.status, Status::Approved);
        assert_eq!(record.field("recipient"), Some("a@b.com"));
        assert_eq!(record.field("subject"), Some("Hi"));
        assert_eq!(record.body, "Hi there");
        assert_eq!(record.file_name(), "DRAFT_EMAIL_1.md");
    }

    #[test]
    fn test_to_text_writes_status_first_and_reparses() {
        let record = Record::new("PLAN_EMAIL_1", Status::AwaitingApproval)
            .with_field("original_file", "EMAIL_1.md")
            .with_field("action", "draft_email")
            .with_body("## Intent\nReply");
        let text = record.to_text();
        assert!(text.starts_with("---\nstatus: awaiting_approval\n"));
        let reparsed = Record::parse(&record.file_name(), &text).unwrap();
        assert_eq!(reparsed, record);
    }
}
