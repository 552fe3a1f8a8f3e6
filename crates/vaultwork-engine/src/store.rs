//! Directory-scoped vault primitives.
//!
//! The vault is a root directory with one sub-directory per [`Folder`] plus an
//! append-only `Dashboard.md`. Every record write goes through a temp file in
//! the target directory followed by a rename, so readers see either the old
//! or the new content, never a partial file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use regex::Regex;
use vaultwork_core::{Folder, RecordKind};

use crate::error::StoreError;
use crate::record::Record;

pub const DEFAULT_DASHBOARD_FILE: &str = "Dashboard.md";

const RECORD_EXTENSION: &str = ".md";

/// Location of a record file inside the vault.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordHandle {
    pub folder: Folder,
    pub file_name: String,
    pub path: PathBuf,
}

impl RecordHandle {
    /// File stem, used as the record id.
    pub fn id(&self) -> &str {
        self.file_name
            .strip_suffix(RECORD_EXTENSION)
            .unwrap_or(&self.file_name)
    }

    pub fn kind(&self) -> RecordKind {
        RecordKind::from_file_name(&self.file_name)
    }
}

/// File-backed record store rooted at a vault directory.
#[derive(Debug, Clone)]
pub struct VaultStore {
    root: PathBuf,
    dashboard_file: String,
}

impl VaultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dashboard_file: DEFAULT_DASHBOARD_FILE.to_string(),
        }
    }

    pub fn with_dashboard_file(mut self, name: impl Into<String>) -> Self {
        self.dashboard_file = name.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn folder_path(&self, folder: Folder) -> PathBuf {
        self.root.join(folder.dir_name())
    }

    pub fn dashboard_path(&self) -> PathBuf {
        self.root.join(&self.dashboard_file)
    }

    /// Create every folder directory if missing.
    pub fn ensure_layout(&self) -> Result<(), StoreError> {
        for folder in Folder::ALL {
            let dir = self.folder_path(folder);
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Handle for `file_name` in `folder`, whether or not the file exists.
    pub fn handle(&self, folder: Folder, file_name: impl Into<String>) -> RecordHandle {
        let file_name = file_name.into();
        RecordHandle {
            path: self.folder_path(folder).join(&file_name),
            folder,
            file_name,
        }
    }

    /// Snapshot of record files in `folder` whose names match `glob`.
    ///
    /// `glob` supports `*` and `?`. Hidden files (including in-flight temp
    /// files) and non-`.md` files are skipped. A missing folder is empty.
    pub fn list(&self, folder: Folder, glob: &str) -> Result<Vec<RecordHandle>, StoreError> {
        let pattern = glob_to_regex(glob)?;
        let dir = self.folder_path(folder);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut handles = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') || !name.ends_with(RECORD_EXTENSION) {
                continue;
            }
            if !pattern.is_match(&name) {
                continue;
            }
            if entry.file_type().map(|t| !t.is_file()).unwrap_or(true) {
                continue;
            }
            handles.push(self.handle(folder, name));
        }
        Ok(handles)
    }

    pub fn read_raw(&self, handle: &RecordHandle) -> Result<String, StoreError> {
        fs::read_to_string(&handle.path).map_err(|e| StoreError::io(&handle.path, e))
    }

    /// Read and parse a record. Header problems surface as `Corrupt`.
    pub fn read_record(&self, handle: &RecordHandle) -> Result<Record, StoreError> {
        let raw = self.read_raw(handle)?;
        Record::parse(&handle.file_name, &raw).map_err(|source| StoreError::Corrupt {
            path: handle.path.clone(),
            source,
        })
    }

    /// Overwrite the file at `handle` with `record`, all or nothing.
    pub fn write_record(&self, handle: &RecordHandle, record: &Record) -> Result<(), StoreError> {
        write_atomic(&handle.path, record.to_text().as_bytes())
    }

    /// Write a new record named `<PREFIX>_<discriminator>.md` into `folder`.
    ///
    /// The record's id is replaced with the generated stem.
    pub fn create_record(
        &self,
        folder: Folder,
        kind: RecordKind,
        discriminator: &str,
        record: Record,
    ) -> Result<RecordHandle, StoreError> {
        self.create_named(folder, &format!("{}_{}", kind.prefix(), discriminator), record)
    }

    /// Write a new record with an explicit stem, for prefixes chosen by
    /// ingestion sources or derived from a source record.
    pub fn create_named(
        &self,
        folder: Folder,
        stem: &str,
        mut record: Record,
    ) -> Result<RecordHandle, StoreError> {
        record.id = stem.to_string();
        record.kind = RecordKind::from_file_name(stem);
        let handle = self.handle(folder, record.file_name());
        self.write_record(&handle, &record)?;
        Ok(handle)
    }

    /// Move a record to another folder. An existing file at the destination
    /// is replaced.
    pub fn relocate(&self, handle: &RecordHandle, folder: Folder) -> Result<RecordHandle, StoreError> {
        if handle.folder == folder {
            return Ok(handle.clone());
        }
        let target = self.handle(folder, handle.file_name.clone());
        let dir = self.folder_path(folder);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        fs::rename(&handle.path, &target.path).map_err(|e| StoreError::io(&handle.path, e))?;
        tracing::debug!(
            record = %handle.file_name,
            from = %handle.folder,
            to = %folder,
            "Relocated record"
        );
        Ok(target)
    }

    /// Resolve a pairing key (a file name) in `folder`.
    pub fn find(&self, folder: Folder, file_name: &str) -> Option<RecordHandle> {
        let name = Path::new(file_name).file_name()?.to_str()?;
        let handle = self.handle(folder, name);
        handle.path.is_file().then_some(handle)
    }

    /// Append `- <timestamp> <line>` to the dashboard. Never truncates.
    pub fn append_log(&self, line: &str) -> Result<(), StoreError> {
        let path = self.dashboard_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let entry = format!(
            "- {} {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            line.replace('\n', " ")
        );
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        file.write_all(entry.as_bytes())
            .map_err(|e| StoreError::io(&path, e))
    }
}

/// Write `contents` to `path` through a hidden temp file and rename.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("record");
    let temp_path = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

    let result = (|| {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(StoreError::io(path, e));
    }
    Ok(())
}

fn glob_to_regex(glob: &str) -> Result<Regex, StoreError> {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push('^');
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|e| StoreError::InvalidPattern(format!("{glob}: {e}")))
}
