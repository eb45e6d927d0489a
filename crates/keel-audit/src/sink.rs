//! Audit sink implementations

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use keel_types::{AuditRecord, ComponentId};

use crate::error::AuditResult;

/// Append-only destination for audit records.
///
/// Called synchronously under the per-component sequence lock. Records for
/// one component arrive in sequence order.
pub trait AuditSink: Send + Sync {
    /// Append one record
    fn append(&self, record: &AuditRecord) -> AuditResult<()>;

    /// Sink name for logging
    fn name(&self) -> &str;
}

/// In-memory sink for development and testing
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in append order
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records for one component in append order
    pub fn for_component(&self, component: &ComponentId) -> Vec<AuditRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| &r.component == component)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, record: &AuditRecord) -> AuditResult<()> {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// One JSON object per line, flushed after every record.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlAuditSink {
    /// Open `path` for appending, creating it and its parent directory.
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, record: &AuditRecord) -> AuditResult<()> {
        let line = serde_json::to_string(record)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_types::AuditEvent;

    fn record(component: &str, sequence: u64) -> AuditRecord {
        AuditRecord::new(
            ComponentId::new(component),
            sequence,
            AuditEvent::RollbackSkipped {
                reason: "no target".into(),
            },
        )
    }

    #[test]
    fn test_memory_sink_filters_by_component() {
        let sink = MemoryAuditSink::new();
        sink.append(&record("api", 1)).unwrap();
        sink.append(&record("cache", 1)).unwrap();
        sink.append(&record("api", 2)).unwrap();

        assert_eq!(sink.len(), 3);
        let api = sink.for_component(&ComponentId::new("api"));
        assert_eq!(api.len(), 2);
        assert_eq!(api[1].sequence, 2);
    }

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("keel.jsonl");

        let sink = JsonlAuditSink::open(&path).unwrap();
        sink.append(&record("api", 1)).unwrap();
        sink.append(&record("api", 2)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["sequence"], 2);
        assert_eq!(second["component"], "api");
    }

    #[test]
    fn test_jsonl_sink_reopens_in_append_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keel.jsonl");

        JsonlAuditSink::open(&path)
            .unwrap()
            .append(&record("api", 1))
            .unwrap();
        JsonlAuditSink::open(&path)
            .unwrap()
            .append(&record("api", 2))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
