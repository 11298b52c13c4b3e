use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::warn;

use recall_core::AuditRecord;

/// Append-only JSONL log of state-changing store operations.
///
/// Records are never mutated or deleted; appends are serialized by a single
/// lock so interleaved writers from concurrent sessions keep the log
/// ordering meaningful.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn append(&self, record: &AuditRecord) -> Result<()> {
        let _guard = self.write_lock.lock().expect("audit lock poisoned");

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create audit dir: {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .with_context(|| format!("failed to open audit log: {}", self.path.display()))?;

        let line = serde_json::to_string(record).context("failed to serialize audit record")?;
        writeln!(file, "{line}").context("failed to append audit record")?;
        file.flush().context("failed to flush audit append")?;

        Ok(())
    }

    /// Read records, newest first. Corrupt lines are skipped with a warning
    /// rather than poisoning the whole log.
    pub fn recent(&self, limit: Option<usize>) -> Result<Vec<AuditRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = OpenOptions::new()
            .read(true)
            .open(&self.path)
            .with_context(|| format!("failed to read audit log: {}", self.path.display()))?;
        let reader = BufReader::new(file);

        let mut records = Vec::new();
        for (idx, line_result) in reader.lines().enumerate() {
            let line = line_result.with_context(|| {
                format!(
                    "failed to read audit line {} from {}",
                    idx + 1,
                    self.path.display()
                )
            })?;

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<AuditRecord>(&line) {
                Ok(record) => records.push(record),
                Err(error) => {
                    warn!(
                        path = %self.path.display(),
                        line_number = idx + 1,
                        %error,
                        "skipping corrupt audit line"
                    );
                }
            }
        }

        records.reverse();
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use recall_core::{AuditOp, Category};
    use tempfile::TempDir;
    use ulid::Ulid;

    fn make_record(operation: AuditOp) -> AuditRecord {
        AuditRecord {
            operation,
            entry_id: Ulid::new(),
            category_before: None,
            category_after: Some(Category::People),
            raw_text: None,
            timestamp: Utc::now(),
            session_key: "chat-1".to_string(),
        }
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path().join("audit.jsonl"));

        log.append(&make_record(AuditOp::Create)).unwrap();
        log.append(&make_record(AuditOp::Move)).unwrap();
        log.append(&make_record(AuditOp::Delete)).unwrap();

        let records = log.recent(None).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].operation, AuditOp::Delete);
        assert_eq!(records[2].operation, AuditOp::Create);

        let limited = log.recent(Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].operation, AuditOp::Delete);
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path().join("audit.jsonl"));
        assert!(log.recent(None).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_line_tolerance() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::new(path.clone());

        log.append(&make_record(AuditOp::Create)).unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(file, "{{ not valid json").unwrap();
        }
        log.append(&make_record(AuditOp::Delete)).unwrap();

        let records = log.recent(None).unwrap();
        assert_eq!(records.len(), 2);
    }
}
