use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use ulid::Ulid;

/// Persisted lookup from an outbound confirmation's transport message ref
/// to the entries that confirmation described.
///
/// This is a weak back-reference: entries never depend on a mapping
/// existing, and a mapping may point at entries that have since been
/// deleted. Resolution is the caller's job to filter against the live
/// store; an unresolvable ref is a normal outcome, not an error.
#[derive(Debug)]
pub struct ReplyIndex {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ReplyIndex {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Record that the confirmation sent as `message_ref` described these
    /// entries.
    pub fn record(&self, message_ref: &str, entry_ids: &[Ulid]) -> Result<()> {
        if entry_ids.is_empty() {
            return Ok(());
        }

        let _guard = self.lock.lock().expect("reply index lock poisoned");
        let mut index = self.load()?;
        index.insert(message_ref.to_string(), entry_ids.to_vec());
        self.save(&index)
    }

    /// Entry ids recorded for `message_ref`, in recording order. Empty when
    /// the ref was never recorded (e.g. the index predates a reset). A
    /// lookup never alters the index.
    pub fn resolve(&self, message_ref: &str) -> Result<Vec<Ulid>> {
        let _guard = self.lock.lock().expect("reply index lock poisoned");
        Ok(self
            .load()?
            .get(message_ref)
            .cloned()
            .unwrap_or_default())
    }

    fn load(&self) -> Result<BTreeMap<String, Vec<Ulid>>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read reply index: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse reply index: {}", self.path.display()))
    }

    fn save(&self, index: &BTreeMap<String, Vec<Ulid>>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create reply index dir: {}", parent.display())
            })?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| {
                format!("failed to open temp reply index: {}", tmp_path.display())
            })?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, index)
            .context("failed to serialize reply index")?;
        writer.flush().context("failed to flush reply index")?;

        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "failed to atomically replace reply index: {}",
                self.path.display()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_and_resolve() {
        let dir = TempDir::new().unwrap();
        let index = ReplyIndex::new(dir.path().join("replies.json"));

        let id = Ulid::new();
        index.record("msg-42", &[id]).unwrap();

        assert_eq!(index.resolve("msg-42").unwrap(), vec![id]);
    }

    #[test]
    fn test_resolve_does_not_consume_the_mapping() {
        let dir = TempDir::new().unwrap();
        let index = ReplyIndex::new(dir.path().join("replies.json"));

        let id = Ulid::new();
        index.record("msg-42", &[id]).unwrap();

        assert_eq!(index.resolve("msg-42").unwrap(), vec![id]);
        assert_eq!(index.resolve("msg-42").unwrap(), vec![id]);
    }

    #[test]
    fn test_unknown_ref_resolves_empty() {
        let dir = TempDir::new().unwrap();
        let index = ReplyIndex::new(dir.path().join("replies.json"));
        assert!(index.resolve("never-sent").unwrap().is_empty());
    }

    #[test]
    fn test_record_empty_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("replies.json");
        let index = ReplyIndex::new(path.clone());

        index.record("msg-1", &[]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_index_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("replies.json");
        let id = Ulid::new();

        ReplyIndex::new(path.clone()).record("msg-7", &[id]).unwrap();
        assert_eq!(ReplyIndex::new(path).resolve("msg-7").unwrap(), vec![id]);
    }

    #[test]
    fn test_multiple_entries_keep_recording_order() {
        let dir = TempDir::new().unwrap();
        let index = ReplyIndex::new(dir.path().join("replies.json"));

        let ids = vec![Ulid::new(), Ulid::new()];
        index.record("msg-9", &ids).unwrap();
        assert_eq!(index.resolve("msg-9").unwrap(), ids);
    }
}
