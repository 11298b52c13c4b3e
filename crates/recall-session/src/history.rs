use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use recall_core::Role;

/// Messages kept on disk per session. Older messages are evicted FIFO.
pub const DEFAULT_PERSIST_LIMIT: usize = 20;

/// One message in a session's log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    started_at: DateTime<Utc>,
    messages: Vec<StoredMessage>,
}

/// Bounded per-session message log, one JSON file per session key.
///
/// A session is created on its first append, persisted synchronously after
/// every append so history survives process restarts, and cleared only by
/// an explicit reset. Sessions never expire automatically and have no
/// cross-session visibility.
#[derive(Debug, Clone)]
pub struct ConversationLog {
    base_dir: PathBuf,
    persist_limit: usize,
}

impl ConversationLog {
    pub fn new(base_dir: PathBuf, persist_limit: usize) -> Self {
        Self {
            base_dir,
            persist_limit,
        }
    }

    /// Append one message, evicting the oldest if the retention bound is
    /// exceeded, and persist immediately.
    pub fn append(&self, session_key: &str, role: Role, content: &str) -> Result<()> {
        let mut record = self.load(session_key)?.unwrap_or_else(|| SessionRecord {
            started_at: Utc::now(),
            messages: Vec::new(),
        });

        record.messages.push(StoredMessage {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });

        let excess = record.messages.len().saturating_sub(self.persist_limit);
        if excess > 0 {
            record.messages.drain(..excess);
        }

        self.save(session_key, &record)
    }

    /// The last `n` messages in original order. Empty for unknown sessions.
    pub fn recent(&self, session_key: &str, n: usize) -> Result<Vec<StoredMessage>> {
        let messages = match self.load(session_key)? {
            Some(record) => record.messages,
            None => return Ok(Vec::new()),
        };
        let skip = messages.len().saturating_sub(n);
        Ok(messages.into_iter().skip(skip).collect())
    }

    /// Irreversible full truncation of one session's log. Store contents
    /// are untouched.
    pub fn reset(&self, session_key: &str) -> Result<()> {
        let path = self.session_path(session_key);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to reset session: {}", path.display()))?;
        }
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn session_path(&self, session_key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", sanitize_key(session_key)))
    }

    fn load(&self, session_key: &str) -> Result<Option<SessionRecord>> {
        let path = self.session_path(session_key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read session: {}", path.display()))?;
        let record = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse session: {}", path.display()))?;
        Ok(Some(record))
    }

    fn save(&self, session_key: &str, record: &SessionRecord) -> Result<()> {
        fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("failed to create session dir: {}", self.base_dir.display()))?;

        let path = self.session_path(session_key);
        let tmp_path = path.with_extension("json.tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("failed to open temp session: {}", tmp_path.display()))?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, record)
            .context("failed to serialize session")?;
        writer.flush().context("failed to flush session file")?;

        fs::rename(&tmp_path, &path)
            .with_context(|| format!("failed to atomically replace session: {}", path.display()))
    }
}

/// Session keys come from the transport (chat ids, user ids) and end up as
/// file names; anything outside a safe set collapses to '-'.
fn sanitize_key(session_key: &str) -> String {
    session_key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
