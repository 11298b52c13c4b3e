use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde_json::Value;

/// Small key-value state file for background bookkeeping, e.g. the last
/// digest timestamp. Not a general store; keep it to a handful of keys.
#[derive(Debug)]
pub struct StateFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl StateFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock().expect("state lock poisoned");
        Ok(self.load()?.get(key).cloned())
    }

    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.lock().expect("state lock poisoned");
        let mut state = self.load()?;
        state.insert(key.to_string(), value);
        self.save(&state)
    }

    fn load(&self) -> Result<BTreeMap<String, Value>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read state file: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse state file: {}", self.path.display()))
    }

    fn save(&self, state: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create state dir: {}", parent.display()))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("failed to open temp state file: {}", tmp_path.display()))?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, state).context("failed to serialize state")?;
        writer.flush().context("failed to flush state file")?;

        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "failed to atomically replace state file: {}",
                self.path.display()
            )
        })
    }
}
