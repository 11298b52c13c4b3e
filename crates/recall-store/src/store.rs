use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use ulid::Ulid;

use recall_core::{AuditOp, AuditRecord, Category, Entry, StoreError};

use crate::audit::AuditLog;

/// CRUD facade over the per-category entry collections.
///
/// Each category is one JSON file under the base directory and is the unit
/// of mutual exclusion: mutations take that category's lock, so concurrent
/// sessions never interleave read-modify-write cycles on the same
/// collection. The facade is category-agnostic about confidence; routing
/// low-confidence creations to `review` is the caller's decision.
#[derive(Debug)]
pub struct EntryStore {
    base_dir: PathBuf,
    locks: [Mutex<()>; Category::ALL.len()],
    audit: AuditLog,
}

impl EntryStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            audit: AuditLog::new(base_dir.join("audit.jsonl")),
            locks: Default::default(),
            base_dir,
        }
    }

    /// Create a new entry in `category` and append a create audit record.
    pub fn create(
        &self,
        category: Category,
        raw_text: &str,
        confidence: f64,
        session_key: &str,
    ) -> Result<Entry> {
        let now = Utc::now();
        let entry = Entry {
            id: Ulid::new(),
            category,
            raw_text: raw_text.to_string(),
            confidence,
            created_at: now,
            last_modified_at: now,
            origin_session: Some(session_key.to_string()),
            origin_message_ref: None,
            corrected_from: None,
        };

        {
            let _guard = self.lock(category);
            let mut entries = self.load_category(category)?;
            entries.push(entry.clone());
            self.save_category(category, &entries)?;
        }

        self.audit.append(&AuditRecord {
            operation: AuditOp::Create,
            entry_id: entry.id,
            category_before: None,
            category_after: Some(category),
            raw_text: None,
            timestamp: now,
            session_key: session_key.to_string(),
        })?;

        Ok(entry)
    }

    /// Look up an entry by id across all collections.
    pub fn get(&self, id: Ulid) -> Result<Entry> {
        for category in Category::ALL {
            if let Some(entry) = self
                .load_category(category)?
                .into_iter()
                .find(|entry| entry.id == id)
            {
                return Ok(entry);
            }
        }
        Err(StoreError::NotFound(id.to_string()).into())
    }

    /// List a category's entries, most recent first.
    pub fn list(&self, category: Category, limit: Option<usize>) -> Result<Vec<Entry>> {
        let mut entries = self.load_category(category)?;
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    /// Case-insensitive substring search over `raw_text`, recency order.
    /// Relevance ranking is deliberately out of scope.
    pub fn search(&self, query: &str, categories: Option<&[Category]>) -> Result<Vec<Entry>> {
        let matcher = RegexBuilder::new(&regex::escape(query))
            .case_insensitive(true)
            .build()
            .with_context(|| format!("invalid search query: {query}"))?;

        let scope: Vec<Category> = match categories {
            Some(categories) => categories.to_vec(),
            None => Category::ALL.to_vec(),
        };

        let mut matches = Vec::new();
        for category in scope {
            matches.extend(
                self.load_category(category)?
                    .into_iter()
                    .filter(|entry| matcher.is_match(&entry.raw_text)),
            );
        }
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }

    /// Move an entry to another category, recording the immediately prior
    /// category in `corrected_from`. A move to the entry's current category
    /// is rejected with `NoOpMove`.
    pub fn move_entry(&self, id: Ulid, to_category: Category, session_key: &str) -> Result<Entry> {
        let current = self.get(id)?;
        let from_category = current.category;
        if from_category == to_category {
            return Err(StoreError::NoOpMove {
                id: id.to_string(),
                category: to_category.to_string(),
            }
            .into());
        }

        let moved = {
            let _guards = self.lock_pair(from_category, to_category);

            let mut source = self.load_category(from_category)?;
            let position = source
                .iter()
                .position(|entry| entry.id == id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            let mut entry = source.remove(position);

            entry.corrected_from = Some(from_category);
            entry.category = to_category;
            entry.last_modified_at = Utc::now();

            let mut destination = self.load_category(to_category)?;
            destination.push(entry.clone());

            self.save_category(from_category, &source)?;
            self.save_category(to_category, &destination)?;
            entry
        };

        self.audit.append(&AuditRecord {
            operation: AuditOp::Move,
            entry_id: id,
            category_before: Some(from_category),
            category_after: Some(to_category),
            raw_text: None,
            timestamp: moved.last_modified_at,
            session_key: session_key.to_string(),
        })?;

        Ok(moved)
    }

    /// Delete an entry from the claimed category. The audit record keeps
    /// the entry's last category and text so the deletion remains
    /// reconstructible from the log alone.
    pub fn delete(&self, id: Ulid, category: Category, session_key: &str) -> Result<()> {
        let removed = {
            let _guard = self.lock(category);
            let mut entries = self.load_category(category)?;
            let position = entries.iter().position(|entry| entry.id == id);
            match position {
                Some(position) => {
                    let removed = entries.remove(position);
                    self.save_category(category, &entries)?;
                    removed
                }
                None => {
                    drop(_guard);
                    // Distinguish a wrong claimed category from a missing entry.
                    return match self.get(id) {
                        Ok(found) => Err(StoreError::CategoryMismatch {
                            id: id.to_string(),
                            claimed: category.to_string(),
                            actual: found.category.to_string(),
                        }
                        .into()),
                        Err(err) => Err(err),
                    };
                }
            }
        };

        self.audit.append(&AuditRecord {
            operation: AuditOp::Delete,
            entry_id: id,
            category_before: Some(category),
            category_after: None,
            raw_text: Some(removed.raw_text),
            timestamp: Utc::now(),
            session_key: session_key.to_string(),
        })?;

        Ok(())
    }

    /// Stamp the outbound confirmation ref on an entry. Internal wiring for
    /// reply correlation; not an audited mutation kind.
    pub fn set_origin_ref(&self, id: Ulid, message_ref: &str) -> Result<()> {
        let current = self.get(id)?;
        let category = current.category;

        let _guard = self.lock(category);
        let mut entries = self.load_category(category)?;
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        entry.origin_message_ref = Some(message_ref.to_string());
        self.save_category(category, &entries)
    }

    /// Entries created after `since`, oldest first, for digest rendering.
    pub fn created_since(&self, category: Category, since: DateTime<Utc>) -> Result<Vec<Entry>> {
        let mut entries: Vec<Entry> = self
            .load_category(category)?
            .into_iter()
            .filter(|entry| entry.created_at > since)
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn category_path(&self, category: Category) -> PathBuf {
        self.base_dir.join(format!("{category}.json"))
    }

    fn lock(&self, category: Category) -> MutexGuard<'_, ()> {
        let index = Category::ALL
            .iter()
            .position(|candidate| *candidate == category)
            .expect("category is a member of Category::ALL");
        self.locks[index].lock().expect("category lock poisoned")
    }

    /// Acquire two category locks in the stable `Category::ALL` order so
    /// concurrent cross-category moves cannot deadlock.
    fn lock_pair(&self, a: Category, b: Category) -> (MutexGuard<'_, ()>, MutexGuard<'_, ()>) {
        if a < b {
            (self.lock(a), self.lock(b))
        } else {
            (self.lock(b), self.lock(a))
        }
    }

    fn load_category(&self, category: Category) -> Result<Vec<Entry>> {
        let path = self.category_path(category);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read collection: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse collection: {}", path.display()))
    }

    fn save_category(&self, category: Category, entries: &[Entry]) -> Result<()> {
        self.ensure_base_dir()?;

        let path = self.category_path(category);
        let tmp_path = self.base_dir.join(format!("{category}.json.tmp"));
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("failed to open temp collection: {}", tmp_path.display()))?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, entries)
            .with_context(|| format!("failed to serialize collection: {category}"))?;
        writer
            .flush()
            .with_context(|| format!("failed to flush collection: {category}"))?;

        fs::rename(&tmp_path, &path).with_context(|| {
            format!("failed to atomically replace collection: {}", path.display())
        })
    }

    fn ensure_base_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("failed to create store dir: {}", self.base_dir.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_test_store() -> (TempDir, EntryStore) {
        let dir = TempDir::new().unwrap();
        let store = EntryStore::new(dir.path().join("brain"));
        (dir, store)
    }

    fn store_err(err: &anyhow::Error) -> &StoreError {
        err.downcast_ref::<StoreError>().expect("store error")
    }

    #[test]
    fn test_create_and_get() {
        let (_dir, store) = make_test_store();

        let entry = store
            .create(Category::People, "Felipe is my partner", 0.92, "chat-1")
            .unwrap();

        let fetched = store.get(entry.id).unwrap();
        assert_eq!(fetched.category, Category::People);
        assert_eq!(fetched.raw_text, "Felipe is my partner");
        assert_eq!(fetched.confidence, 0.92);
        assert_eq!(fetched.origin_session.as_deref(), Some("chat-1"));
        assert_eq!(fetched.corrected_from, None);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let (_dir, store) = make_test_store();
        let err = store.get(Ulid::new()).unwrap_err();
        assert!(matches!(store_err(&err), StoreError::NotFound(_)));
    }

    #[test]
    fn test_ids_are_unique() {
        let (_dir, store) = make_test_store();
        let a = store.create(Category::Ideas, "a", 0.9, "chat-1").unwrap();
        let b = store.create(Category::Ideas, "b", 0.9, "chat-1").unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_list_most_recent_first() {
        let (_dir, store) = make_test_store();
        let first = store
            .create(Category::Projects, "first", 0.8, "chat-1")
            .unwrap();
        let second = store
            .create(Category::Projects, "second", 0.8, "chat-1")
            .unwrap();

        let listed = store.list(Category::Projects, None).unwrap();
        assert_eq!(listed.len(), 2);
        // Same-instant ULIDs still order by creation because created_at is
        // monotonic enough at millisecond granularity; assert membership
        // plus limit behavior rather than exact tie order.
        assert!(listed.iter().any(|entry| entry.id == first.id));
        assert!(listed.iter().any(|entry| entry.id == second.id));

        let limited = store.list(Category::Projects, Some(1)).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let (_dir, store) = make_test_store();
        store
            .create(Category::People, "Felipe is my business partner", 0.9, "s")
            .unwrap();
        store
            .create(Category::Ideas, "ballbox prototype", 0.9, "s")
            .unwrap();

        let matches = store.search("FELIPE", None).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].category, Category::People);

        let scoped = store
            .search("ballbox", Some(&[Category::People]))
            .unwrap();
        assert!(scoped.is_empty());
    }

    #[test]
    fn test_search_escapes_regex_metacharacters() {
        let (_dir, store) = make_test_store();
        store
            .create(Category::Admin, "meet at 9:00 (office)", 0.9, "s")
            .unwrap();

        let matches = store.search("(office)", None).unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_move_sets_corrected_from() {
        let (_dir, store) = make_test_store();
        let entry = store.create(Category::Review, "ballbox", 0.4, "s").unwrap();

        let moved = store
            .move_entry(entry.id, Category::Projects, "s")
            .unwrap();
        assert_eq!(moved.category, Category::Projects);
        assert_eq!(moved.corrected_from, Some(Category::Review));

        // Only the immediately preceding category is retained.
        let moved_again = store.move_entry(entry.id, Category::Ideas, "s").unwrap();
        assert_eq!(moved_again.corrected_from, Some(Category::Projects));

        assert!(store.list(Category::Review, None).unwrap().is_empty());
        assert_eq!(store.list(Category::Ideas, None).unwrap().len(), 1);
    }

    #[test]
    fn test_move_to_same_category_is_rejected() {
        let (_dir, store) = make_test_store();
        let entry = store.create(Category::People, "Felipe", 0.9, "s").unwrap();

        let err = store
            .move_entry(entry.id, Category::People, "s")
            .unwrap_err();
        assert!(matches!(store_err(&err), StoreError::NoOpMove { .. }));

        // The rejected no-op must not disturb the entry.
        let unchanged = store.get(entry.id).unwrap();
        assert_eq!(unchanged.corrected_from, None);
    }

    #[test]
    fn test_move_missing_is_not_found() {
        let (_dir, store) = make_test_store();
        let err = store
            .move_entry(Ulid::new(), Category::People, "s")
            .unwrap_err();
        assert!(matches!(store_err(&err), StoreError::NotFound(_)));
    }

    #[test]
    fn test_delete_requires_matching_category() {
        let (_dir, store) = make_test_store();
        let entry = store.create(Category::Ideas, "keep or toss", 0.8, "s").unwrap();

        let err = store
            .delete(entry.id, Category::People, "s")
            .unwrap_err();
        assert!(matches!(
            store_err(&err),
            StoreError::CategoryMismatch { .. }
        ));

        store.delete(entry.id, Category::Ideas, "s").unwrap();
        let err = store.get(entry.id).unwrap_err();
        assert!(matches!(store_err(&err), StoreError::NotFound(_)));
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let (_dir, store) = make_test_store();
        let err = store
            .delete(Ulid::new(), Category::Admin, "s")
            .unwrap_err();
        assert!(matches!(store_err(&err), StoreError::NotFound(_)));
    }

    #[test]
    fn test_delete_audit_preserves_category_and_text() {
        let (_dir, store) = make_test_store();
        let entry = store
            .create(Category::Admin, "cancel the gym membership", 0.85, "chat-9")
            .unwrap();
        store.delete(entry.id, Category::Admin, "chat-9").unwrap();

        let records = store.audit().recent(None).unwrap();
        let delete = records
            .iter()
            .find(|record| record.operation == AuditOp::Delete)
            .expect("delete audit record");
        assert_eq!(delete.entry_id, entry.id);
        assert_eq!(delete.category_before, Some(Category::Admin));
        assert_eq!(delete.category_after, None);
        assert_eq!(
            delete.raw_text.as_deref(),
            Some("cancel the gym membership")
        );
        assert_eq!(delete.session_key, "chat-9");
    }

    #[test]
    fn test_audit_records_create_and_move() {
        let (_dir, store) = make_test_store();
        let entry = store.create(Category::Review, "ballbox", 0.4, "s").unwrap();
        store.move_entry(entry.id, Category::Projects, "s").unwrap();

        let records = store.audit().recent(None).unwrap();
        assert_eq!(records.len(), 2);
        // Newest first.
        assert_eq!(records[0].operation, AuditOp::Move);
        assert_eq!(records[0].category_before, Some(Category::Review));
        assert_eq!(records[0].category_after, Some(Category::Projects));
        assert_eq!(records[1].operation, AuditOp::Create);
    }

    #[test]
    fn test_set_origin_ref_round_trip() {
        let (_dir, store) = make_test_store();
        let entry = store.create(Category::People, "Felipe", 0.9, "s").unwrap();

        store.set_origin_ref(entry.id, "msg-42").unwrap();
        let fetched = store.get(entry.id).unwrap();
        assert_eq!(fetched.origin_message_ref.as_deref(), Some("msg-42"));

        // Not an audited mutation kind.
        let records = store.audit().recent(None).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_created_since_filters_and_orders() {
        let (_dir, store) = make_test_store();
        let cutoff = Utc::now() - chrono::Duration::minutes(1);
        store.create(Category::Ideas, "fresh idea", 0.9, "s").unwrap();

        let recent = store.created_since(Category::Ideas, cutoff).unwrap();
        assert_eq!(recent.len(), 1);

        let none = store
            .created_since(Category::Ideas, Utc::now() + chrono::Duration::minutes(1))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("brain");

        let entry = {
            let store = EntryStore::new(base.clone());
            store.create(Category::People, "persisted", 0.9, "s").unwrap()
        };

        let reopened = EntryStore::new(base);
        let fetched = reopened.get(entry.id).unwrap();
        assert_eq!(fetched.raw_text, "persisted");
    }
}
