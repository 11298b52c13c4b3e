use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use recall_core::Category;
use recall_store::{EntryStore, StateFile};

use crate::commands::AppContext;

const LAST_DIGEST_KEY: &str = "last_digest_time";
const PREVIEW_PER_CATEGORY: usize = 3;

/// Print a summary of entries captured since the last digest, plus a
/// reminder about anything still waiting for review, then advance the
/// digest watermark.
pub fn run(ctx: &AppContext) -> Result<()> {
    let since = last_digest_time(&ctx.state)?;
    let report = render(&ctx.store, since)?;
    println!("{report}");
    ctx.state
        .set(LAST_DIGEST_KEY, json!(Utc::now().to_rfc3339()))?;
    Ok(())
}

/// Defaults to the past day when no digest has ever run.
fn last_digest_time(state: &StateFile) -> Result<DateTime<Utc>> {
    let stored = state
        .get(LAST_DIGEST_KEY)?
        .and_then(|value| value.as_str().map(str::to_string))
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc));
    Ok(stored.unwrap_or_else(|| Utc::now() - Duration::days(1)))
}

fn render(store: &EntryStore, since: DateTime<Utc>) -> Result<String> {
    let mut lines = vec!["Digest".to_string(), "=".repeat(20), String::new()];

    let mut total_new = 0;
    for category in Category::ALL {
        let new_entries = store.created_since(category, since)?;
        if new_entries.is_empty() {
            continue;
        }
        total_new += new_entries.len();
        lines.push(format!("{category}: {} new", new_entries.len()));
        for entry in new_entries.iter().take(PREVIEW_PER_CATEGORY) {
            lines.push(format!("  - {}", entry.raw_text));
        }
        lines.push(String::new());
    }

    if total_new == 0 {
        lines.push("No new entries since last digest.".to_string());
    }

    let review = store.list(Category::Review, None)?;
    if !review.is_empty() {
        lines.push(String::new());
        lines.push(format!("Review: {} item(s) waiting for triage", review.len()));
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_counts_new_entries_per_category() {
        let dir = TempDir::new().unwrap();
        let store = EntryStore::new(dir.path().join("brain"));
        let since = Utc::now() - Duration::hours(1);

        store.create(Category::People, "Felipe", 0.9, "chat").unwrap();
        store.create(Category::People, "Maria", 0.9, "chat").unwrap();
        store.create(Category::Review, "ballbox", 0.4, "chat").unwrap();

        let report = render(&store, since).unwrap();
        assert!(report.contains("people: 2 new"));
        assert!(report.contains("review: 1 new"));
        assert!(report.contains("Review: 1 item(s) waiting for triage"));
    }

    #[test]
    fn test_render_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = EntryStore::new(dir.path().join("brain"));
        let report = render(&store, Utc::now()).unwrap();
        assert!(report.contains("No new entries since last digest."));
        assert!(!report.contains("waiting for triage"));
    }

    #[test]
    fn test_old_entries_are_not_counted_as_new() {
        let dir = TempDir::new().unwrap();
        let store = EntryStore::new(dir.path().join("brain"));
        store.create(Category::Ideas, "old idea", 0.9, "chat").unwrap();

        let report = render(&store, Utc::now() + Duration::seconds(1)).unwrap();
        assert!(report.contains("No new entries"));
    }

    #[test]
    fn test_last_digest_time_defaults_to_a_day_ago() {
        let dir = TempDir::new().unwrap();
        let state = StateFile::new(dir.path().join("state.json"));
        let since = last_digest_time(&state).unwrap();
        let age = Utc::now() - since;
        assert!(age >= Duration::hours(23));
        assert!(age <= Duration::hours(25));
    }

    #[test]
    fn test_last_digest_time_round_trips_through_state() {
        let dir = TempDir::new().unwrap();
        let state = StateFile::new(dir.path().join("state.json"));
        let stamp = Utc::now() - Duration::hours(2);
        state
            .set(LAST_DIGEST_KEY, json!(stamp.to_rfc3339()))
            .unwrap();

        let since = last_digest_time(&state).unwrap();
        assert!((since - stamp).num_seconds().abs() <= 1);
    }
}
