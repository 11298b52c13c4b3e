use serde::Serialize;
use serde_json::{Value, json};
use ulid::Ulid;

use recall_core::{Category, StoreError};
use recall_store::EntryStore;

use crate::router::ConfidenceRouter;

/// The fixed tool set as a tagged union: one constructor per operation the
/// model may invoke, so dispatch is an exhaustive match and no operation
/// can go silently unhandled.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    ListEntries {
        category: Category,
        limit: Option<usize>,
    },
    SearchEntries {
        query: String,
        categories: Option<Vec<Category>>,
    },
    GetEntry {
        entry_id: Ulid,
    },
    CreateEntry {
        category: Category,
        raw_text: String,
        confidence: f64,
    },
    MoveEntry {
        entry_id: Ulid,
        to_category: Category,
    },
    DeleteEntry {
        entry_id: Ulid,
        category: Category,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool '{0}'")]
    UnknownTool(String),

    #[error("Bad arguments for '{tool}': {detail}")]
    Argument { tool: String, detail: String },
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::Argument { .. } => "tool_argument_error",
        }
    }
}

impl ToolCall {
    /// Validate a named invocation against its declared argument schema.
    pub fn parse(name: &str, arguments: &Value) -> Result<Self, ToolError> {
        let args = Args {
            tool: name,
            value: arguments,
        };
        match name {
            "list_entries" => Ok(ToolCall::ListEntries {
                category: args.category("category")?,
                limit: args.optional_usize("limit")?,
            }),
            "search_entries" => Ok(ToolCall::SearchEntries {
                query: args.string("query")?,
                categories: args.optional_categories("categories")?,
            }),
            "get_entry" => Ok(ToolCall::GetEntry {
                entry_id: args.entry_id("entry_id")?,
            }),
            "create_entry" => Ok(ToolCall::CreateEntry {
                category: args.category("category")?,
                raw_text: args.string("raw_text")?,
                confidence: args.confidence("confidence")?,
            }),
            "move_entry" => Ok(ToolCall::MoveEntry {
                entry_id: args.entry_id("entry_id")?,
                to_category: args.category("to_category")?,
            }),
            "delete_entry" => Ok(ToolCall::DeleteEntry {
                entry_id: args.entry_id("entry_id")?,
                category: args.category("category")?,
            }),
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

/// Argument extraction helpers sharing the error shape.
struct Args<'a> {
    tool: &'a str,
    value: &'a Value,
}

impl Args<'_> {
    fn err(&self, detail: impl Into<String>) -> ToolError {
        ToolError::Argument {
            tool: self.tool.to_string(),
            detail: detail.into(),
        }
    }

    fn string(&self, key: &str) -> Result<String, ToolError> {
        self.value
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| self.err(format!("missing or non-string '{key}'")))
    }

    fn category(&self, key: &str) -> Result<Category, ToolError> {
        self.string(key)?
            .parse::<Category>()
            .map_err(|error| self.err(error.to_string()))
    }

    fn entry_id(&self, key: &str) -> Result<Ulid, ToolError> {
        let raw = self.string(key)?;
        raw.parse::<Ulid>()
            .map_err(|_| self.err(format!("'{key}' is not a valid entry id: {raw}")))
    }

    fn confidence(&self, key: &str) -> Result<f64, ToolError> {
        let confidence = self
            .value
            .get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| self.err(format!("missing or non-numeric '{key}'")))?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(self.err(format!("'{key}' must be within [0, 1], got {confidence}")));
        }
        Ok(confidence)
    }

    fn optional_usize(&self, key: &str) -> Result<Option<usize>, ToolError> {
        match self.value.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .map(|n| Some(n as usize))
                .ok_or_else(|| self.err(format!("'{key}' must be a non-negative integer"))),
        }
    }

    fn optional_categories(&self, key: &str) -> Result<Option<Vec<Category>>, ToolError> {
        let raw = match self.value.get(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(value) => value
                .as_array()
                .ok_or_else(|| self.err(format!("'{key}' must be an array of categories")))?,
        };

        let mut categories = Vec::with_capacity(raw.len());
        for item in raw {
            let name = item
                .as_str()
                .ok_or_else(|| self.err(format!("'{key}' must contain strings")))?;
            categories.push(
                name.parse::<Category>()
                    .map_err(|error| self.err(error.to_string()))?,
            );
        }
        Ok(Some(categories))
    }
}

/// Structured tool result handed back to the model. Never raises past the
/// dispatcher boundary; the model recovers conversationally from `error`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ToolOutcome {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn err(kind: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(kind.to_string()),
            message: Some(message.into()),
        }
    }
}

/// A creation performed during a turn, carrying both the classified label
/// (for confirmation text) and where the entry actually landed.
#[derive(Debug, Clone)]
pub struct CreatedEntry {
    pub id: Ulid,
    pub classified: Category,
    pub stored: Category,
    pub confidence: f64,
}

#[derive(Debug)]
pub struct DispatchResult {
    pub outcome: ToolOutcome,
    pub created: Option<CreatedEntry>,
}

impl DispatchResult {
    fn plain(outcome: ToolOutcome) -> Self {
        Self {
            outcome,
            created: None,
        }
    }
}

/// Stateless mapping from validated tool calls to store operations.
///
/// Only the `create` path consults the confidence router; moves and
/// deletes are explicit user-directed corrections.
#[derive(Debug)]
pub struct Dispatcher<'a> {
    store: &'a EntryStore,
    router: ConfidenceRouter,
    session_key: &'a str,
}

impl<'a> Dispatcher<'a> {
    pub fn new(store: &'a EntryStore, router: ConfidenceRouter, session_key: &'a str) -> Self {
        Self {
            store,
            router,
            session_key,
        }
    }

    /// Parse and run one named invocation. All failures come back as
    /// structured outcomes.
    pub fn execute(&self, name: &str, arguments: &Value) -> DispatchResult {
        match ToolCall::parse(name, arguments) {
            Ok(call) => self.dispatch(call),
            Err(error) => DispatchResult::plain(ToolOutcome::err(error.kind(), error.to_string())),
        }
    }

    pub fn dispatch(&self, call: ToolCall) -> DispatchResult {
        match call {
            ToolCall::ListEntries { category, limit } => {
                self.store_result(self.store.list(category, limit).map(|entries| {
                    json!({
                        "category": category,
                        "count": entries.len(),
                        "entries": entries,
                    })
                }))
            }
            ToolCall::SearchEntries { query, categories } => self.store_result(
                self.store
                    .search(&query, categories.as_deref())
                    .map(|entries| {
                        json!({
                            "query": query,
                            "count": entries.len(),
                            "entries": entries,
                        })
                    }),
            ),
            ToolCall::GetEntry { entry_id } => self.store_result(
                self.store
                    .get(entry_id)
                    .map(|entry| json!({"entry": entry})),
            ),
            ToolCall::CreateEntry {
                category,
                raw_text,
                confidence,
            } => {
                let stored = self.router.route(category, confidence);
                match self
                    .store
                    .create(stored, &raw_text, confidence, self.session_key)
                {
                    Ok(entry) => {
                        let created = CreatedEntry {
                            id: entry.id,
                            classified: category,
                            stored,
                            confidence,
                        };
                        let outcome = ToolOutcome::ok(json!({
                            "entry": entry,
                            "classified_category": category,
                            "stored_category": stored,
                            "needs_review": stored == Category::Review && category != Category::Review,
                        }));
                        DispatchResult {
                            outcome,
                            created: Some(created),
                        }
                    }
                    Err(error) => DispatchResult::plain(store_error_outcome(&error)),
                }
            }
            ToolCall::MoveEntry {
                entry_id,
                to_category,
            } => self.store_result(
                self.store
                    .move_entry(entry_id, to_category, self.session_key)
                    .map(|entry| {
                        json!({
                            "entry": entry,
                            "from_category": entry.corrected_from,
                            "to_category": to_category,
                        })
                    }),
            ),
            ToolCall::DeleteEntry { entry_id, category } => self.store_result(
                self.store
                    .delete(entry_id, category, self.session_key)
                    .map(|()| json!({"entry_id": entry_id.to_string(), "category": category})),
            ),
        }
    }

    fn store_result(&self, result: anyhow::Result<Value>) -> DispatchResult {
        DispatchResult::plain(match result {
            Ok(data) => ToolOutcome::ok(data),
            Err(error) => store_error_outcome(&error),
        })
    }
}

fn store_error_outcome(error: &anyhow::Error) -> ToolOutcome {
    match error.downcast_ref::<StoreError>() {
        Some(store_error) => ToolOutcome::err(store_error.kind(), store_error.to_string()),
        None => ToolOutcome::err("storage_error", format!("{error:#}")),
    }
}
