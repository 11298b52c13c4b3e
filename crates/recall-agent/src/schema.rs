use serde_json::{Value, json};

/// One tool declaration shown to the model: name, parameter schema, and a
/// natural-language description biasing the model's choice.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

impl ToolSchema {
    /// OpenAI-compatible `tools` array element.
    pub fn to_wire(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

const CATEGORY_VALUES: [&str; 5] = ["people", "projects", "ideas", "admin", "review"];

/// The fixed tool set exposed to the model.
pub fn tool_schemas() -> Vec<ToolSchema> {
    vec![
        ToolSchema {
            name: "list_entries",
            description: "List entries in a specific category (people, projects, ideas, admin, review), most recent first. Returns the actual stored data.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "category": {
                        "type": "string",
                        "enum": CATEGORY_VALUES,
                        "description": "Category to list entries from"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of entries to return (default: all)"
                    }
                },
                "required": ["category"]
            }),
        },
        ToolSchema {
            name: "search_entries",
            description: "Search for entries across one or more categories by keyword. Returns matching entries, most recent first.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Keywords to find in stored entry text"
                    },
                    "categories": {
                        "type": "array",
                        "items": { "type": "string", "enum": CATEGORY_VALUES },
                        "description": "Categories to search in (default: all)"
                    }
                },
                "required": ["query"]
            }),
        },
        ToolSchema {
            name: "get_entry",
            description: "Get details of a specific entry by its id.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "entry_id": {
                        "type": "string",
                        "description": "Id of the entry to retrieve"
                    }
                },
                "required": ["entry_id"]
            }),
        },
        ToolSchema {
            name: "create_entry",
            description: "Store a new entry in the knowledge base. Use this when the user provides new information to save. Low-confidence classifications are routed to review automatically.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "category": {
                        "type": "string",
                        "enum": ["people", "projects", "ideas", "admin"],
                        "description": "Classified category for the entry"
                    },
                    "raw_text": {
                        "type": "string",
                        "description": "The information to store, verbatim"
                    },
                    "confidence": {
                        "type": "number",
                        "minimum": 0.0,
                        "maximum": 1.0,
                        "description": "Confidence in the classification (0.0-1.0)"
                    }
                },
                "required": ["category", "raw_text", "confidence"]
            }),
        },
        ToolSchema {
            name: "move_entry",
            description: "Move an entry to another category (a correction). Fails if the entry is already there.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "entry_id": {
                        "type": "string",
                        "description": "Id of the entry to move"
                    },
                    "to_category": {
                        "type": "string",
                        "enum": CATEGORY_VALUES,
                        "description": "Target category"
                    }
                },
                "required": ["entry_id", "to_category"]
            }),
        },
        ToolSchema {
            name: "delete_entry",
            description: "Delete an entry from the knowledge base. The category must match where the entry currently lives.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "entry_id": {
                        "type": "string",
                        "description": "Id of the entry to delete"
                    },
                    "category": {
                        "type": "string",
                        "enum": CATEGORY_VALUES,
                        "description": "Category containing the entry"
                    }
                },
                "required": ["entry_id", "category"]
            }),
        },
    ]
}
