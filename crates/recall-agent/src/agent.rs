use anyhow::Result;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use recall_core::{Role, StoreError};
use recall_session::{ConversationLog, ReplyIndex};
use recall_store::EntryStore;

use crate::model::{ModelClient, ModelMessage, ModelTurn};
use crate::prompt::{SYSTEM_PROMPT, compose_user_content};
use crate::router::{ConfidenceRouter, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::schema::tool_schemas;
use crate::tools::{CreatedEntry, Dispatcher};

pub const DEFAULT_ROUND_CAP: usize = 6;
pub const DEFAULT_MODEL_WINDOW: usize = 10;

const APOLOGY_REPLY: &str =
    "Sorry, I could not reach the model right now. Your message was not processed; \
     please try again in a moment.";

#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    /// Maximum model invocations per inbound message.
    pub round_cap: usize,
    pub confidence_threshold: f64,
    /// How many stored messages each invocation replays to the model.
    pub model_window: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            round_cap: DEFAULT_ROUND_CAP,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            model_window: DEFAULT_MODEL_WINDOW,
        }
    }
}

/// What one inbound message produced: the reply to send back, the entries
/// created along the way (for confirmation correlation), and how many
/// model rounds it took.
#[derive(Debug)]
pub struct TurnOutcome {
    pub reply: String,
    pub created: Vec<CreatedEntry>,
    pub rounds: usize,
}

/// The round-capped tool-use loop: one inbound message in, one reply out,
/// with any number of tool dispatches in between.
pub struct AgentLoop<'a> {
    model: &'a dyn ModelClient,
    store: &'a EntryStore,
    history: &'a ConversationLog,
    replies: &'a ReplyIndex,
    config: LoopConfig,
}

/// Everything the turn accumulated, persisted to history only once the
/// turn produces a reply. An aborted turn leaves history untouched.
struct TurnLog {
    raw_text: String,
    tool_entries: Vec<Value>,
}

impl<'a> AgentLoop<'a> {
    pub fn new(
        model: &'a dyn ModelClient,
        store: &'a EntryStore,
        history: &'a ConversationLog,
        replies: &'a ReplyIndex,
        config: LoopConfig,
    ) -> Self {
        Self {
            model,
            store,
            history,
            replies,
            config,
        }
    }

    /// Run one full turn for an inbound message.
    ///
    /// `reply_to` carries the transport ref of the message the user replied
    /// to, if any; an unresolvable ref degrades to a plain message.
    pub async fn handle_message(
        &self,
        session_key: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<TurnOutcome> {
        let reply_target = match reply_to {
            Some(message_ref) => {
                let target = self.resolve_reply_target(message_ref);
                if target.is_none() {
                    debug!(message_ref, "reply ref did not resolve, treating as plain message");
                }
                target
            }
            None => None,
        };

        let user_content = compose_user_content(text, reply_target.as_ref());
        let mut messages = self.window(session_key)?;
        messages.push(ModelMessage {
            role: Role::User,
            content: user_content,
        });

        let router = ConfidenceRouter::new(self.config.confidence_threshold);
        let dispatcher = Dispatcher::new(self.store, router, session_key);
        let schemas = tool_schemas();
        let mut turn_log = TurnLog {
            raw_text: text.to_string(),
            tool_entries: Vec::new(),
        };
        let mut created = Vec::new();
        let mut last_results: Vec<Value> = Vec::new();

        for round in 1..=self.config.round_cap {
            let turn = match self.model.complete(SYSTEM_PROMPT, &messages, &schemas).await {
                Ok(turn) => turn,
                Err(error) => {
                    warn!(round, error = %format!("{error:#}"), "model invocation failed");
                    self.persist_turn(session_key, &turn_log, APOLOGY_REPLY)?;
                    return Ok(TurnOutcome {
                        reply: APOLOGY_REPLY.to_string(),
                        created,
                        rounds: round,
                    });
                }
            };

            match turn {
                ModelTurn::Final(reply) => {
                    self.persist_turn(session_key, &turn_log, &reply)?;
                    return Ok(TurnOutcome {
                        reply,
                        created,
                        rounds: round,
                    });
                }
                ModelTurn::ToolCalls(requests) => {
                    info!(round, count = requests.len(), "dispatching tool calls");
                    last_results.clear();
                    for request in requests {
                        let result = dispatcher.execute(&request.name, &request.arguments);
                        let outcome_json = serde_json::to_value(&result.outcome)?;
                        if let Some(entry) = result.created {
                            created.push(entry);
                        }
                        turn_log.tool_entries.push(json!({
                            "name": request.name,
                            "arguments": request.arguments,
                            "result": outcome_json,
                        }));
                        last_results.push(json!({
                            "tool": request.name,
                            "result": outcome_json,
                        }));
                    }
                    messages.push(ModelMessage {
                        role: Role::Tool,
                        content: serde_json::to_string(&last_results)?,
                    });
                }
            }
        }

        // Cap reached without a final answer. Synthesize a reply from the
        // last round's results rather than dropping the work on the floor.
        warn!(cap = self.config.round_cap, "round cap reached without a final reply");
        let reply = cap_reply(&created, &last_results);
        self.persist_turn(session_key, &turn_log, &reply)?;
        Ok(TurnOutcome {
            reply,
            created,
            rounds: self.config.round_cap,
        })
    }

    /// After the outbound confirmation is actually sent, tie its transport
    /// ref to the entries the turn created so later replies can target them.
    pub fn record_confirmation(&self, message_ref: &str, created: &[CreatedEntry]) -> Result<()> {
        if created.is_empty() {
            return Ok(());
        }
        let ids: Vec<_> = created.iter().map(|entry| entry.id).collect();
        self.replies.record(message_ref, &ids)?;
        for entry in created {
            // The entry may have been deleted between creation and send.
            if let Err(error) = self.store.set_origin_ref(entry.id, message_ref) {
                match error.downcast_ref::<StoreError>() {
                    Some(StoreError::NotFound(_)) => {
                        debug!(id = %entry.id, "entry gone before confirmation ref was stamped");
                    }
                    _ => return Err(error),
                }
            }
        }
        Ok(())
    }

    fn resolve_reply_target(&self, message_ref: &str) -> Option<recall_core::Entry> {
        let ids = match self.replies.resolve(message_ref) {
            Ok(ids) => ids,
            Err(error) => {
                warn!(message_ref, error = %format!("{error:#}"), "reply index lookup failed");
                return None;
            }
        };
        // First entry of the confirmation that still exists wins.
        ids.into_iter()
            .find_map(|id| self.store.get(id).ok())
    }

    fn window(&self, session_key: &str) -> Result<Vec<ModelMessage>> {
        let stored = self.history.recent(session_key, self.config.model_window)?;
        Ok(stored
            .into_iter()
            .map(|message| ModelMessage {
                role: message.role,
                content: message.content,
            })
            .collect())
    }

    /// History records whole turns: the user's raw text, one entry per tool
    /// dispatch, then the assistant reply. Nothing lands until all three
    /// parts are known.
    fn persist_turn(&self, session_key: &str, turn_log: &TurnLog, reply: &str) -> Result<()> {
        self.history
            .append(session_key, Role::User, &turn_log.raw_text)?;
        for entry in &turn_log.tool_entries {
            self.history
                .append(session_key, Role::Tool, &serde_json::to_string(entry)?)?;
        }
        self.history.append(session_key, Role::Assistant, reply)
    }
}

fn cap_reply(created: &[CreatedEntry], last_results: &[Value]) -> String {
    let mut reply = String::from(
        "I ran out of working rounds before finishing this one, so here is where things stand. ",
    );
    if created.is_empty() {
        if last_results.is_empty() {
            reply.push_str("No changes were made. Could you rephrase or split the request?");
        } else {
            reply.push_str(&format!(
                "The last lookups returned: {}. Could you tell me how to proceed?",
                serde_json::to_string(last_results).unwrap_or_default()
            ));
        }
    } else {
        let summary: Vec<String> = created
            .iter()
            .map(|entry| format!("{} (stored in {})", entry.id, entry.stored))
            .collect();
        reply.push_str(&format!(
            "I did save {} new item(s): {}. Anything beyond that did not complete.",
            created.len(),
            summary.join(", ")
        ));
    }
    reply
}
