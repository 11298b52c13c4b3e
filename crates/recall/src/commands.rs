use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::info;
use ulid::Ulid;

use recall_agent::{AgentLoop, ApiClient, CreatedEntry, LoopConfig, TurnOutcome};
use recall_config::Config;
use recall_core::Category;
use recall_session::{ConversationLog, ReplyIndex};
use recall_store::{EntryStore, StateFile};

/// Shared handles for every subcommand: config plus the stores rooted at
/// the data directory.
pub struct AppContext {
    pub config: Config,
    pub store: EntryStore,
    pub history: ConversationLog,
    pub replies: ReplyIndex,
    pub state: StateFile,
}

impl AppContext {
    pub fn init(data_dir_override: Option<&str>) -> Result<Self> {
        let config = Config::load()?;
        let data_dir = match data_dir_override {
            Some(dir) => PathBuf::from(dir),
            None => recall_config::data_dir(),
        };
        info!(data_dir = %data_dir.display(), "opening data directory");

        Ok(Self {
            store: EntryStore::new(data_dir.join("brain")),
            history: ConversationLog::new(
                data_dir.join("sessions"),
                config.history.persist_limit,
            ),
            replies: ReplyIndex::new(data_dir.join("replies.json")),
            state: StateFile::new(data_dir.join("state.json")),
            config,
        })
    }

    fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            round_cap: self.config.agent.round_cap,
            confidence_threshold: self.config.agent.confidence_threshold,
            model_window: self.config.history.model_window,
        }
    }

    fn model_client(&self) -> Result<ApiClient> {
        if self.config.model.api_key.is_empty() {
            bail!(
                "No API key configured. Set RECALL_API_KEY or model.api_key in the config file."
            );
        }
        ApiClient::new(
            self.config.model.base_url.clone(),
            self.config.model.api_key.clone(),
            &self.config.model.models,
        )
    }
}

/// One message in, one reply out.
pub async fn send(
    ctx: &AppContext,
    session: &str,
    message: &str,
    reply_to: Option<&str>,
) -> Result<()> {
    let model = ctx.model_client()?;
    let agent = AgentLoop::new(&model, &ctx.store, &ctx.history, &ctx.replies, ctx.loop_config());
    let outcome = agent.handle_message(session, message, reply_to).await?;
    deliver(&agent, &outcome)?;
    Ok(())
}

/// Line-oriented conversation loop. `/reply <ref> <text>` targets an
/// earlier confirmation; `/quit` exits.
pub async fn chat(ctx: &AppContext, session: &str) -> Result<()> {
    let model = ctx.model_client()?;
    let agent = AgentLoop::new(&model, &ctx.store, &ctx.history, &ctx.replies, ctx.loop_config());

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    println!("recall chat (session: {session}). /reply <ref> <text> to reply, /quit to exit.");

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }

        let (text, reply_to) = match line.strip_prefix("/reply ") {
            Some(rest) => match rest.split_once(' ') {
                Some((message_ref, text)) => (text, Some(message_ref)),
                None => {
                    println!("usage: /reply <ref> <text>");
                    continue;
                }
            },
            None => (line, None),
        };

        run_turn(&agent, session, text, reply_to).await;
    }
    Ok(())
}

/// One REPL turn. A failed turn is reported and dropped so the loop keeps
/// serving later prompts; only that turn's reply is lost.
async fn run_turn(agent: &AgentLoop<'_>, session: &str, text: &str, reply_to: Option<&str>) {
    let result = match agent.handle_message(session, text, reply_to).await {
        Ok(outcome) => deliver(agent, &outcome),
        Err(error) => Err(error),
    };
    if let Err(error) = result {
        eprintln!("turn failed: {error:#}");
    }
}

/// Print the reply, then tie the printed message ref back to any entries
/// the turn created so the user can reply to the confirmation later.
fn deliver(agent: &AgentLoop<'_>, outcome: &TurnOutcome) -> Result<()> {
    let message_ref = Ulid::new().to_string();
    println!("{}", outcome.reply);
    println!("[ref: {message_ref}]");
    for created in &outcome.created {
        println!("  {}", confirmation_line(created));
    }
    agent.record_confirmation(&message_ref, &outcome.created)
}

fn confirmation_line(created: &CreatedEntry) -> String {
    if created.stored == created.classified {
        format!(
            "saved {} to {} ({:.0}%)",
            created.id,
            created.stored,
            created.confidence * 100.0
        )
    } else {
        format!(
            "saved {} to {} for review (looked like {}, {:.0}%)",
            created.id,
            created.stored,
            created.classified,
            created.confidence * 100.0
        )
    }
}

pub fn reset(ctx: &AppContext, session: &str) -> Result<()> {
    ctx.history.reset(session)?;
    println!("Session '{session}' cleared.");
    Ok(())
}

pub fn list(ctx: &AppContext, category: &str, limit: Option<usize>) -> Result<()> {
    let category: Category = category.parse()?;
    let entries = ctx.store.list(category, limit)?;
    if entries.is_empty() {
        println!("No entries in {category}.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{}  {}  {}",
            entry.id,
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.raw_text
        );
    }
    Ok(())
}

pub fn search(ctx: &AppContext, query: &str, categories: Option<&str>) -> Result<()> {
    let categories = categories
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::parse::<Category>)
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    let entries = ctx.store.search(query, categories.as_deref())?;
    if entries.is_empty() {
        println!("No matches for '{query}'.");
        return Ok(());
    }
    for entry in entries {
        println!("{}  [{}]  {}", entry.id, entry.category, entry.raw_text);
    }
    Ok(())
}

pub fn audit(ctx: &AppContext, limit: usize) -> Result<()> {
    let records = ctx.store.audit().recent(Some(limit))?;
    if records.is_empty() {
        println!("Audit log is empty.");
        return Ok(());
    }
    for record in records {
        let line = serde_json::to_string(&record).context("serializing audit record")?;
        println!("{line}");
    }
    Ok(())
}
