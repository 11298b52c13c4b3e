use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "recall")]
#[command(about = "Second brain: conversational capture, triage and recall")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the data directory (defaults to the XDG data dir)
    #[arg(long, global = true)]
    pub data_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive conversation with the agent
    Chat {
        /// Session key; history is isolated per key
        #[arg(short, long, default_value = "default")]
        session: String,
    },

    /// Send a single message and print the reply
    Send {
        /// Message text
        message: String,

        /// Session key; history is isolated per key
        #[arg(short, long, default_value = "default")]
        session: String,

        /// Ref of an earlier confirmation this message replies to
        #[arg(long)]
        reply_to: Option<String>,
    },

    /// Clear a session's conversation history
    Reset {
        #[arg(short, long, default_value = "default")]
        session: String,
    },

    /// List stored entries in a category, newest first
    List {
        /// people, projects, ideas, admin or review
        category: String,

        /// Maximum entries to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Case-insensitive substring search across categories
    Search {
        query: String,

        /// Restrict to these categories (comma-separated); default all
        #[arg(short, long)]
        categories: Option<String>,
    },

    /// Show recent audit records, newest first
    Audit {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Summarize entries captured since the last digest
    Digest,
}
