use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod digest;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (output to stderr, initialize only once)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let ctx = commands::AppContext::init(cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Chat { session } => commands::chat(&ctx, &session).await,
        Commands::Send {
            message,
            session,
            reply_to,
        } => commands::send(&ctx, &session, &message, reply_to.as_deref()).await,
        Commands::Reset { session } => commands::reset(&ctx, &session),
        Commands::List { category, limit } => commands::list(&ctx, &category, limit),
        Commands::Search { query, categories } => {
            commands::search(&ctx, &query, categories.as_deref())
        }
        Commands::Audit { limit } => commands::audit(&ctx, limit),
        Commands::Digest => digest::run(&ctx),
    }
}
