mod config;
mod event_loop;
mod gemini_adapter;
mod prompt;
mod runtime;
mod sink;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::fmt::time::ChronoLocal;

use crate::config::Config;
use crate::prompt::Assignment;
use crate::runtime::SessionRuntime;

/// Voice reflection session: talk through a reading assignment with a
/// streaming AI companion.
#[derive(Parser)]
struct Cli {
    /// Title of the book under discussion
    book_title: String,

    /// Chapter range for this reflection, e.g. "6-10"
    #[arg(long, default_value = "1-5")]
    chapters: String,

    /// Exact question the companion should open with
    #[arg(long)]
    opening_question: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load application configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let args = Cli::parse();
    let assignment = Assignment {
        book_title: args.book_title,
        chapters: args.chapters,
        opening_question: args.opening_question,
    };
    tracing::info!(
        "Starting reflection session for \"{}\" chapters {}",
        assignment.book_title,
        assignment.chapters
    );

    let mut runtime = SessionRuntime::new(config, assignment);
    runtime
        .start()
        .await
        .context("Failed to start reflection session")?;

    tokio::select! {
        _ = runtime.wait() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, shutting down...");
        }
    }
    runtime.stop().await;
    Ok(())
}
