//! query-worker — answers a single chat turn against the Query Orchestrator and prints
//! the resulting `QueryResponse` as JSON. Unlike `ingest-worker`, there is no broker
//! worker pool here: a chat turn needs a synchronous answer, not a queued background job.

use clap::Parser;
use pdfchat_core::{Config, SessionId};
use pdfchat_query::QueryOrchestrator;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "query-worker", version, about)]
struct Cli {
    /// The user's question.
    query: String,

    /// Reuse an existing session id instead of starting a new one.
    #[arg(long)]
    session_id: Option<SessionId>,

    /// Attribute the session to a user id.
    #[arg(long)]
    user_id: Option<String>,

    /// Override the LLM model used to answer.
    #[arg(long)]
    model: Option<String>,

    /// Override max response tokens; defaults to the query service's max_context_length.
    #[arg(long)]
    max_tokens: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    pdfchat_core::config::load_dotenv();
    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_summary();

    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let conn = redis_client.get_connection_manager().await?;
    let sessions = pdfchat_session::SessionStore::new(
        conn,
        config.session.session_timeout_secs,
        config.session.conversation_cap,
    );

    let orchestrator = QueryOrchestrator::new(
        &config.clients,
        &config.embedding,
        sessions,
        config.query.clone(),
    );

    match orchestrator
        .ask(cli.session_id, cli.user_id, &cli.query, cli.model.as_deref(), cli.max_tokens)
        // max_tokens defaults to the query service's max_context_length inside ask()
        .await
    {
        Ok((session_id, response)) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "session_id": session_id,
                    "response": response,
                }))?
            );
        }
        Err(e) => {
            error!(error = %e, "query failed");
            std::process::exit(1);
        }
    }

    Ok(())
}
