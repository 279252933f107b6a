use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use verda_application::ChatEngine;
use verda_client::HttpSessionApi;
use verda_infrastructure::{FileCacheStore, load_engine_config};

#[derive(Parser)]
#[command(name = "verda")]
#[command(about = "Verda - session engine debug client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the sessions known to the backend
    Sessions,
    /// Send a message and print the assistant's reply
    Send {
        message: String,
        /// Target session id; defaults to the restored current session
        #[arg(long)]
        session: Option<String>,
        /// Ask for a full answer instead of a progressive summary
        #[arg(long)]
        detailed: bool,
    },
    /// Probe backend health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_engine_config().await?;

    let api = Arc::new(HttpSessionApi::from_config(&config));
    if let Ok(token) = std::env::var("VERDA_API_TOKEN") {
        api.set_token(token).await;
    }
    let cache = Arc::new(FileCacheStore::default_location().await?);
    let engine = ChatEngine::new(api.clone(), cache, &config);

    match cli.command {
        Commands::Sessions => {
            engine.set_authenticated(true).await;
            for session in engine.store().sessions().await {
                println!(
                    "{}  {:<50}  {} messages, last active {}",
                    session.id,
                    session.title,
                    session.display_message_count(),
                    session.last_activity
                );
            }
        }
        Commands::Send {
            message,
            session,
            detailed,
        } => {
            engine.set_authenticated(true).await;
            if let Some(id) = session {
                engine.select_session(&id).await?;
            } else if engine.store().current().await.is_none() {
                engine.new_session().await;
            }
            engine.send_message(&message, detailed).await?;
            if let Some(reply) = engine
                .store()
                .current()
                .await
                .and_then(|s| s.messages.last().cloned())
            {
                println!("{}", reply.content);
            }
        }
        Commands::Health => {
            use verda_core::api::SessionApi;
            let status = api.health().await?;
            println!("status: {}", status.status);
        }
    }
    Ok(())
}
