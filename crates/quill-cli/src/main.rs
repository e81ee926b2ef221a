//! quill - streaming chat client

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use quill_sse::ChatClient;
use quill_stream::{HttpTransport, StreamConfig, StreamManager, StreamRequest, StreamState};

/// quill - ask the chat backend a question and stream the answer
#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Question to send
    question: String,

    /// Backend base URL
    #[arg(long, default_value = "http://localhost:8000")]
    url: String,

    /// Continue an existing backend session
    #[arg(long)]
    session: Option<String>,

    /// Bearer token (defaults to QUILL_AUTH_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Maximum stream duration in seconds
    #[arg(long, default_value_t = 120)]
    ceiling_secs: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if args.verbose { "debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let token = args
        .token
        .or_else(|| std::env::var("QUILL_AUTH_TOKEN").ok());
    let mut client = ChatClient::new(&args.url);
    if let Some(token) = token {
        client = client.with_auth_token(token);
    }

    let manager = StreamManager::with_config(
        Arc::new(HttpTransport::new(client)),
        StreamConfig::default().with_ceiling(Duration::from_secs(args.ceiling_secs)),
    );

    let conversation_id = uuid::Uuid::new_v4().to_string();
    let mut updates = manager.subscribe();

    let handle = manager.start_stream(StreamRequest {
        question: args.question,
        conversation_id: conversation_id.clone(),
        session_id: args.session,
        message_id: uuid::Uuid::new_v4().to_string(),
    });

    // Ctrl-C stops generation; the stream finalizes as stopped-by-user
    {
        let manager = manager.clone();
        let conversation_id = conversation_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                manager.cancel(&conversation_id);
            }
        });
    }

    // Print content as it grows; every update carries the full state
    let mut printed = 0usize;
    let mut final_state: Option<StreamState> = None;
    while let Some(update) = updates.next().await {
        if update.conversation_id != conversation_id {
            continue;
        }
        let Some(state) = update.state else { break };
        if state.content.len() > printed {
            print!("{}", &state.content[printed..]);
            std::io::stdout().flush()?;
            printed = state.content.len();
        }
        if !state.is_active() {
            final_state = Some(state);
            break;
        }
    }
    if printed > 0 {
        println!();
    }

    let outcome = handle.finished().await?;

    if let Some(state) = &final_state {
        if !state.sources.is_empty() {
            println!();
            println!("Sources:");
            for source in &state.sources {
                println!(
                    "  - {} ({}, score {:.2})",
                    source.title, source.category, source.score
                );
            }
        }
        if args.verbose {
            if let Some(model) = &state.model_used {
                eprintln!("model: {model}");
            }
            if let Some(confidence) = state.confidence {
                eprintln!("confidence: {confidence:.2}");
            }
            if let Some(session) = &outcome.backend_session_id {
                eprintln!("session: {session}");
            }
        }
    }

    manager.clear_all();

    if let Some(error) = outcome.error {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
    if outcome.stopped_by_user {
        tracing::debug!("generation stopped by user");
    }

    Ok(())
}
