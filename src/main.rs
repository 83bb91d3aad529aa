//! Receptionist terminal session
//!
//! Reads caller utterances from stdin and prints the receptionist's replies.
//! Logs go to stderr as JSON so they don't interleave with the conversation.

use receptionist::config::ReceptionistConfig;
use receptionist::knowledge::IntentsKnowledgeBase;
use receptionist::llm::ChatCompletionsService;
use receptionist::runtime::ProductionReceptionist;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "receptionist=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(false),
        )
        .init();

    let config = ReceptionistConfig::from_env()?;
    let Some(api_key) = config.api_key.clone() else {
        return Err("GROQ_API_KEY is not set".into());
    };

    let knowledge = match IntentsKnowledgeBase::load(&config.knowledge_path) {
        Ok(kb) => kb,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "No emergency instructions loaded, lookups will use the fallback reply"
            );
            IntentsKnowledgeBase::new(Vec::new())
        }
    };

    let llm = ChatCompletionsService::new(api_key, config.model.clone(), config.base_url.clone())?;
    tracing::info!(
        model = %config.model,
        enrichment = %config.enrichment,
        tokens_per_minute = config.rate_limits.tokens_per_minute,
        tokens_per_day = config.rate_limits.tokens_per_day,
        "Receptionist ready"
    );

    let mut receptionist = ProductionReceptionist::from_config(&config, llm, Arc::new(knowledge));

    println!(
        "Dr. Adrin's receptionist. Type 'exit' to quit, 'reset' to start over, 'state' to inspect."
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "exit" | "quit" => break,
            "reset" => {
                receptionist.reset_session();
                println!("Session reset.");
            }
            "state" => {
                let snapshot = receptionist.context_snapshot();
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            }
            _ => {
                let reply = receptionist.submit_user_turn(input).await;
                println!("Receptionist: {reply}");
            }
        }
    }

    Ok(())
}
