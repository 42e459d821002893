//! Two cross-wired agents emitting random two-word messages at each other.
//!
//! ```text
//! cargo run --example ping_pong -- --runtime-ms 10000 --interval-ms 1000
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use autogents::utils::LoggingConfig;
use autogents::{behaviour_fn, handler_fn, mailbox, Agent, Message, RuntimeSettings, TextMessage};

const ALPHABET: [&str; 10] = [
    "hello", "sun", "world", "space", "moon", "crypto", "sky", "ocean", "universe", "human",
];

#[derive(Parser, Debug)]
#[command(name = "ping_pong", about = "Run two agents that message each other")]
struct Args {
    /// How long to let the agents run, in milliseconds.
    #[arg(long)]
    runtime_ms: Option<u64>,
    /// Pause between emissions of each agent, in milliseconds.
    #[arg(long)]
    interval_ms: Option<u64>,
}

/// Picks a word from `ALPHABET`, using a v4 uuid as the entropy source.
fn choose_word() -> &'static str {
    let roll = uuid::Uuid::new_v4().as_u128();
    ALPHABET[(roll % ALPHABET.len() as u128) as usize]
}

fn random_words() -> String {
    format!("{} {}", choose_word(), choose_word())
}

fn wire(agent: &Agent, interval: Duration) -> Result<()> {
    agent.register_handler(Arc::new(handler_fn(|message: Arc<dyn Message>| async move {
        if message.content().contains("hello") {
            println!("{message}");
        }
        Ok(())
    })));
    agent.register_behaviour(Arc::new(behaviour_fn(move |agent: Agent| async move {
        tokio::time::sleep(interval).await;
        agent.emit_message(TextMessage::new(random_words()))?;
        Ok(())
    })))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    LoggingConfig::init();

    let args = Args::parse();
    let mut settings = RuntimeSettings::from_env()?;
    if let Some(ms) = args.runtime_ms {
        settings = settings.with_runtime(Duration::from_millis(ms));
    }
    if let Some(ms) = args.interval_ms {
        settings = settings.with_behaviour_interval(Duration::from_millis(ms));
    }

    let (to_agent1, inbox1) = mailbox();
    let (to_agent2, inbox2) = mailbox();
    let agent1 = Agent::new("Agent1", inbox1, to_agent2);
    let agent2 = Agent::new("Agent2", inbox2, to_agent1);
    wire(&agent1, settings.behaviour_interval)?;
    wire(&agent2, settings.behaviour_interval)?;

    info!(runtime = ?settings.runtime, interval = ?settings.behaviour_interval, "starting agents");
    let tasks: Vec<_> = [&agent1, &agent2]
        .into_iter()
        .map(|agent| {
            let agent = agent.clone();
            tokio::spawn(async move { agent.run().await })
        })
        .collect();

    tokio::time::sleep(settings.runtime).await;

    for task in &tasks {
        task.abort();
    }
    for task in tasks {
        match task.await {
            Ok(Err(err)) => tracing::error!(error = %err, "agent failed"),
            Ok(Ok(())) => {}
            Err(err) if err.is_cancelled() => {}
            Err(err) => return Err(err.into()),
        }
    }
    info!("agents stopped");
    Ok(())
}
