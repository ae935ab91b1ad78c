use agentry_agent::{Agent, Components, FnSkill, TaskValue};
use agentry_chat::{run_delivery_loop, ChatSession, ChatTransport, ChatValue};
use agentry_core::{ChatConfig, Error, InboundMessage};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "agentry")]
#[command(about = "Agent task/skill runtime demo", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive console chat agent with an echo skill
    Chat {
        /// Seed the conversation with a system prompt
        #[arg(long)]
        system_prompt: Option<String>,

        /// Cap on messages kept per entity
        #[arg(long)]
        history_limit: Option<usize>,

        /// Path to a YAML chat config (flags override it)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Console stand-in for a chat SDK client. Sends print to stdout; deletes are
/// acknowledged in logs only since printed lines cannot be unprinted.
struct ConsoleTransport {
    counter: AtomicU64,
}

#[async_trait]
impl ChatTransport for ConsoleTransport {
    async fn send_message(&self, _chat_id: &str, content: &str) -> agentry_core::Result<String> {
        println!("bot> {content}");
        Ok(format!("console-{}", self.counter.fetch_add(1, Ordering::SeqCst)))
    }

    async fn delete_message(&self, _chat_id: &str, message_id: &str) -> agentry_core::Result<()> {
        tracing::debug!(message_id = %message_id, "Console transport cannot delete, ignoring");
        Ok(())
    }
}

fn echo_skill() -> FnSkill<
    impl Fn(TaskValue, &Components<'_>) -> agentry_core::Result<TaskValue> + Send + Sync,
> {
    FnSkill::new("echo_reply", |mut value, _| {
        let chat = value
            .downcast_mut::<ChatValue>()
            .ok_or_else(|| Error::Skill("expected a chat value".to_string()))?;
        let reply = format!("you said: {}", chat.last_user_content().unwrap_or_default());
        chat.append_assistant(&reply);
        Ok(value)
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Chat {
            system_prompt,
            history_limit,
            config,
        } => run_chat(system_prompt, history_limit, config).await,
    }
}

async fn run_chat(
    system_prompt: Option<String>,
    history_limit: Option<usize>,
    config: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut chat_config = match config {
        Some(path) => ChatConfig::load(&path)?,
        None => ChatConfig::default(),
    };
    if system_prompt.is_some() {
        chat_config.system_prompt = system_prompt;
    }
    if let Some(limit) = history_limit {
        chat_config.history_limit = Some(limit);
    }

    let transport = Arc::new(ConsoleTransport {
        counter: AtomicU64::new(0),
    });

    let mut agent = Agent::new("console_chat");
    agent.add_skill(echo_skill());
    let (session, delivery_rx) =
        ChatSession::new(agent, transport.clone(), chat_config, &["echo_reply"])?;
    tokio::spawn(run_delivery_loop(delivery_rx, transport));

    println!("agentry console chat. Type a message, Ctrl-D to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        session.handle_inbound(&InboundMessage::cli(text)).await?;
    }
    Ok(())
}
