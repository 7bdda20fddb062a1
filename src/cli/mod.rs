//! Command-line front end for trying providers from a terminal.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use strum::IntoEnumIterator;

use crate::config::ClientConfig;
use crate::error::{Result, TalkwireError};
use crate::lifecycle::{LifecycleEvent, LifecycleState, RequestLifecycle};
use crate::models::ProviderKind;
use crate::provider::HttpTransport;
use crate::types::{Conversation, Message};

#[derive(Parser, Debug)]
#[command(name = "talkwire", version, about = "Stream chat replies from any configured provider")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one prompt and stream the reply
    Chat(ChatArgs),
    /// List known providers and their default endpoints
    Providers,
}

#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Provider kind (openai, anthropic, google, groq, ...)
    #[arg(short, long, default_value = "openai")]
    pub provider: ProviderKind,

    /// Model identifier as the provider names it
    #[arg(short, long)]
    pub model: String,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Temperature (0.0 - 2.0)
    #[arg(short, long)]
    pub temperature: Option<f64>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Wait for the whole reply instead of streaming it
    #[arg(long)]
    pub no_stream: bool,

    /// Config file (defaults to the platform config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    pub prompt: String,
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Chat(args) => chat(args).await,
        Commands::Providers => {
            for kind in ProviderKind::iter() {
                println!("{kind:<12} {}", kind.default_host());
            }
            Ok(())
        }
    }
}

async fn chat(args: ChatArgs) -> Result<()> {
    let client = match &args.config {
        Some(path) => {
            let mut client = ClientConfig::load(path)?;
            client.apply_env(|key| std::env::var(key).ok());
            client
        }
        None => ClientConfig::load_default()?,
    };

    let mut config = client.provider_config(args.provider, args.model)?;
    config.system_prompt = args.system;
    config.temperature = args.temperature;
    config.max_tokens = args.max_tokens;
    config.stream = !args.no_stream;

    let lifecycle = RequestLifecycle::new(Arc::new(HttpTransport::new()?), client.lifecycle());
    let conversation = Conversation::with_messages(vec![Message::user(args.prompt)]);
    let mut handle = lifecycle.send(conversation, config);

    let mut printed = 0usize;
    let mut stdout = std::io::stdout();
    while let Some(event) = handle.next_event().await {
        match event {
            LifecycleEvent::MessageStarted { .. } => printed = 0,
            LifecycleEvent::DraftUpdated { draft, .. } => {
                if let Some(fresh) = draft.text.get(printed..) {
                    print!("{fresh}");
                    let _ = stdout.flush();
                }
                printed = draft.text.len();
            }
            LifecycleEvent::MessageFinalized { message } => {
                if let Some(rest) = message.content.get(printed..) {
                    print!("{rest}");
                }
                printed = message.content.len();
                for call in &message.tool_calls {
                    eprintln!("\n> {} {}", call.name, call.arguments);
                }
            }
            LifecycleEvent::Finished(result) => {
                println!();
                if result.state == LifecycleState::Failed {
                    let message = result
                        .error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "request failed".into());
                    return Err(TalkwireError::Provider(message));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chat_with_all_options() {
        let cli = Cli::try_parse_from([
            "talkwire",
            "chat",
            "-p",
            "anthropic",
            "-m",
            "claude-sonnet-4",
            "-s",
            "You are helpful",
            "-t",
            "0.7",
            "--max-tokens",
            "1024",
            "--no-stream",
            "Hello world",
        ])
        .unwrap();
        match cli.command {
            Commands::Chat(args) => {
                assert_eq!(args.provider, ProviderKind::Anthropic);
                assert_eq!(args.model, "claude-sonnet-4");
                assert_eq!(args.system.as_deref(), Some("You are helpful"));
                assert!((args.temperature.unwrap() - 0.7).abs() < f64::EPSILON);
                assert_eq!(args.max_tokens, Some(1024));
                assert!(args.no_stream);
                assert_eq!(args.prompt, "Hello world");
            }
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn provider_defaults_to_openai() {
        let cli = Cli::try_parse_from(["talkwire", "chat", "-m", "gpt-4o", "hi"]).unwrap();
        match cli.command {
            Commands::Chat(args) => {
                assert_eq!(args.provider, ProviderKind::OpenAi);
                assert!(!args.no_stream);
            }
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(Cli::try_parse_from(["talkwire", "chat", "-p", "nope", "-m", "x", "hi"]).is_err());
    }

    #[test]
    fn parse_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["talkwire"]).is_err());
    }
}
