use dislike_coach::core::coach::{compile_prompt, Coach};
use dislike_coach::core::conversation::{ChatMessage, ConversationInput};
use dislike_coach::core::cortex::GeminiAdapter;
use dislike_coach::core::state::{CoachConfig, COACH_DIR, CONFIG_FILE};
use dislike_coach::io::{logging, report};
use dislike_coach::mcp::server::McpServer;
use dislike_coach::mcp::transport::StdioTransport;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dislike-coach", version, about = "Turn a disliked LLM answer into a better prompt")]
struct Cli {
    /// Path to config.toml (default: .dislike-coach/config.toml)
    #[arg(long, global = true, env = "DISLIKE_COACH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the MCP server on stdio (default)
    Serve,
    /// Analyze one conversation and print the suggested prompt
    Analyze {
        #[command(flatten)]
        input: InputArgs,
        /// Print raw JSON instead of the report
        #[arg(long)]
        json: bool,
    },
    /// Print the compiled request without calling the model
    Prompt {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Write a default config file
    Init,
}

#[derive(Args, Debug)]
struct InputArgs {
    /// JSON array of {role, content} messages; `-` reads stdin
    #[arg(long, short)]
    file: PathBuf,
    /// Why the last answer was disliked
    #[arg(long)]
    comment: Option<String>,
    /// Task domain hint, e.g. "coding"
    #[arg(long)]
    hint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::from_filename(".env").ok();
    logging::init("info");

    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(|| Path::new(COACH_DIR).join(CONFIG_FILE));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Init => init_workspace(&config_path),
        Command::Prompt { input } => {
            let config = CoachConfig::load(&config_path)?;
            let input = read_input(&input).await?;
            println!("{}", compile_prompt(&input, config.window_size));
            Ok(())
        }
        Command::Analyze { input, json } => {
            let coach = build_coach(&config_path)?;
            let input = read_input(&input).await?;
            let result = coach.analyze_dislike(&input).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", report::render(&result));
            }
            Ok(())
        }
        Command::Serve => {
            let coach = build_coach(&config_path)?;
            info!(
                model = %coach.config().model,
                window = coach.config().window_size,
                terminal = ?coach.config().policy.terminal,
                "dislike-coach starting"
            );
            McpServer::new(Arc::new(coach))
                .serve(Arc::new(StdioTransport::stdio()))
                .await
        }
    }
}

fn build_coach(config_path: &Path) -> Result<Coach> {
    let config = CoachConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let adapter = GeminiAdapter::from_env(&config)?;
    Ok(Coach::new(config, Arc::new(adapter)))
}

async fn read_input(args: &InputArgs) -> Result<ConversationInput> {
    let raw = if args.file.as_os_str() == "-" {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        buf
    } else {
        fs::read_to_string(&args.file)
            .with_context(|| format!("Failed to read {}", args.file.display()))?
    };

    let messages: Vec<ChatMessage> =
        serde_json::from_str(&raw).context("Expected a JSON array of {role, content} messages")?;

    let mut input = ConversationInput::new(messages);
    input.user_comment = args.comment.clone();
    input.task_hint = args.hint.clone();
    Ok(input)
}

fn init_workspace(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        bail!("{} already exists, refusing to overwrite", config_path.display());
    }
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let toml = CoachConfig::default().to_toml_string()?;
    fs::write(config_path, toml)?;
    println!(
        "{} {}",
        "✅ Wrote default config to".green().bold(),
        config_path.display()
    );
    Ok(())
}
