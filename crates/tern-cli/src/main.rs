//! tern - terminal travel-booking assistant

mod chats;
mod commands;
mod config;
mod prompts;
mod ratelimit;
mod render;
mod tools;
mod utils;

use anyhow::Context;
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tern_agent::{
    Attachment, ChatStore, Identity, ModelSettings, RetryPolicy, Session, TurnHandle,
    with_system_prompt,
};
use tern_ai::providers::anthropic::AnthropicProvider;

/// Key the rate limiter counts a local user under when signed out
const ANONYMOUS_KEY: &str = "local";

/// tern - plan a trip from the books you love
#[derive(Parser, Debug)]
#[command(name = "tern")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to use (default: claude-3-haiku-20240307)
    #[arg(short, long)]
    model: Option<String>,

    /// Run in non-interactive mode with a single message
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Describe the books in an image before the first message
    #[arg(short, long)]
    attach: Option<PathBuf>,

    /// Act as this user (enables saving chats)
    #[arg(short, long)]
    user: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Resume a saved chat by ID
    #[arg(long)]
    resume: Option<String>,

    /// List saved chats
    #[arg(long)]
    chats: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    let filter = if args.verbose {
        tracing_subscriber::EnvFilter::new("tern=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Initialize config and exit
    if args.init_config {
        let path = config::Config::init().context("creating config file")?;
        println!("Config file created at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    // Load config file; CLI args take precedence
    let cfg = config::Config::load();
    let user_id = args.user.clone().or(cfg.user_id.clone());
    let chat_store: Arc<dyn ChatStore> = Arc::new(chats::FileChatStore::default());

    // List chats and exit
    if args.chats {
        return list_chats(chat_store.as_ref(), user_id.as_deref()).await;
    }

    let Some(api_key) = cfg.get_api_key() else {
        eprintln!("Error: No Anthropic API key found");
        eprintln!();
        eprintln!("Options:");
        eprintln!("  1. Set API key: export ANTHROPIC_API_KEY=your-key");
        eprintln!("  2. Add to config: tern --init-config");
        std::process::exit(1);
    };

    let timeout = Duration::from_secs(cfg.request_timeout_secs.unwrap_or(120));
    let provider = Arc::new(AnthropicProvider::with_timeout(api_key, timeout)?);

    let model_id = args
        .model
        .clone()
        .or(cfg.model.clone())
        .unwrap_or_else(|| tern_ai::models::DEFAULT_MODEL_ID.to_string());
    let model = tern_ai::models::resolve_model(&model_id, cfg.base_url.as_deref());
    let settings = ModelSettings {
        temperature: cfg.temperature.or(Some(0.0)),
        max_tokens: cfg.max_tokens,
        ..ModelSettings::new(model)
    };

    let registry = Arc::new(tools::registry()?);
    let today = chrono::Local::now().date_naive();
    let mut builder = Session::builder(provider, registry)
        .model(settings)
        .retry_policy(RetryPolicy {
            retry_protocol_errors: cfg.retry_protocol_errors.unwrap_or(false),
            ..RetryPolicy::default()
        })
        .prepare_history(with_system_prompt(prompts::travel_assistant(today)))
        .chat_store(chat_store);
    if let Some(ref id) = user_id {
        builder = builder.identity(Identity::new(id.clone()));
    }

    let session = match args.resume {
        Some(ref chat_id) => {
            let session = builder
                .resume(chat_id)
                .await
                .with_context(|| format!("resuming chat {}", chat_id))?;
            println!(
                "Resuming chat {} ({} messages)",
                chat_id,
                session.state().messages.len()
            );
            render::write_transcript(&session.ui_state(), &mut std::io::stdout())?;
            session
        }
        None => builder.build(),
    };

    let limiter = ratelimit::RateLimiter::per_minute(
        cfg.rate_limit_per_minute
            .unwrap_or(ratelimit::DEFAULT_LIMIT_PER_MINUTE),
    );
    let repl = Repl {
        session,
        limiter,
        rate_key: user_id.clone().unwrap_or_else(|| ANONYMOUS_KEY.to_string()),
        user_id,
    };

    if let Some(ref path) = args.attach {
        repl.attach(path).await?;
    }

    // Non-interactive mode
    if let Some(command) = args.command {
        println!("tern> {}", command);
        println!();
        repl.send(&command).await?;
        repl.session.shutdown().await;
        return Ok(());
    }

    let result = repl.run_interactive().await;
    repl.session.shutdown().await;
    result
}

struct Repl {
    session: Session,
    limiter: ratelimit::RateLimiter,
    rate_key: String,
    user_id: Option<String>,
}

impl Repl {
    /// Submit a message and print the turn
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        if !self.limiter.check(&self.rate_key) {
            println!("{}", ratelimit::WAITING_ROOM_NOTICE);
            return Ok(());
        }
        let handle = self.session.submit(text);
        self.print_turn(handle).await
    }

    /// Describe an image file; the answer feeds the next message
    async fn attach(&self, path: &Path) -> anyhow::Result<()> {
        if !self.limiter.check(&self.rate_key) {
            println!("{}", ratelimit::WAITING_ROOM_NOTICE);
            return Ok(());
        }
        // Anything that is not an image is sent as an empty attachment,
        // which the session rejects as unsupported video.
        let data_url = match commands::image_mime_type(path) {
            Some(mime) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                Attachment::from_bytes(mime, &bytes).to_data_url()
            }
            None => String::new(),
        };
        let handle = self.session.describe_attachment(data_url);
        self.print_turn(handle).await
    }

    async fn print_turn(&self, handle: TurnHandle) -> anyhow::Result<()> {
        tracing::debug!(turn_id = %handle.turn_id, "Turn started");
        let mut stdout = std::io::stdout();
        if let Some(error) = render::write_turn(handle.channels, &mut stdout).await? {
            eprintln!("Error: {}", error);
        }
        self.session.wait_idle().await;
        Ok(())
    }

    async fn run_interactive(&self) -> anyhow::Result<()> {
        use std::io;

        if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
            let conversation = self.session.state().conversation_id;
            eprintln!("tern chat: {}", utils::truncate_chars(&conversation, 8));
            eprintln!("Type /help for commands.");
            eprintln!();
        }

        loop {
            print!("> ");
            io::stdout().flush()?;

            let mut input = String::new();
            if io::stdin().read_line(&mut input)? == 0 {
                // EOF
                break;
            }

            let input = input.trim();
            if input.is_empty() {
                continue;
            }

            // Handle slash commands
            if let Some(result) = commands::execute_command(input) {
                match result {
                    commands::CommandResult::Message(msg) => println!("{}", msg),
                    commands::CommandResult::Attach(path) => {
                        if let Err(e) = self.attach(&path).await {
                            eprintln!("Error: {:#}", e);
                        }
                    }
                    commands::CommandResult::History => {
                        render::write_transcript(&self.session.ui_state(), &mut io::stdout())?;
                    }
                    commands::CommandResult::Pay => {
                        self.print_turn(self.session.request_code()).await?;
                        println!("Enter the code with /confirm <code>");
                    }
                    commands::CommandResult::Confirm(code) => {
                        tracing::debug!(code_len = code.len(), "Confirming payment");
                        self.print_turn(self.session.validate_code()).await?;
                    }
                    commands::CommandResult::Chats => {
                        let store = chats::FileChatStore::default();
                        list_chats(&store, self.user_id.as_deref()).await?;
                    }
                    commands::CommandResult::Exit => break,
                    commands::CommandResult::Unknown(cmd) => {
                        println!("Unknown command: /{}", cmd);
                        println!("Type /help for available commands.");
                    }
                }
                continue;
            }

            self.send(input).await?;
            println!();
        }

        Ok(())
    }
}

async fn list_chats(store: &dyn ChatStore, user_id: Option<&str>) -> anyhow::Result<()> {
    let Some(user_id) = user_id else {
        println!("Chats are saved only when signed in. Set user_id in the config or pass --user.");
        return Ok(());
    };

    let chats = store.list_chats(user_id).await?;
    if chats.is_empty() {
        println!("No saved chats.");
        return Ok(());
    }

    println!("Saved chats:");
    println!();
    for chat in chats {
        println!(
            "  {}  {}  {} messages  {}",
            chat.id,
            chat.created_at.format("%Y-%m-%d %H:%M"),
            chat.messages.len(),
            utils::truncate_chars(&chat.title, 40)
        );
    }
    println!();
    println!("Resume with: tern --resume <ID>");

    Ok(())
}
