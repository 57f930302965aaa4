//! CLI module for the LLM Connect command-line interface.
//!
//! Without a subcommand the binary starts the server. Subcommands talk to a
//! running server:
//! - `register` / `login` - Create an account and obtain a session token
//! - `whoami` - Show the account behind the token
//! - `conversations list|create` - Manage conversations
//! - `messages list|send` - Read or extend a conversation
//! - `config check` - Validate configuration file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::session::SESSION_COOKIE;

/// Server-side default run deadline (60s) plus one request timeout (30s), with headroom
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "llm-connect")]
#[command(author, version, about = "Chat with an AI assistant through a small account-aware API", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "llm-connect.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// API URL to connect to (default: http://localhost:8080)
    #[arg(long, env = "LLM_CONNECT_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Session token (can also be set via LLM_CONNECT_TOKEN env var)
    #[arg(long, env = "LLM_CONNECT_TOKEN")]
    pub token: Option<String>,

    /// Request timeout in seconds. The default outlasts the server's
    /// assistant run deadline so `messages send` sees the reply.
    #[arg(long, env = "LLM_CONNECT_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new account
    Register {
        email: String,
        /// Password (prompting is not supported; prefer the env var)
        #[arg(long, env = "LLM_CONNECT_PASSWORD")]
        password: String,
    },

    /// Log in and print a session token
    Login {
        email: String,
        #[arg(long, env = "LLM_CONNECT_PASSWORD")]
        password: String,
    },

    /// Show the account behind the current token
    Whoami,

    /// Conversation management commands
    #[command(subcommand)]
    Conversations(ConversationsCommands),

    /// Message commands
    #[command(subcommand)]
    Messages(MessagesCommands),

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConversationsCommands {
    /// List your conversations
    List,
    /// Start a new conversation
    Create,
}

#[derive(Subcommand, Debug)]
pub enum MessagesCommands {
    /// Show the full history of a conversation
    List { conversation: i64 },
    /// Send a message and print the assistant's reply
    Send { conversation: i64, message: String },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct MessageBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    token: String,
}

#[derive(Debug, Deserialize)]
struct UserBody {
    id: i64,
    email: String,
}

#[derive(Debug, Deserialize)]
struct Conversation {
    id: i64,
    thread_id: String,
    created_at: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct CreatedConversation {
    conversation_id: i64,
}

#[derive(Debug, Deserialize)]
struct Reply {
    response: String,
}

#[derive(Debug, Deserialize)]
struct History {
    conversation_id: i64,
    messages: Vec<crate::assistant::ThreadMessage>,
}

/// Error envelope returned by the server
#[derive(Debug, Deserialize)]
struct ServerError {
    error: ServerErrorBody,
}

#[derive(Debug, Deserialize)]
struct ServerErrorBody {
    message: String,
}

// ============================================================================
// CLI Command Handlers
// ============================================================================

/// Create an HTTP client that sends the session token as a cookie
fn create_client(token: Option<&str>, timeout_secs: u64) -> Result<Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Some(token) = token {
        headers.insert(
            reqwest::header::COOKIE,
            format!("{}={}", SESSION_COOKIE, token)
                .parse()
                .context("Invalid token format")?,
        );
    }

    Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to create HTTP client")
}

fn require_token(cli: &Cli) -> Result<&str> {
    cli.token.as_deref().context(
        "Authentication required. Use --token or set LLM_CONNECT_TOKEN environment variable.",
    )
}

/// Pull the human-readable message out of an error body, falling back to the raw text
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ServerError>(body) {
        Ok(err) => err.error.message,
        Err(_) => body.trim().to_string(),
    }
}

/// Turn a non-2xx response into an error and decode the rest
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Server returned error {}: {}", status, error_message(&body));
    }

    response
        .json()
        .await
        .context("Failed to parse server response")
}

/// Run a CLI command
pub async fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::Register { email, password }) => cmd_register(cli, email, password).await,
        Some(Commands::Login { email, password }) => cmd_login(cli, email, password).await,
        Some(Commands::Whoami) => cmd_whoami(cli).await,
        Some(Commands::Conversations(ConversationsCommands::List)) => {
            cmd_conversations_list(cli).await
        }
        Some(Commands::Conversations(ConversationsCommands::Create)) => {
            cmd_conversations_create(cli).await
        }
        Some(Commands::Messages(MessagesCommands::List { conversation })) => {
            cmd_messages_list(cli, *conversation).await
        }
        Some(Commands::Messages(MessagesCommands::Send {
            conversation,
            message,
        })) => cmd_messages_send(cli, *conversation, message).await,
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli).await,
        None => {
            // No subcommand means start the server - this is handled in main.rs
            Ok(())
        }
    }
}

async fn cmd_register(cli: &Cli, email: &str, password: &str) -> Result<()> {
    let client = create_client(None, cli.timeout)?;
    let response = client
        .post(format!("{}/register", cli.api_url))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .context("Failed to connect to server. Is LLM Connect running?")?;

    let body: MessageBody = read_json(response).await?;
    println!("{}", body.message);
    Ok(())
}

/// Print the token on its own line so it can be captured by scripts
async fn cmd_login(cli: &Cli, email: &str, password: &str) -> Result<()> {
    let client = create_client(None, cli.timeout)?;
    let response = client
        .post(format!("{}/login", cli.api_url))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .context("Failed to connect to server. Is LLM Connect running?")?;

    let body: LoginBody = read_json(response).await?;
    println!("{}", body.token);
    eprintln!("Export it with: export LLM_CONNECT_TOKEN=<token>");
    Ok(())
}

async fn cmd_whoami(cli: &Cli) -> Result<()> {
    let client = create_client(Some(require_token(cli)?), cli.timeout)?;
    let response = client
        .get(format!("{}/user", cli.api_url))
        .send()
        .await
        .context("Failed to connect to server")?;

    let user: UserBody = read_json(response).await?;
    println!("{} (id {})", user.email, user.id);
    Ok(())
}

async fn cmd_conversations_list(cli: &Cli) -> Result<()> {
    let client = create_client(Some(require_token(cli)?), cli.timeout)?;
    let response = client
        .get(format!("{}/conversations", cli.api_url))
        .send()
        .await
        .context("Failed to connect to server")?;

    let conversations: Vec<Conversation> = read_json(response).await?;
    if conversations.is_empty() {
        println!("No conversations found.");
        return Ok(());
    }

    println!();
    println!("{:<8}  {:<32}  {:<10}  {:<25}", "ID", "THREAD", "STATUS", "CREATED");
    println!("{}", "-".repeat(81));
    for conversation in conversations {
        println!(
            "{:<8}  {:<32}  {:<10}  {:<25}",
            conversation.id,
            truncate(&conversation.thread_id, 32),
            conversation.status,
            conversation.created_at
        );
    }
    println!();
    Ok(())
}

async fn cmd_conversations_create(cli: &Cli) -> Result<()> {
    let client = create_client(Some(require_token(cli)?), cli.timeout)?;
    let response = client
        .post(format!("{}/conversations", cli.api_url))
        .send()
        .await
        .context("Failed to connect to server")?;

    let created: CreatedConversation = read_json(response).await?;
    println!("Created conversation {}", created.conversation_id);
    Ok(())
}

async fn cmd_messages_list(cli: &Cli, conversation: i64) -> Result<()> {
    let client = create_client(Some(require_token(cli)?), cli.timeout)?;
    let response = client
        .get(format!("{}/conversations/{}/messages", cli.api_url, conversation))
        .send()
        .await
        .context("Failed to connect to server")?;

    let history: History = read_json(response).await?;
    if history.messages.is_empty() {
        println!("Conversation {} has no messages yet.", history.conversation_id);
        return Ok(());
    }

    for message in history.messages {
        println!("[{}] {}", message.role, message.content.join("\n"));
        println!();
    }
    Ok(())
}

async fn cmd_messages_send(cli: &Cli, conversation: i64, message: &str) -> Result<()> {
    let client = create_client(Some(require_token(cli)?), cli.timeout)?;
    let response = client
        .post(format!("{}/conversations/{}/messages", cli.api_url, conversation))
        .json(&json!({ "message": message }))
        .send()
        .await
        .context("Failed to connect to server")?;

    let reply: Reply = read_json(response).await?;
    println!("{}", reply.response);
    Ok(())
}

/// Validate configuration file
async fn cmd_config_check(cli: &Cli) -> Result<()> {
    use crate::config::Config;

    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!(
            "[!!] Configuration file not found: {}",
            config_path.display()
        );
        println!();
        println!("Defaults plus environment variables will be used when starting the server.");
    }

    match Config::load(config_path) {
        Ok(config) => {
            println!("[OK] Configuration is valid!");
            println!();
            println!("=== Configuration Summary ===");
            println!();
            println!("Server:");
            println!("  Host:         {}", config.server.host);
            println!("  Port:         {}", config.server.port);
            println!("  Data Dir:     {}", config.server.data_dir.display());
            println!(
                "  Secure Cookies: {}",
                if config.server.secure_cookies {
                    "Enabled"
                } else {
                    "Disabled"
                }
            );
            println!();
            println!("Database:");
            println!("  Max Connections: {}", config.database.max_connections);
            println!();
            println!("Assistant:");
            println!("  Base URL:     {}", config.assistant.base_url);
            println!(
                "  Assistant ID: {}",
                config.assistant.assistant_id.as_deref().unwrap_or("-")
            );
            println!("  Run Timeout:  {}s", config.assistant.run_timeout_secs);
            println!();

            if !config.server.secure_cookies {
                println!("Warnings:");
                println!("  [!] Session cookies are not marked Secure - serve behind HTTPS in production");
                println!();
            }

            Ok(())
        }
        Err(e) => {
            println!("[!!] Configuration is invalid!");
            println!();
            println!("Error: {:#}", e);
            println!();
            anyhow::bail!("Invalid configuration");
        }
    }
}

/// Truncate a string to a maximum length
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
