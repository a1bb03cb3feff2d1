//! # Queue-Lease CLI
//!
//! Command-line interface over the queue-lease facade.
//!
//! This module provides CLI commands for:
//! - Queue administration (create, delete, list, existence checks)
//! - Sending, receiving and acknowledging messages
//! - Inspecting backend capabilities and the resolved configuration
//!
//! Command results are written to stdout as JSON; logs go to stderr.

use clap::{CommandFactory, Parser, Subcommand};
use queue_lease::{
    BackendConfig, ClientConfig, ConfigurationError, LeaseToken, LoggingConfig, MessageRecord,
    Queue, QueueError, QueueName, ReceiveOptions, VisibilityTimeout,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ============================================================================
// CLI Structure
// ============================================================================

/// Queue-Lease CLI - lease-based message queues
#[derive(Parser)]
#[command(name = "queue-lease")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Send, receive and acknowledge messages on lease-based queues")]
#[command(
    long_about = "Queue-Lease claims messages with a visibility timeout so independent consumers never hold the same message at once"
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "QUEUE_LEASE_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database file; overrides the configured backend
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Queue to operate on; overrides the configured queue name
    #[arg(short, long)]
    pub queue: Option<String>,

    /// Logging level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a queue
    Create {
        /// Name of the queue to create
        name: String,

        /// Default visibility timeout in seconds
        #[arg(short, long)]
        timeout: Option<i64>,
    },

    /// Delete the selected queue and all its messages
    DeleteQueue,

    /// Send a message to the selected queue
    Send {
        /// Message body
        body: String,
    },

    /// Claim messages from the selected queue
    Receive {
        /// Maximum number of messages to claim
        #[arg(short, long, default_value = "1", allow_negative_numbers = true)]
        max: i64,

        /// Visibility timeout in seconds; the queue default when omitted
        #[arg(short, long)]
        timeout: Option<i64>,
    },

    /// Acknowledge (delete) a claimed message by its lease token
    Ack {
        /// Lease token returned by receive
        token: String,
    },

    /// Count messages in the selected queue, leased or not
    Count,

    /// Check whether a queue exists
    Exists {
        /// Queue name to check
        name: String,
    },

    /// List all queues
    List,

    /// Show the backend capability table
    Capabilities,

    /// Show diagnostic information about the selected queue
    Info,

    /// Show the resolved configuration
    Config {
        /// Output format for configuration
        #[arg(short = 'f', long, default_value = "toml")]
        format: ConfigFormat,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Configuration format options
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
    /// TOML format
    Toml,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Queue(err) => match err {
                QueueError::Configuration(_) => 1,
                QueueError::ConnectionFailed { .. } | QueueError::Store { .. } => 2,
                QueueError::UnsupportedOperation { .. } | QueueError::QueueNotFound { .. } => 3,
                QueueError::InvalidArgument(_) => 4,
            },
            Self::CommandFailed { .. } => 3,
            Self::InvalidArgument { .. } => 4,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Default configuration file, used when it exists and no path is given
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("queue-lease").join("config.toml"))
}

/// Resolve configuration from file, environment and command-line overrides
pub fn resolve_config(cli: &Cli) -> Result<ClientConfig, CliError> {
    let path = cli
        .config
        .clone()
        .or_else(|| default_config_path().filter(|p| p.exists()));

    let mut config = ClientConfig::load(path.as_deref())?;

    if let Some(db) = &cli.db {
        config.backend = BackendConfig::sqlite(db.clone());
    }
    if let Some(queue) = &cli.queue {
        config.queue.name = queue.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.json_logs {
        config.logging.json = true;
    }

    config.validate()?;
    Ok(config)
}

/// Initialize logging to stderr; `RUST_LOG` wins over the configured level
pub fn init_logging(logging: &LoggingConfig) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| CliError::InvalidArgument {
            arg: "log-level".to_string(),
            message: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if logging.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| CliError::CommandFailed {
        message: format!("logging initialization failed: {e}"),
    })
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    let config = resolve_config(&cli)?;
    init_logging(&config.logging)?;

    let output = execute_command(cli.command, &config).await?;
    println!("{output}");
    Ok(())
}

/// Execute a command and render its output
pub async fn execute_command(command: Commands, config: &ClientConfig) -> Result<String, CliError> {
    debug!(command = ?command, backend = %config.backend.kind(), "Executing command");

    let value = match command {
        Commands::Config { format } => return render_config(config, format),
        Commands::Completions { shell } => {
            let mut buffer = Vec::new();
            clap_complete::generate(shell, &mut Cli::command(), "queue-lease", &mut buffer);
            return String::from_utf8(buffer).map_err(|e| CliError::CommandFailed {
                message: e.to_string(),
            });
        }
        Commands::Create { name, timeout } => {
            let queue = config.open_queue().await?;
            let name = parse_queue_name(&name)?;
            let timeout = timeout.map(parse_timeout).transpose()?;
            let created = queue.create_queue(&name, timeout).await?;
            json!({ "queue": name, "created": created })
        }
        Commands::DeleteQueue => {
            let mut queue = config.open_queue().await?;
            let deleted = queue.delete_queue().await?;
            info!(queue = %queue.name(), deleted, "Queue deleted");
            json!({ "queue": queue.name(), "deleted": deleted })
        }
        Commands::Send { body } => {
            let queue = config.open_queue().await?;
            let record = queue.send(body).await?;
            message_json(&record)
        }
        Commands::Receive { max, timeout } => {
            let queue = config.open_queue().await?;
            let mut options = ReceiveOptions::new().with_max_messages(max);
            if let Some(timeout) = timeout {
                options = options.with_visibility_timeout(parse_timeout(timeout)?);
            }
            let batch = queue.receive(options).await?;
            let messages: Vec<Value> = batch.iter().map(message_json).collect();
            json!({ "queue": batch.queue(), "messages": messages })
        }
        Commands::Ack { token } => {
            let queue = config.open_queue().await?;
            let token = LeaseToken::new(token).map_err(|e| CliError::InvalidArgument {
                arg: "token".to_string(),
                message: e.to_string(),
            })?;
            let deleted = queue.delete_message(&token).await?;
            json!({ "deleted": deleted })
        }
        Commands::Count => {
            let queue = config.open_queue().await?;
            let count = queue.count().await?;
            json!({ "queue": queue.name(), "count": count })
        }
        Commands::Exists { name } => {
            let queue = config.open_queue().await?;
            let name = parse_queue_name(&name)?;
            let exists = queue.is_exists(&name).await?;
            json!({ "queue": name, "exists": exists })
        }
        Commands::List => {
            let queue = config.open_queue().await?;
            let queues = queue.get_queues().await?;
            json!({ "queues": queues })
        }
        Commands::Capabilities => {
            let queue = config.open_queue().await?;
            json!({ "backend": queue.backend_kind(), "capabilities": queue.capabilities().to_map() })
        }
        Commands::Info => {
            let queue: Queue = config.open_queue().await?;
            to_json_value(&queue.debug_info())?
        }
    };

    serde_json::to_string_pretty(&value).map_err(|e| CliError::CommandFailed {
        message: e.to_string(),
    })
}

fn render_config(config: &ClientConfig, format: ConfigFormat) -> Result<String, CliError> {
    let failed = |message: String| CliError::CommandFailed { message };

    match format {
        ConfigFormat::Toml => toml::to_string_pretty(config).map_err(|e| failed(e.to_string())),
        ConfigFormat::Yaml => serde_yaml::to_string(config).map_err(|e| failed(e.to_string())),
        ConfigFormat::Json => {
            serde_json::to_string_pretty(config).map_err(|e| failed(e.to_string()))
        }
    }
}

fn message_json(record: &MessageRecord) -> Value {
    json!({
        "id": record.id,
        "body": String::from_utf8_lossy(&record.body),
        "checksum": record.checksum,
        "created_at": record.created_at,
        "lease_token": record.lease_token,
        "lease_expires_at": record.lease_expires_at,
    })
}

fn to_json_value<T: serde::Serialize>(value: &T) -> Result<Value, CliError> {
    serde_json::to_value(value).map_err(|e| CliError::CommandFailed {
        message: e.to_string(),
    })
}

fn parse_queue_name(name: &str) -> Result<QueueName, CliError> {
    name.parse::<QueueName>().map_err(|e| CliError::InvalidArgument {
        arg: "name".to_string(),
        message: e.to_string(),
    })
}

fn parse_timeout(seconds: i64) -> Result<VisibilityTimeout, CliError> {
    VisibilityTimeout::from_secs(seconds).map_err(|e| CliError::InvalidArgument {
        arg: "timeout".to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
