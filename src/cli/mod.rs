use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod chat;
pub mod config;
pub mod history;
pub mod models;
pub mod provider;
pub mod serve;

use crate::core::AppConfig;

#[derive(Subcommand)]
enum Command {
    /// Run the API server and the avatar transport
    Serve {
        /// Set the server host address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Set the server port
        #[arg(long, default_value = "2222")]
        port: String,
    },
    /// Start an interactive chat session
    Chat {},
    /// Print the conversation history
    History {
        /// Delete the stored history instead
        #[arg(long, action, default_value = "false")]
        clear: bool,
    },
    /// Show or change the chat configuration
    Config {
        /// Number of past rounds sent with each request (0-100)
        #[arg(long)]
        history_count: Option<i64>,
    },
    /// Configure the OpenAI compatible model provider
    Provider {
        #[arg(long)]
        base_url: String,
        #[arg(long)]
        api_key: String,
        /// Model to select after saving
        #[arg(long)]
        model: Option<String>,
    },
    /// Fetch and store the provider's model list
    Models {},
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // axum logs rejections from built-in extractors with the `axum::rejection`
                // target, at `TRACE` level. `axum::rejection=trace` enables showing those events
                default_filter.into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    let config = AppConfig::default();

    // Handle each sub command
    match args.command {
        Some(Command::Serve { host, port }) => {
            init_tracing(&format!(
                "{}=debug,tower_http=debug,axum::rejection=trace",
                env!("CARGO_CRATE_NAME")
            ));
            serve::run(host, port, config).await?;
        }
        Some(Command::Chat {}) => {
            // Keep log lines out of the conversation
            init_tracing(&format!("{}=warn", env!("CARGO_CRATE_NAME")));
            chat::run(config).await?;
        }
        Some(Command::History { clear }) => {
            init_tracing(&format!("{}=info", env!("CARGO_CRATE_NAME")));
            history::run(clear, config)?;
        }
        Some(Command::Config { history_count }) => {
            init_tracing(&format!("{}=info", env!("CARGO_CRATE_NAME")));
            config::run(history_count, config)?;
        }
        Some(Command::Provider {
            base_url,
            api_key,
            model,
        }) => {
            init_tracing(&format!("{}=info", env!("CARGO_CRATE_NAME")));
            provider::run(&base_url, &api_key, model.as_deref(), config)?;
        }
        Some(Command::Models {}) => {
            init_tracing(&format!("{}=info", env!("CARGO_CRATE_NAME")));
            models::run(config).await?;
        }
        None => {}
    }

    Ok(())
}
