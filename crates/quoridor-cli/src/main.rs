use std::time::Duration;

use clap::Parser;
use quoridor_client::config::ClientConfig;
use tracing_subscriber::EnvFilter;

mod client;
mod command;

#[derive(Parser)]
#[command(name = "quoridor")]
#[command(about = "Play a Quoridor session from the terminal", long_about = None)]
struct Cli {
    /// REST backend base URL (overrides QUORIDOR_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Push channel WebSocket URL (overrides QUORIDOR_PUSH_URL)
    #[arg(long)]
    push_url: Option<String>,

    /// Rely on polling only
    #[arg(long)]
    no_push: bool,

    /// Chat store base URL (overrides QUORIDOR_CHAT_URL)
    #[arg(long)]
    chat_url: Option<String>,

    /// Poll interval in seconds (overrides QUORIDOR_POLL_SECS)
    #[arg(long)]
    poll_secs: Option<u64>,

    /// Bearer token for the backend (overrides QUORIDOR_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Session ID to open or join
    #[arg(short, long)]
    session: Option<String>,

    /// Your participant ID
    #[arg(short, long)]
    player: String,

    /// Create a new session instead of opening an existing one
    #[arg(short, long)]
    create: bool,

    /// Join the session as the second player before opening it
    #[arg(short, long)]
    join: bool,

    /// Board size for --create
    #[arg(long, default_value_t = quoridor_core::protocol::DEFAULT_BOARD_SIZE)]
    board_size: u16,

    /// List sessions and exit
    #[arg(short, long)]
    list: bool,
}

impl Cli {
    fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::from_env();
        if let Some(url) = &self.api_url {
            config = config.with_api_url(url.clone());
        }
        if self.push_url.is_some() {
            config = config.with_push_url(self.push_url.clone());
        }
        if self.no_push {
            config = config.with_push_url(None);
        }
        if self.chat_url.is_some() {
            config = config.with_chat_url(self.chat_url.clone());
        }
        if let Some(secs) = self.poll_secs {
            config = config.with_poll_interval(Duration::from_secs(secs));
        }
        if self.token.is_some() {
            config = config.with_token(self.token.clone());
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        config
    }
}

#[tokio::main]
async fn main() {
    // Respects RUST_LOG.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    if let Err(e) = client::start_client(&cli, config).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
