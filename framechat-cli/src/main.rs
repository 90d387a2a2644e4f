//! framechat - chat console speaking the length-prefixed frame protocol.
//!
//! Exit codes: 0 clean exit, 1 configuration error, 2 connect or resolve
//! failure, 3 any other session error.

mod chat;
mod config;

use clap::Parser;
use colored::Colorize;
use config::Config;
use framechat_client::{Client, ClientError, ConnectionConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "framechat")]
#[command(about = "Chat client for framechat servers")]
#[command(version)]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, env = "FRAMECHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Display name (overrides config)
    #[arg(short, long)]
    username: Option<String>,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 5)]
    connect_timeout: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    println!("{}", "framechat".bold().cyan());

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            return 1;
        }
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(username) = cli.username {
        config.username = username;
    }
    if let Err(e) = config.validate() {
        eprintln!("{}: {}", "Error".red(), e);
        return 1;
    }
    tracing::debug!("configured as {} for {}:{}", config.username, config.host, config.port);

    let conn_config = ConnectionConfig::new(config.host.clone(), config.port)
        .with_connect_timeout(Duration::from_secs(cli.connect_timeout));
    let client = Client::new(conn_config);

    println!("Connecting to {}:{}...", config.host, config.port);
    if let Err(e) = client.connect().await {
        eprintln!("{}: {}", "Error".red(), e);
        return exit_code(&e);
    }
    println!("{}\n", "Connected!".green());

    match chat::run(&client, &config.username).await {
        Ok(()) => {
            println!("{}", "Disconnected.".dimmed());
            0
        }
        Err(e) => match e.downcast::<ClientError>() {
            Ok(e) if matches!(*e, ClientError::ConnectionClosed) => {
                println!("{}", "Peer closed the connection.".dimmed());
                0
            }
            Ok(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                exit_code(&e)
            }
            Err(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                3
            }
        },
    }
}

/// Maps a session error to the process exit code contract.
fn exit_code(err: &ClientError) -> i32 {
    match err {
        ClientError::Connect { .. } | ClientError::ConnectTimeout { .. } => 2,
        _ => 3,
    }
}
