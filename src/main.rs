//! tempo-server - Self-hosted backend for the Tempo productivity app
//!
//! Stores tasks, calendar events, reminders, and categories per user and
//! serves day/week time-budget analytics over them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod aggregation;
mod api;
mod config;
mod db;
mod models;
mod timewindow;

use config::Config;

#[derive(Parser)]
#[command(name = "tempo-server")]
#[command(about = "Self-hosted backend for the Tempo productivity app")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Serve {
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Initialize a new config file with a fresh signing secret
    Init {
        /// Output path for config file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tempo_server=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port, bind } => {
            let mut cfg = if let Some(path) = config {
                Config::load_from(&path)?
            } else {
                Config::load()?
            };

            // Override with CLI args
            if let Some(p) = port {
                cfg.server.port = p;
            }
            if let Some(b) = bind {
                cfg.server.bind = b;
            }

            run_server(cfg).await
        }

        Commands::Init { output } => {
            let path = output.unwrap_or_else(|| PathBuf::from("config.toml"));
            let mut cfg = Config::default();
            cfg.auth.jwt_secret = generate_secret();
            cfg.save_to(&path)?;

            println!("Created config file: {}", path.display());
            println!();
            println!("Next steps:");
            println!(
                "  1. Start the server: tempo-server serve --config {}",
                path.display()
            );
            println!("  2. Register an account: POST /api/auth/register");
            println!("  3. Point the Tempo app at http://YOUR_SERVER_IP:{}", cfg.server.port);

            Ok(())
        }
    }
}

async fn run_server(config: Config) -> Result<()> {
    anyhow::ensure!(
        !config.auth.jwt_secret.is_empty(),
        "auth.jwt_secret is not set - run 'tempo-server init' or add it to config.toml"
    );

    let db = db::Database::open(&config.database.path).context("Failed to open database")?;

    let state = api::AppState::new(db, config.clone());
    let app = api::create_router(state);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🚀 tempo-server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn generate_secret() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let bytes: [u8; 48] = rng.random();

    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

    bytes
        .iter()
        .map(|b| ALPHABET[(*b as usize) % ALPHABET.len()] as char)
        .collect()
}
