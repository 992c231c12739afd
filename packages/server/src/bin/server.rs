//! Real-time meeting server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin parole-server
//! cargo run --bin parole-server -- --host 0.0.0.0 --port 3000 --seed-file people.json
//! ```

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::Parser;
use parole_server::{
    domain::{NewPerson, RecordStore},
    infrastructure::repository::InMemoryRecordStore,
    ui::{Server, ServerConfig},
};
use parole_shared::logger::setup_logger;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "parole-server")]
#[command(about = "Real-time meeting server: sessions, chat and floor requests over WebSocket", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Per-recipient broadcast delivery timeout in milliseconds
    #[arg(long, default_value = "2000")]
    delivery_timeout_ms: u64,

    /// Capacity of each connection's outbound queue
    #[arg(long, default_value = "64")]
    outbound_buffer: usize,

    /// Capacity of each connection's inbound queue (frames beyond it are dropped)
    #[arg(long, default_value = "32")]
    inbound_buffer: usize,

    /// JSON file of persons (`[{login, password, nom, prenom}]`) loaded at startup
    #[arg(long)]
    seed_file: Option<PathBuf>,

    /// Default log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// A person entry of the seed file
#[derive(Debug, Deserialize)]
struct SeedPerson {
    login: String,
    password: String,
    #[serde(default)]
    nom: String,
    #[serde(default)]
    prenom: String,
}

async fn load_seed(
    store: &InMemoryRecordStore,
    path: &Path,
) -> Result<usize, Box<dyn std::error::Error>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let people: Vec<SeedPerson> = serde_json::from_str(&raw)?;
    let count = people.len();
    for person in people {
        store
            .insert_person(NewPerson {
                login: person.login,
                password: person.password,
                first_name: person.prenom,
                last_name: person.nom,
            })
            .await?;
    }
    Ok(count)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    // 1. Create the record store (in-memory) and load the seed file
    let store = Arc::new(InMemoryRecordStore::new());
    if let Some(path) = &args.seed_file {
        match load_seed(&store, path).await {
            Ok(count) => tracing::info!("Loaded {} person(s) from {}", count, path.display()),
            Err(e) => {
                tracing::error!("Failed to load seed file {}: {}", path.display(), e);
                std::process::exit(1);
            }
        }
    }

    // 2. Create and run the server
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        delivery_timeout: Duration::from_millis(args.delivery_timeout_ms),
        outbound_buffer: args.outbound_buffer,
        inbound_buffer: args.inbound_buffer,
    };
    if let Err(e) = Server::new(config, store).run().await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
