use clap::Parser;
use client::network::{Client, ClientConfig};
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:4000")]
    server: String,

    /// Bearer token identifying the player
    #[arg(short = 't', long)]
    token: String,

    /// Send the token as a query parameter instead of a header
    #[arg(long)]
    token_in_query: bool,

    /// Do not start the auto-clicker automatically
    #[arg(long)]
    no_auto_click: bool,

    /// Seed for random block selection
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = ClientConfig {
        server_url: args.server,
        token: args.token,
        token_in_query: args.token_in_query,
        auto_click: !args.no_auto_click,
        seed: args.seed,
    };

    info!("Connecting to: {}", config.server_url);
    let mut client = Client::connect(&config).await?;
    client.run().await?;

    Ok(())
}
