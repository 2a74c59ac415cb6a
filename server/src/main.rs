use clap::Parser;
use log::{info, warn};
use server::auth::{Claims, StaticTokenVerifier};
use server::config::{
    ServerConfig, DEFAULT_COLOR_POOL_SIZE, DEFAULT_LEADERBOARD_SIZE, DEFAULT_MAX_CLIENTS,
    DEFAULT_MAX_REPORT_POINTS,
};
use server::error::ServerError;
use server::game::Game;
use server::network::Server;
use server::store::{
    CubeStore, FileCubeStore, FileUserStore, MemoryCubeStore, MemoryUserStore, UserStore,
};
use shared::DEFAULT_GRID_SIZE;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "4000")]
    port: u16,

    /// Face dimension of newly generated layers
    #[arg(short, long, default_value_t = DEFAULT_GRID_SIZE)]
    grid_size: usize,

    /// Seconds a player must wait between nukes
    #[arg(long, default_value = "1800")]
    nuke_cooldown_secs: u64,

    /// Number of players in leaderboard updates
    #[arg(long, default_value_t = DEFAULT_LEADERBOARD_SIZE)]
    leaderboard_size: usize,

    /// Maximum concurrent connections
    #[arg(short, long, default_value_t = DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    /// Largest base amount accepted per point report
    #[arg(long, default_value_t = DEFAULT_MAX_REPORT_POINTS)]
    max_report_points: u64,

    /// Cube snapshot file (kept in memory if omitted)
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// User records file (kept in memory if omitted)
    #[arg(long)]
    users: Option<PathBuf>,

    /// JSON token table mapping tokens to claims
    #[arg(long)]
    tokens: Option<PathBuf>,

    /// Extra development token as TOKEN=SUBJECT, may be repeated
    #[arg(long = "token", value_name = "TOKEN=SUBJECT")]
    dev_tokens: Vec<String>,
}

impl Args {
    fn config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: format!("{}:{}", self.host, self.port),
            grid_size: self.grid_size,
            nuke_cooldown: Duration::from_secs(self.nuke_cooldown_secs),
            leaderboard_size: self.leaderboard_size,
            color_pool_size: DEFAULT_COLOR_POOL_SIZE,
            max_clients: self.max_clients,
            max_report_points: self.max_report_points,
            snapshot_path: self.snapshot.clone(),
            users_path: self.users.clone(),
            tokens_path: self.tokens.clone(),
        }
    }
}

fn build_verifier(
    config: &ServerConfig,
    dev_tokens: &[String],
) -> Result<StaticTokenVerifier, ServerError> {
    let mut verifier = match &config.tokens_path {
        Some(path) => StaticTokenVerifier::from_file(path)?,
        None => StaticTokenVerifier::new(),
    };

    for entry in dev_tokens {
        let (token, sub) = entry.split_once('=').ok_or_else(|| {
            ServerError::Config(format!("expected TOKEN=SUBJECT, got '{}'", entry))
        })?;
        verifier = verifier.with_token(token, Claims::new(sub));
    }

    if verifier.is_empty() {
        warn!("No tokens configured; every connection will be refused");
    } else {
        info!("Loaded {} tokens", verifier.len());
    }
    Ok(verifier)
}

fn build_stores(
    config: &ServerConfig,
) -> Result<(Arc<dyn UserStore>, Arc<dyn CubeStore>), ServerError> {
    let users: Arc<dyn UserStore> = match &config.users_path {
        Some(path) => Arc::new(FileUserStore::open(path)?),
        None => {
            warn!("No --users file given; progress is lost on restart");
            Arc::new(MemoryUserStore::new())
        }
    };
    let cubes: Arc<dyn CubeStore> = match &config.snapshot_path {
        Some(path) => Arc::new(FileCubeStore::new(path)),
        None => Arc::new(MemoryCubeStore::new()),
    };
    Ok((users, cubes))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.config();
    config.validate()?;

    let verifier = build_verifier(&config, &args.dev_tokens)?;
    let (users, cubes) = build_stores(&config)?;

    info!(
        "Starting server on {} (grid {}, nuke cooldown {:?})",
        config.bind_addr, config.grid_size, config.nuke_cooldown
    );

    let game = Arc::new(Game::new(config.clone(), Arc::new(verifier), users, cubes));
    let server = Server::bind(&config.bind_addr, game).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
