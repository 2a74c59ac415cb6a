//! # Cube Breaker Server Library
//!
//! Authoritative server for a shared, layered block-breaking cube. Every
//! connected player chips away at the same cube; the server owns the cube,
//! every player's points and upgrades, and the leaderboard, and pushes each
//! committed change to all connections.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! Clients only send intents (remove this block, I clicked, buy this
//! upgrade). Costs, multipliers, rewards and the nuke cooldown are all
//! computed here from stored records, so a modified client cannot mint
//! points or skip a price.
//!
//! ### Identity
//! A connection is authenticated once during the WebSocket handshake and
//! stays bound to that identity. Multiple connections for one identity share
//! a single in-memory record.
//!
//! ### Broadcasting
//! Cube changes go to every connection in commit order. User data goes to
//! the owning identity; leaderboard refreshes go to everyone.
//!
//! ## Module Organization
//!
//! - `auth`: token extraction and the `IdentityVerifier` seam
//! - `color`: HSL layer colors kept distinct from recent ones
//! - `config`: server settings and their defaults
//! - `cube`: the two-layer cube and layer promotion
//! - `economy`: purchases, multipliers, point reports and nuke rewards
//! - `game`: the engine tying state, stores and connections together
//! - `leaderboard`: ranking of user records
//! - `network`: WebSocket accept loop and per-connection tasks
//! - `session`: live connections and their bound identities
//! - `store`: user and cube persistence
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::auth::{Claims, StaticTokenVerifier};
//! use server::config::ServerConfig;
//! use server::game::Game;
//! use server::network::Server;
//! use server::store::{MemoryCubeStore, MemoryUserStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let verifier = StaticTokenVerifier::new().with_token("dev", Claims::new("dev-user"));
//!
//!     let game = Arc::new(Game::new(
//!         config.clone(),
//!         Arc::new(verifier),
//!         Arc::new(MemoryUserStore::new()),
//!         Arc::new(MemoryCubeStore::new()),
//!     ));
//!
//!     Server::bind(&config.bind_addr, game).await?.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod color;
pub mod config;
pub mod cube;
pub mod economy;
pub mod error;
pub mod game;
pub mod leaderboard;
pub mod network;
pub mod session;
pub mod store;
pub mod user;
