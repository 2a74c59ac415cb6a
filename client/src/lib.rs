//! # Cube Breaker Client Library
//!
//! Headless client for the shared cube. It connects over WebSocket with a
//! bearer token, keeps a local mirror of whatever the server pushes, and
//! turns typed commands and auto-clicker ticks into requests.
//!
//! The client never computes points, costs or rewards. A click sends the
//! removed cell and a base point of 1; the server applies the player's
//! multipliers and answers with the authoritative balance.
//!
//! ## Module Organization
//!
//! - `game`: the local mirror of cube, layer counter, user data and
//!   leaderboard, plus random block selection for the auto-clicker
//! - `input`: parsing of typed command lines
//! - `network`: the WebSocket connection and the interactive loop
//! - `error`: client error types
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig {
//!         token: "dev".to_string(),
//!         ..ClientConfig::default()
//!     };
//!
//!     let mut client = Client::connect(&config).await?;
//!
//!     // Initial push: cube state, layer counter, user data
//!     for _ in 0..3 {
//!         client.recv().await?;
//!     }
//!     client.click(None).await?;
//!     println!("{}", client.state().status_line());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod game;
pub mod input;
pub mod network;
