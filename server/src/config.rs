//! Runtime configuration shared by the server library and its binary

use crate::error::ServerError;
use shared::{DEFAULT_GRID_SIZE, MAX_GRID_SIZE};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_NUKE_COOLDOWN: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_LEADERBOARD_SIZE: usize = 10;
pub const DEFAULT_COLOR_POOL_SIZE: usize = 10;
pub const DEFAULT_MAX_CLIENTS: usize = 1024;
pub const DEFAULT_MAX_REPORT_POINTS: u64 = 1;
pub const MAX_USERNAME_LEN: usize = 32;

/// Server settings, built from command-line arguments by the binary
/// and from `Default` in tests.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to
    pub bind_addr: String,
    /// Face dimension N for freshly generated layers
    pub grid_size: usize,
    /// Minimum time between two nukes by the same identity
    pub nuke_cooldown: Duration,
    /// Number of entries in a leaderboard broadcast
    pub leaderboard_size: usize,
    /// How many recent layer colors to avoid repeating
    pub color_pool_size: usize,
    /// Maximum concurrent connections
    pub max_clients: usize,
    /// Largest base amount accepted from one `updatePoints` report
    pub max_report_points: u64,
    /// Cube snapshot file; in-memory when unset
    pub snapshot_path: Option<PathBuf>,
    /// User records file; in-memory when unset
    pub users_path: Option<PathBuf>,
    /// Token table for the static verifier
    pub tokens_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4000".to_string(),
            grid_size: DEFAULT_GRID_SIZE,
            nuke_cooldown: DEFAULT_NUKE_COOLDOWN,
            leaderboard_size: DEFAULT_LEADERBOARD_SIZE,
            color_pool_size: DEFAULT_COLOR_POOL_SIZE,
            max_clients: DEFAULT_MAX_CLIENTS,
            max_report_points: DEFAULT_MAX_REPORT_POINTS,
            snapshot_path: None,
            users_path: None,
            tokens_path: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.grid_size == 0 || self.grid_size > MAX_GRID_SIZE {
            return Err(ServerError::Config(format!(
                "grid size must be between 1 and {}, got {}",
                MAX_GRID_SIZE, self.grid_size
            )));
        }
        if self.leaderboard_size == 0 {
            return Err(ServerError::Config(
                "leaderboard size must be at least 1".to_string(),
            ));
        }
        if self.max_clients == 0 {
            return Err(ServerError::Config(
                "max clients must be at least 1".to_string(),
            ));
        }
        if self.max_report_points == 0 {
            return Err(ServerError::Config(
                "max report points must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
