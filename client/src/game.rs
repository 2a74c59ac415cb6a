use log::debug;
use rand::seq::IteratorRandom;
use rand::Rng;
use shared::{
    fastest_auto_click, CubeSnapshot, Face, Layer, LeaderboardEntry, ServerMessage, Upgrade,
    UserData,
};
use std::time::Duration;

/// Local mirror of everything the server has pushed to this client.
///
/// The server is authoritative: every push replaces the matching part of
/// the mirror. Local removals are only a prediction so that the
/// auto-clicker does not pick the same cell twice before the next update.
#[derive(Debug, Clone, Default)]
pub struct ClientGameState {
    pub cube: Option<CubeSnapshot>,
    pub current_layer: u64,
    pub user: UserData,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub last_error: Option<String>,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::CubeStateUpdate(snapshot) => {
                self.current_layer = snapshot.current_layer;
                self.cube = Some(snapshot);
            }
            ServerMessage::CurrentLayer(layer) => self.current_layer = layer,
            ServerMessage::UserData(user) => self.user = user,
            ServerMessage::LeaderboardUpdate(entries) => self.leaderboard = entries,
            ServerMessage::Error { reason } => {
                debug!("Server reported an error: {}", reason);
                self.last_error = Some(reason);
            }
        }
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.cube.as_ref().and_then(CubeSnapshot::active)
    }

    pub fn remaining_blocks(&self) -> usize {
        self.active_layer().map_or(0, Layer::remaining_blocks)
    }

    pub fn is_present(&self, face: Face, row: usize, col: usize) -> bool {
        self.active_layer()
            .and_then(|layer| layer.face(face).get(row, col))
            .unwrap_or(false)
    }

    /// Picks a uniformly random block that is still present on the active
    /// layer.
    pub fn random_block<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(Face, usize, usize)> {
        let layer = self.active_layer()?;
        layer
            .faces()
            .flat_map(|(face, grid)| grid.present_cells().map(move |(row, col)| (face, row, col)))
            .choose(rng)
    }

    /// Marks a block as removed ahead of the server's confirmation.
    pub fn predict_removal(&mut self, face: Face, row: usize, col: usize) -> bool {
        self.cube
            .as_mut()
            .and_then(|cube| cube.layers.first_mut())
            .map_or(false, |layer| layer.face_mut(face).clear_cell(row, col))
    }

    pub fn owns(&self, upgrade: Upgrade) -> bool {
        self.user.owned_upgrades.contains(&upgrade)
    }

    /// Cadence of the fastest owned auto-clicker tier.
    pub fn auto_click_interval(&self) -> Option<Duration> {
        fastest_auto_click(&self.user.owned_upgrades)
    }

    pub fn status_line(&self) -> String {
        let upgrades = if self.user.owned_upgrades.is_empty() {
            "none".to_string()
        } else {
            self.user
                .owned_upgrades
                .iter()
                .map(|upgrade| upgrade.id())
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "layer {} | {} blocks left | {} points | upgrades: {}",
            self.current_layer,
            self.remaining_blocks(),
            self.user.points,
            upgrades
        )
    }

    /// Upgrade catalog with the local view of what is owned and affordable.
    pub fn shop_lines(&self) -> Vec<String> {
        Upgrade::ALL
            .into_iter()
            .map(|upgrade| {
                let marker = if self.owns(upgrade) {
                    "owned"
                } else if self.user.points >= upgrade.cost() {
                    "buy"
                } else {
                    "-"
                };
                format!(
                    "{:<18} {:>10}  {:<22} {}",
                    upgrade.id(),
                    upgrade.cost(),
                    upgrade.display_name(),
                    marker
                )
            })
            .collect()
    }

    pub fn leaderboard_lines(&self) -> Vec<String> {
        self.leaderboard
            .iter()
            .enumerate()
            .map(|(rank, entry)| {
                format!(
                    "{:>2}. {:<24} {}",
                    rank + 1,
                    entry.username.as_deref().unwrap_or("Anonymous"),
                    entry.points
                )
            })
            .collect()
    }
}
