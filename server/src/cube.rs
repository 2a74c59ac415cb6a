//! The shared cube: an active layer, a queued layer and the layer counter
//!
//! Only the active layer is ever mutated. When it runs out of blocks the
//! queued layer takes its place, a fresh layer is queued behind it and the
//! counter advances, all inside the same `&mut self` call so no observer can
//! see a completed active layer that has not been promoted.

use crate::color::{ColorAllocator, Hsl};
use log::{debug, info, warn};
use shared::{CubeSnapshot, Face, Layer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidSnapshot {
    #[error("expected two layers, found {0}")]
    LayerCount(usize),

    #[error("layer {layer} has grid size {found:?}, expected {expected}")]
    GridSize {
        layer: usize,
        found: Option<usize>,
        expected: usize,
    },

    #[error("layer counter must start at 1")]
    Counter,

    #[error("layer {layer} has unusable color {color:?}")]
    Color { layer: usize, color: String },

    #[error("active layer is already complete")]
    CompletedActiveLayer,
}

/// Result of a block removal request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Cell was already empty or out of range; nothing changed
    Ignored,
    /// Block removed, layer still has blocks left
    Removed,
    /// Block removed and it was the last one; the cube advanced
    Promoted { current_layer: u64 },
}

impl Removal {
    pub fn changed(&self) -> bool {
        !matches!(self, Removal::Ignored)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CubeState {
    layers: [Layer; 2],
    current_layer: u64,
    grid_size: usize,
}

impl CubeState {
    /// Two fresh layers, counter at 1.
    pub fn new(grid_size: usize, colors: &mut ColorAllocator) -> Self {
        Self {
            layers: [
                Layer::new(grid_size, colors.next_color()),
                Layer::new(grid_size, colors.next_color()),
            ],
            current_layer: 1,
            grid_size,
        }
    }

    /// Rebuilds state from a persisted snapshot, rejecting anything that
    /// does not match the configured grid.
    pub fn restore(snapshot: CubeSnapshot, grid_size: usize) -> Result<Self, InvalidSnapshot> {
        if snapshot.current_layer == 0 {
            return Err(InvalidSnapshot::Counter);
        }

        for (index, layer) in snapshot.layers.iter().enumerate() {
            let found = layer.grid_size();
            if found != Some(grid_size) {
                return Err(InvalidSnapshot::GridSize {
                    layer: index,
                    found,
                    expected: grid_size,
                });
            }
            if Hsl::parse(&layer.color).is_none() {
                return Err(InvalidSnapshot::Color {
                    layer: index,
                    color: layer.color.clone(),
                });
            }
        }

        let count = snapshot.layers.len();
        let layers: [Layer; 2] = snapshot
            .layers
            .try_into()
            .map_err(|_| InvalidSnapshot::LayerCount(count))?;

        // A complete active layer would never be promoted by a removal.
        if layers[0].is_complete() {
            return Err(InvalidSnapshot::CompletedActiveLayer);
        }

        Ok(Self {
            layers,
            current_layer: snapshot.current_layer,
            grid_size,
        })
    }

    /// Boot-time recovery: use the snapshot when it is valid, otherwise
    /// regenerate. Returns the state and whether it had to be regenerated.
    pub fn recover(
        snapshot: Option<CubeSnapshot>,
        grid_size: usize,
        colors: &mut ColorAllocator,
    ) -> (Self, bool) {
        let Some(snapshot) = snapshot else {
            info!("No cube snapshot found, creating a fresh cube");
            return (Self::new(grid_size, colors), true);
        };

        let stored_counter = snapshot.current_layer;
        match Self::restore(snapshot, grid_size) {
            Ok(state) => {
                for layer in &state.layers {
                    colors.remember(&layer.color);
                }
                info!(
                    "Restored cube at layer {} ({} blocks left)",
                    state.current_layer,
                    state.active().remaining_blocks()
                );
                (state, false)
            }
            Err(e) => {
                warn!("Discarding invalid cube snapshot: {}", e);
                let mut state = Self::new(grid_size, colors);
                state.current_layer = stored_counter.max(1);
                (state, true)
            }
        }
    }

    pub fn active(&self) -> &Layer {
        &self.layers[0]
    }

    pub fn queued(&self) -> &Layer {
        &self.layers[1]
    }

    pub fn current_layer(&self) -> u64 {
        self.current_layer
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    /// True if a removal at this cell would change anything.
    pub fn is_present(&self, face: Face, row: usize, col: usize) -> bool {
        self.active().face(face).get(row, col).unwrap_or(false)
    }

    /// Removes one block from the active layer, promoting if it was the last.
    pub fn remove_block(
        &mut self,
        face: Face,
        row: usize,
        col: usize,
        colors: &mut ColorAllocator,
    ) -> Removal {
        if !self.layers[0].face_mut(face).clear_cell(row, col) {
            debug!("Ignoring removal of empty cell {}[{}][{}]", face, row, col);
            return Removal::Ignored;
        }

        if self.layers[0].is_complete() {
            self.promote(colors);
            Removal::Promoted {
                current_layer: self.current_layer,
            }
        } else {
            Removal::Removed
        }
    }

    /// Clears the whole active layer and promotes. Returns how many blocks
    /// were destroyed.
    pub fn nuke(&mut self, colors: &mut ColorAllocator) -> usize {
        let destroyed = self.layers[0].remaining_blocks();
        self.layers[0].clear();
        self.promote(colors);
        destroyed
    }

    fn promote(&mut self, colors: &mut ColorAllocator) {
        let fresh = Layer::new(self.grid_size, colors.next_color());
        self.layers.swap(0, 1);
        self.layers[1] = fresh;
        self.current_layer += 1;
        info!("Layer complete, cube advanced to layer {}", self.current_layer);
    }

    pub fn snapshot(&self) -> CubeSnapshot {
        CubeSnapshot {
            layers: self.layers.to_vec(),
            current_layer: self.current_layer,
        }
    }
}
