//! Authoritative game engine
//!
//! `Game` owns the single cube, the session registry and the store handles.
//! Every client request funnels through [`Game::handle_message`], which
//! validates it against server-side state, commits it to the stores, and
//! fans the result out.
//!
//! Mutations are computed on a copy and only committed once the store has
//! accepted them, so a failed write never leaves memory and storage apart.
//! Store calls run on the blocking pool. Lock order is always user record,
//! then cube.

use crate::auth::{Claims, IdentityVerifier};
use crate::color::ColorAllocator;
use crate::config::{ServerConfig, MAX_USERNAME_LEN};
use crate::cube::{CubeState, Removal};
use crate::economy::{self, NukeDenied, Purchase};
use crate::error::{AuthError, GameError, StoreError};
use crate::session::{ConnectionId, Outbox, SessionRegistry, SharedRecord};
use crate::store::{CubeStore, UserStore};
use crate::user::UserRecord;
use log::{debug, error, info, warn};
use shared::{encode, ClientMessage, CubeSnapshot, Face, ServerMessage};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Cube state plus the allocator that colors its fresh layers. Both are
/// replaced together once a write succeeds.
struct CubeEngine {
    state: CubeState,
    colors: ColorAllocator,
}

/// Result of a nuke request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nuke {
    Denied(NukeDenied),
    Detonated { destroyed: usize, reward: u64, current_layer: u64 },
}

pub struct Game {
    config: ServerConfig,
    cube: Mutex<CubeEngine>,
    registry: parking_lot::Mutex<SessionRegistry>,
    users: Arc<dyn UserStore>,
    cubes: Arc<dyn CubeStore>,
    verifier: Arc<dyn IdentityVerifier>,
}

impl Game {
    /// Loads the persisted cube, regenerating it if it is missing or invalid.
    pub fn new(
        config: ServerConfig,
        verifier: Arc<dyn IdentityVerifier>,
        users: Arc<dyn UserStore>,
        cubes: Arc<dyn CubeStore>,
    ) -> Self {
        let mut colors = ColorAllocator::new(config.color_pool_size);

        let (stored, writable) = match cubes.load() {
            Ok(stored) => (stored, true),
            Err(e) if e.is_corrupt() => {
                warn!("Cube snapshot is unreadable, regenerating: {}", e);
                (None, true)
            }
            Err(e) => {
                error!("Failed to read cube snapshot, leaving it in place: {}", e);
                (None, false)
            }
        };
        let (state, regenerated) = CubeState::recover(stored, config.grid_size, &mut colors);

        if regenerated && writable {
            if let Err(e) = cubes.save(&state.snapshot()) {
                error!("Failed to persist regenerated cube: {}", e);
            }
        }

        Self {
            registry: parking_lot::Mutex::new(SessionRegistry::new(config.max_clients)),
            cube: Mutex::new(CubeEngine { state, colors }),
            config,
            users,
            cubes,
            verifier,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn authenticate(&self, token: Option<&str>) -> Result<Claims, AuthError> {
        let token = token.ok_or(AuthError::MissingToken)?;
        self.verifier.verify(token)
    }

    pub fn is_full(&self) -> bool {
        self.registry.lock().is_full()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Binds a verified identity to a new connection and pushes the
    /// initial cube state, layer counter and user data to it.
    pub async fn join(&self, claims: Claims, outbox: Outbox) -> Result<ConnectionId, GameError> {
        // Loaded under the registry lock so a record is never loaded twice
        // for one identity; only a first sighting touches the disk.
        let users = Arc::clone(&self.users);
        let (id, record) = self
            .registry
            .lock()
            .register(&claims.sub, outbox, |user_id| users.load_or_create(user_id))?;

        self.backfill_username(&record, &claims).await;

        let (snapshot, current_layer) = {
            let cube = self.cube.lock().await;
            (cube.state.snapshot(), cube.state.current_layer())
        };
        self.send(id, &ServerMessage::CubeStateUpdate(snapshot));
        self.send(id, &ServerMessage::CurrentLayer(current_layer));

        let user_data = record.lock().await.user_data();
        self.send(id, &ServerMessage::UserData(user_data));

        Ok(id)
    }

    async fn backfill_username(&self, record: &SharedRecord, claims: &Claims) {
        let mut user = record.lock().await;
        if user.has_username() {
            return;
        }

        let mut next = user.clone();
        next.username = Some(claims.display_name());
        match self.save_user(&next).await {
            Ok(()) => {
                debug!("Set username for {} to {:?}", next.id, next.username);
                *user = next;
            }
            Err(e) => error!("Failed to back-fill username for {}: {}", user.id, e),
        }
    }

    pub fn disconnect(&self, id: ConnectionId) {
        self.registry.lock().remove(id);
    }

    /// Dispatches one request in the context of the connection's identity.
    pub async fn handle_message(
        &self,
        id: ConnectionId,
        message: ClientMessage,
    ) -> Result<(), GameError> {
        match message {
            ClientMessage::RemoveBlock { face, row, col } => {
                self.remove_block(face, row, col).await?;
            }
            ClientMessage::UpdatePoints { points } => {
                self.update_points(id, points).await?;
            }
            ClientMessage::PurchaseUpgrade { upgrade } => {
                self.purchase_upgrade(id, &upgrade).await?;
            }
            ClientMessage::NukeLayer => {
                self.nuke_layer(id).await?;
            }
            ClientMessage::RequestLeaderboard => self.request_leaderboard(id)?,
            ClientMessage::UpdateUsername(name) => {
                self.update_username(id, &name).await?;
            }
        }
        Ok(())
    }

    /// Removes one block from the active layer. Empty or out-of-range cells
    /// are a silent no-op with no broadcast.
    pub async fn remove_block(
        &self,
        face: Face,
        row: usize,
        col: usize,
    ) -> Result<Removal, GameError> {
        let mut cube = self.cube.lock().await;
        let engine = &mut *cube;
        if !engine.state.is_present(face, row, col) {
            return Ok(Removal::Ignored);
        }

        let mut next = engine.state.clone();
        let mut colors = engine.colors.clone();
        let outcome = next.remove_block(face, row, col, &mut colors);
        let snapshot = next.snapshot();
        self.save_cube(&snapshot).await?;
        engine.state = next;
        engine.colors = colors;

        // Broadcast under the cube lock so clients see updates in commit order.
        self.broadcast(&ServerMessage::CubeStateUpdate(snapshot));
        Ok(outcome)
    }

    /// Credits a manual or auto-click report. The reported amount is a base
    /// value; multipliers come from the stored entitlements.
    pub async fn update_points(&self, id: ConnectionId, base: u64) -> Result<Option<u64>, GameError> {
        let record = self.record(id)?;
        let mut user = record.lock().await;

        let mut next = user.clone();
        let Some(credited) = economy::earn(&mut next, base, self.config.max_report_points) else {
            self.send(id, &ServerMessage::UserData(user.user_data()));
            return Ok(None);
        };

        self.save_user(&next).await?;
        *user = next;
        let user_data = user.user_data();
        drop(user);

        self.send_to_identity(id, &ServerMessage::UserData(user_data));
        self.broadcast_leaderboard();
        Ok(Some(credited))
    }

    pub async fn purchase_upgrade(&self, id: ConnectionId, upgrade: &str) -> Result<Purchase, GameError> {
        let record = self.record(id)?;
        let mut user = record.lock().await;

        let mut next = user.clone();
        let outcome = economy::purchase(&mut next, upgrade);
        if let Purchase::Bought(bought) = outcome {
            self.save_user(&next).await?;
            *user = next;
            info!("User {} bought {}", user.id, bought);
        } else {
            debug!("Purchase by {} refused: {:?}", user.id, outcome);
        }

        let user_data = user.user_data();
        drop(user);

        if matches!(outcome, Purchase::Bought(_)) {
            self.send_to_identity(id, &ServerMessage::UserData(user_data));
            self.broadcast_leaderboard();
        } else {
            self.send(id, &ServerMessage::UserData(user_data));
        }
        Ok(outcome)
    }

    /// Clears the active layer for the caller's reward, then promotes.
    pub async fn nuke_layer(&self, id: ConnectionId) -> Result<Nuke, GameError> {
        let record = self.record(id)?;
        let mut user = record.lock().await;

        let now = economy::now_millis();
        if let Err(denied) = economy::check_nuke(&user, now, self.config.nuke_cooldown) {
            debug!("Nuke by {} refused: {:?}", user.id, denied);
            self.send(id, &ServerMessage::UserData(user.user_data()));
            return Ok(Nuke::Denied(denied));
        }

        let mut cube = self.cube.lock().await;
        let engine = &mut *cube;

        let mut next_cube = engine.state.clone();
        let mut colors = engine.colors.clone();
        let destroyed = next_cube.nuke(&mut colors);
        let mut next_user = user.clone();
        let reward = economy::credit_nuke(&mut next_user, destroyed, now);

        let snapshot = next_cube.snapshot();
        self.save_cube(&snapshot).await?;
        if let Err(e) = self.save_user(&next_user).await {
            if let Err(rollback) = self.save_cube(&engine.state.snapshot()).await {
                error!("Failed to roll back cube after nuke: {}", rollback);
            }
            return Err(e);
        }

        engine.state = next_cube;
        engine.colors = colors;
        *user = next_user;
        let current_layer = engine.state.current_layer();
        info!(
            "User {} nuked {} blocks for {} points, now on layer {}",
            user.id, destroyed, reward, current_layer
        );

        self.broadcast(&ServerMessage::CubeStateUpdate(snapshot));
        drop(cube);

        let user_data = user.user_data();
        drop(user);
        self.send_to_identity(id, &ServerMessage::UserData(user_data));
        self.broadcast_leaderboard();

        Ok(Nuke::Detonated {
            destroyed,
            reward,
            current_layer,
        })
    }

    pub fn request_leaderboard(&self, id: ConnectionId) -> Result<(), GameError> {
        let entries = self.users.top(self.config.leaderboard_size)?;
        self.send(id, &ServerMessage::LeaderboardUpdate(entries));
        Ok(())
    }

    /// Best-effort display name change. Blank or overlong names are ignored.
    pub async fn update_username(&self, id: ConnectionId, name: &str) -> Result<bool, GameError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_USERNAME_LEN {
            debug!("Ignoring username update from connection {}", id);
            return Ok(false);
        }

        let record = self.record(id)?;
        let mut user = record.lock().await;
        if user.username.as_deref() == Some(name) {
            return Ok(false);
        }

        let mut next = user.clone();
        next.username = Some(name.to_string());
        self.save_user(&next).await?;
        *user = next;
        Ok(true)
    }

    /// Current cube as clients would see it.
    pub async fn snapshot(&self) -> CubeSnapshot {
        self.cube.lock().await.state.snapshot()
    }

    /// Sends a transient failure notice to one connection.
    pub fn report_error(&self, id: ConnectionId, err: &GameError) {
        self.send(
            id,
            &ServerMessage::Error {
                reason: err.to_string(),
            },
        );
    }

    async fn save_user(&self, record: &UserRecord) -> Result<(), GameError> {
        let users = Arc::clone(&self.users);
        let record = record.clone();
        blocking(move || users.save(&record)).await
    }

    async fn save_cube(&self, snapshot: &CubeSnapshot) -> Result<(), GameError> {
        let cubes = Arc::clone(&self.cubes);
        let snapshot = snapshot.clone();
        blocking(move || cubes.save(&snapshot)).await
    }

    fn record(&self, id: ConnectionId) -> Result<SharedRecord, GameError> {
        self.registry
            .lock()
            .record(id)
            .ok_or(GameError::UnknownConnection(id))
    }

    fn frame(message: &ServerMessage) -> Option<Arc<str>> {
        match encode(message) {
            Ok(text) => Some(Arc::from(text)),
            Err(e) => {
                error!("Failed to encode server message: {}", e);
                None
            }
        }
    }

    fn send(&self, id: ConnectionId, message: &ServerMessage) {
        if let Some(frame) = Self::frame(message) {
            self.registry.lock().send(id, frame);
        }
    }

    /// Sends to every connection of the identity bound to `id`, so all of a
    /// user's open clients see the same balance.
    fn send_to_identity(&self, id: ConnectionId, message: &ServerMessage) {
        let Some(frame) = Self::frame(message) else {
            return;
        };
        let registry = self.registry.lock();
        match registry.user_id(id) {
            Some(user_id) => {
                registry.send_to_user(user_id, frame);
            }
            None => {
                registry.send(id, frame);
            }
        }
    }

    fn broadcast(&self, message: &ServerMessage) {
        if let Some(frame) = Self::frame(message) {
            let delivered = self.registry.lock().broadcast(frame);
            debug!("Broadcast delivered to {} connections", delivered);
        }
    }

    /// Recomputes the leaderboard and pushes it to everyone. A store failure
    /// here only delays the refresh.
    fn broadcast_leaderboard(&self) {
        match self.users.top(self.config.leaderboard_size) {
            Ok(entries) => self.broadcast(&ServerMessage::LeaderboardUpdate(entries)),
            Err(e) => warn!("Skipping leaderboard refresh: {}", e),
        }
    }
}

/// Runs a store call on the blocking pool so file writes never stall the
/// async workers.
async fn blocking<T, F>(call: F) -> Result<T, GameError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?;
    Ok(result?)
}
