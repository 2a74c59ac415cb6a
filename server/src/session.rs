//! Live connections and the identity each one is bound to
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Connection lifecycle (register on a verified handshake, remove on close)
//! - Binding every connection to one verified identity for its lifetime
//! - Sharing one record per identity across that identity's connections
//! - Outbound fan-out through per-connection queues
//!
//! Records are shared through an async mutex so that requests from the same
//! identity serialize, even across several open connections, while
//! different identities never contend.

use crate::error::{GameError, StoreError};
use crate::user::UserRecord;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};

pub type ConnectionId = u64;

/// Encoded frames queued for one connection's writer task
pub type Outbox = mpsc::UnboundedSender<Arc<str>>;

pub type SharedRecord = Arc<Mutex<UserRecord>>;

/// A registered connection
#[derive(Debug)]
pub struct Session {
    /// Unique connection identifier assigned by the registry
    pub id: ConnectionId,
    /// Verified identity this connection acts for
    pub user_id: String,
    pub connected_at: Instant,
    outbox: Outbox,
}

struct BoundRecord {
    record: SharedRecord,
    connections: usize,
}

/// Tracks every live connection and the shared records behind them.
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, Session>,
    records: HashMap<String, BoundRecord>,
    next_connection_id: ConnectionId,
    max_clients: usize,
}

impl SessionRegistry {
    pub fn new(max_clients: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            records: HashMap::new(),
            next_connection_id: 1,
            max_clients,
        }
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.max_clients
    }

    /// Binds a new connection to `user_id`.
    ///
    /// The identity's record is shared with its other live connections if
    /// there are any, otherwise it is fetched through `load`.
    pub fn register<F>(
        &mut self,
        user_id: &str,
        outbox: Outbox,
        load: F,
    ) -> Result<(ConnectionId, SharedRecord), GameError>
    where
        F: FnOnce(&str) -> Result<UserRecord, StoreError>,
    {
        if self.is_full() {
            return Err(GameError::ServerFull);
        }

        let record = match self.records.get_mut(user_id) {
            Some(bound) => {
                bound.connections += 1;
                Arc::clone(&bound.record)
            }
            None => {
                let record = Arc::new(Mutex::new(load(user_id)?));
                self.records.insert(
                    user_id.to_string(),
                    BoundRecord {
                        record: Arc::clone(&record),
                        connections: 1,
                    },
                );
                record
            }
        };

        let id = self.next_connection_id;
        self.next_connection_id += 1;

        self.sessions.insert(
            id,
            Session {
                id,
                user_id: user_id.to_string(),
                connected_at: Instant::now(),
                outbox,
            },
        );
        info!("Connection {} bound to user {}", id, user_id);

        Ok((id, record))
    }

    /// Drops a connection, releasing the identity's record with its last
    /// connection.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;

        if let Some(bound) = self.records.get_mut(&session.user_id) {
            bound.connections -= 1;
            if bound.connections == 0 {
                self.records.remove(&session.user_id);
                debug!("Released record for user {}", session.user_id);
            }
        }

        info!(
            "Connection {} ({}) closed after {:?}",
            id,
            session.user_id,
            session.connected_at.elapsed()
        );
        Some(session)
    }

    pub fn record(&self, id: ConnectionId) -> Option<SharedRecord> {
        let session = self.sessions.get(&id)?;
        self.records
            .get(&session.user_id)
            .map(|bound| Arc::clone(&bound.record))
    }

    pub fn user_id(&self, id: ConnectionId) -> Option<&str> {
        self.sessions.get(&id).map(|session| session.user_id.as_str())
    }

    /// Queues a frame for one connection. Returns false if it is gone.
    pub fn send(&self, id: ConnectionId, frame: Arc<str>) -> bool {
        match self.sessions.get(&id) {
            Some(session) => session.outbox.send(frame).is_ok(),
            None => false,
        }
    }

    /// Queues a frame for every connection bound to `user_id`.
    pub fn send_to_user(&self, user_id: &str, frame: Arc<str>) -> usize {
        self.sessions
            .values()
            .filter(|session| session.user_id == user_id)
            .filter(|session| session.outbox.send(Arc::clone(&frame)).is_ok())
            .count()
    }

    /// Queues a frame for every connection without waiting on any of them.
    /// Returns how many queues accepted it.
    pub fn broadcast(&self, frame: Arc<str>) -> usize {
        self.sessions
            .values()
            .filter(|session| session.outbox.send(Arc::clone(&frame)).is_ok())
            .count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of distinct identities currently connected
    pub fn identities(&self) -> usize {
        self.records.len()
    }
}
