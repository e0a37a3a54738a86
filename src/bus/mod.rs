use crate::conn::{ConnectionManager, ConnectionStatus};
use crate::robot::RobotState;
use crate::store::{StateStore, StateUpdate};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

#[cfg(test)]
mod tests;

/// A state subscription: the full snapshot as of subscribe time, delivered
/// synchronously, plus a live receiver of every later merged update.
///
/// Dropping the receiver is the unsubscribe.
pub struct StateSubscription {
    pub initial: HashMap<String, RobotState>,
    pub updates: broadcast::Receiver<StateUpdate>,
}

/// Connectivity counterpart of `StateSubscription`.
pub struct ConnectivitySubscription {
    pub initial: ConnectionStatus,
    pub updates: broadcast::Receiver<ConnectionStatus>,
}

/// Fan-out of state-store changes and connection-status changes to local
/// subscribers. Every delivered update carries a fully-merged record; no
/// subscriber ever observes a partially-applied patch.
pub struct NotificationBus {
    store: Arc<StateStore>,
    conn: Arc<ConnectionManager>,
}

impl NotificationBus {
    pub fn new(store: Arc<StateStore>, conn: Arc<ConnectionManager>) -> Self {
        Self { store, conn }
    }

    /// Subscribe to robot state changes.
    ///
    /// The live receiver is attached before the snapshot is taken, so no
    /// update falls between the two; an update may appear both in the
    /// snapshot and on the receiver, which is harmless because every update
    /// is a full record.
    pub fn subscribe(&self) -> StateSubscription {
        let updates = self.store.subscribe_updates();
        let initial = self.store.snapshot();
        StateSubscription { initial, updates }
    }

    /// Subscribe to transport connectivity changes.
    pub fn subscribe_connectivity(&self) -> ConnectivitySubscription {
        let updates = self.conn.subscribe_status();
        let initial = self.conn.status();
        ConnectivitySubscription { initial, updates }
    }
}
