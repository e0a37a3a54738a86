use crate::bus::{ConnectivitySubscription, NotificationBus, StateSubscription};
use crate::command::{CommandDispatcher, CommandError, RobotCommand};
use crate::config::FleetConfig;
use crate::conn::{ConnectionManager, ConnectionStatus};
use crate::robot::RobotState;
use crate::store::StateStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Explicit context object owning the state store, connection manager,
/// command dispatcher and notification bus.
///
/// Constructed once by the process entry point and passed by reference to
/// all consumers; there is no ambient global.
pub struct FleetContext {
    store: Arc<StateStore>,
    conn: Arc<ConnectionManager>,
    dispatcher: CommandDispatcher,
    bus: NotificationBus,
    shutdown_tx: watch::Sender<bool>,
}

impl FleetContext {
    pub fn new(config: FleetConfig) -> Self {
        let store = Arc::new(StateStore::new());
        for profile in &config.fleet {
            store.register(profile);
        }

        let conn = Arc::new(ConnectionManager::new(
            Arc::clone(&store),
            config.transport,
            config.retry,
            config.simulation,
        ));
        let dispatcher = CommandDispatcher::new(Arc::clone(&store), Arc::clone(&conn));
        let bus = NotificationBus::new(Arc::clone(&store), Arc::clone(&conn));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            store,
            conn,
            dispatcher,
            bus,
            shutdown_tx,
        }
    }

    /// Start the connection state machine in the background.
    pub fn start(&self) -> JoinHandle<()> {
        let conn = Arc::clone(&self.conn);
        let shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(conn.run(shutdown))
    }

    /// Signal all background tasks to stop. Backoff timers and the
    /// simulation tick are cancelled; nothing mutates state afterwards.
    pub fn shutdown(&self) {
        info!("Shutting down fleet context");
        let _ = self.shutdown_tx.send(true);
    }

    /// Immutable copy of all current robot records.
    pub fn snapshot(&self) -> HashMap<String, RobotState> {
        self.store.snapshot()
    }

    /// Current transport connectivity.
    pub fn connectivity_status(&self) -> ConnectionStatus {
        self.conn.status()
    }

    /// Encode and publish a control message to one robot.
    pub async fn send_command(
        &self,
        robot_id: &str,
        command: RobotCommand,
    ) -> Result<(), CommandError> {
        self.dispatcher.send_command(robot_id, command).await
    }

    /// Subscribe to robot state changes (immediate snapshot + live updates).
    pub fn subscribe(&self) -> StateSubscription {
        self.bus.subscribe()
    }

    /// Subscribe to transport connectivity changes.
    pub fn subscribe_connectivity(&self) -> ConnectivitySubscription {
        self.bus.subscribe_connectivity()
    }

    /// Shared handle to the state store (telemetry replay tooling, tests).
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }
}
