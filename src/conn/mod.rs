use crate::codec;
use crate::config::{RetryConfig, SimulationConfig};
use crate::robot::normalize;
use crate::sim;
use crate::store::StateStore;
use crate::transport::{topic, Transport, TransportConfig};
use anyhow::Result;
use chrono::Utc;
use futures::stream::{select_all, StreamExt};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};


/// Transport session state, distinct from per-robot connectivity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Retry budget exhausted; the simulation fallback is feeding the store.
    Simulating,
}

/// Owns the transport session lifecycle: connect, subscribe, retry with
/// exponential backoff, and the switch to simulated data after the retry
/// budget is exhausted.
pub struct ConnectionManager {
    store: Arc<StateStore>,
    transport_config: TransportConfig,
    retry: RetryConfig,
    sim_config: SimulationConfig,

    status_tx: watch::Sender<ConnectionStatus>,
    status_rx: watch::Receiver<ConnectionStatus>,
    status_events: broadcast::Sender<ConnectionStatus>,

    /// Live session shared with the command dispatcher; None whenever the
    /// manager is not in `Connected`.
    transport: RwLock<Option<Transport>>,
}

impl ConnectionManager {
    pub fn new(
        store: Arc<StateStore>,
        transport_config: TransportConfig,
        retry: RetryConfig,
        sim_config: SimulationConfig,
    ) -> Self {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let (status_events, _) = broadcast::channel(64);

        Self {
            store,
            transport_config,
            retry,
            sim_config,
            status_tx,
            status_rx,
            status_events,
            transport: RwLock::new(None),
        }
    }

    /// Current transport session state.
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Subscribe to session state changes.
    pub fn subscribe_status(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.status_events.subscribe()
    }

    /// Clone of the live session, if connected.
    pub fn transport(&self) -> Option<Transport> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_status(&self, status: ConnectionStatus) {
        let changed = self.status_tx.send_replace(status) != status;
        if changed {
            info!(status = ?status, "Connection status changed");
            let _ = self.status_events.send(status);
        }
    }

    fn set_transport(&self, transport: Option<Transport>) {
        *self
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner) = transport;
    }

    /// Run the session state machine until `shutdown` flips to true.
    ///
    /// Disconnected -> Connecting -> Connected; transport error or close
    /// drops back to Disconnected and retries with exponential backoff.
    /// Exhausting the retry budget enters Simulating and starts the
    /// synthetic generator; any later successful connection exits it and
    /// resets the retry counter and delay.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;
        let mut sim_stop: Option<watch::Sender<bool>> = None;
        let mut sim_task: Option<JoinHandle<()>> = None;

        while !*shutdown.borrow() {
            if self.status() != ConnectionStatus::Simulating {
                self.set_status(ConnectionStatus::Connecting);
            }

            match Transport::connect(&self.transport_config).await {
                Ok(transport) => {
                    if let Some(stop) = sim_stop.take() {
                        let _ = stop.send(true);
                    }
                    if let Some(task) = sim_task.take() {
                        let _ = task.await;
                    }
                    attempt = 0;

                    self.set_transport(Some(transport.clone()));
                    self.set_status(ConnectionStatus::Connected);

                    if let Err(e) = self.pump(&transport, &mut shutdown).await {
                        warn!(error = %e, "Transport session ended");
                    }

                    self.set_transport(None);
                    if !*shutdown.borrow() {
                        self.set_status(ConnectionStatus::Disconnected);
                    }
                }
                Err(e) => {
                    attempt += 1;
                    warn!(error = %e, attempt = attempt, "Connect attempt failed");

                    if attempt >= self.retry.max_attempts && sim_stop.is_none() {
                        self.set_status(ConnectionStatus::Simulating);
                        let (stop_tx, stop_rx) = watch::channel(false);
                        sim_task = Some(sim::spawn(
                            Arc::clone(&self.store),
                            self.sim_config.clone(),
                            stop_rx,
                        ));
                        sim_stop = Some(stop_tx);
                    }

                    let delay = if sim_stop.is_some() {
                        Duration::from_millis(self.retry.probe_interval_ms)
                    } else {
                        backoff_delay(self.retry.base_delay_ms, attempt)
                    };

                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        // Teardown: no orphaned timer may keep mutating state.
        if let Some(stop) = sim_stop.take() {
            let _ = stop.send(true);
        }
        if let Some(task) = sim_task.take() {
            let _ = task.await;
        }
        self.set_transport(None);
        self.set_status(ConnectionStatus::Disconnected);
        info!("Connection manager stopped");
    }

    /// Subscribe to all telemetry patterns and pump messages into the store.
    ///
    /// Subscriptions are re-issued in full on every entry to `Connected`;
    /// no durable subscription state is assumed across reconnects.
    async fn pump(&self, transport: &Transport, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        let mut subscribers = Vec::with_capacity(crate::robot::Channel::ALL.len());
        for channel in crate::robot::Channel::ALL {
            let pattern = topic::telemetry_pattern(channel);
            subscribers.push(transport.subscribe(&pattern).await?);
            debug!(pattern = %pattern, "Subscribed");
        }

        let mut messages = select_all(subscribers);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                }
                next = messages.next() => {
                    match next {
                        Some(msg) => ingest(&self.store, msg.subject.as_str(), &msg.payload),
                        None => {
                            warn!("Telemetry subscriptions closed");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

/// Exponential backoff: base delay doubling per failed attempt.
pub(crate) fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

/// Inbound pipeline: subject -> decode -> normalize -> store merge.
///
/// Decode failures are logged and the message skipped; nothing here
/// propagates an error or mutates state on failure.
pub fn ingest(store: &StateStore, subject: &str, payload: &[u8]) {
    let telemetry = match topic::parse_telemetry_subject(subject) {
        Ok(t) => t,
        Err(e) => {
            warn!(subject = %subject, error = %e, "Ignoring message on unrecognized subject");
            return;
        }
    };

    let decoded = match codec::decode(payload, telemetry.channel) {
        Ok(d) => d,
        Err(e) => {
            warn!(
                robot_id = %telemetry.robot_id,
                channel = %telemetry.channel,
                error = %e,
                "Undecodable payload, skipping"
            );
            return;
        }
    };

    let patch = normalize(telemetry.channel, &decoded.fields);
    let observed_at = patch.observed_at.unwrap_or_else(Utc::now);
    let changed = store.apply_patch(&telemetry.robot_id, telemetry.channel, &patch, observed_at);

    trace!(
        robot_id = %telemetry.robot_id,
        channel = %telemetry.channel,
        encoding = ?decoded.encoding,
        partial = decoded.partial,
        changed = changed,
        "Telemetry processed"
    );
}
