use crate::config::RobotProfile;
use crate::robot::{delivery_state, derive_connectivity, Channel, CurrentOrder, RobotPatch, RobotState};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};


/// Battery percentage below which a merged patch logs a warning.
const LOW_BATTERY_WARN_PCT: f64 = 15.0;

/// Fully-merged state change broadcast to subscribers.
///
/// Carries a clone of the post-merge record, never a partial patch.
#[derive(Clone, Debug)]
pub struct StateUpdate {
    pub robot_id: String,
    pub channel: Channel,
    pub state: RobotState,
    pub at: DateTime<Utc>,
}

/// One stored robot record plus per-channel ordering bookkeeping.
#[derive(Clone, Debug)]
struct RobotRecord {
    state: RobotState,
    /// Timestamp of the last accepted patch per channel; the stale guard
    /// compares against this, so a discard on one channel never blocks
    /// patches from another.
    channel_applied: HashMap<Channel, DateTime<Utc>>,
}

impl RobotRecord {
    fn new(state: RobotState) -> Self {
        Self {
            state,
            channel_applied: HashMap::new(),
        }
    }
}

/// In-memory registry of robot state keyed by robot identifier.
///
/// Records are created lazily on first reference and never deleted during a
/// process lifetime. DashMap entry locking serializes writes per record, so
/// cross-robot patches proceed concurrently while no reader ever observes a
/// record mid-merge. The store is the sole writer of derived connectivity.
pub struct StateStore {
    robots: Arc<DashMap<String, RobotRecord>>,

    /// Broadcast channel for merged state changes
    update_tx: broadcast::Sender<StateUpdate>,

    /// Stale patches discarded by the per-channel ordering guard
    stale_discards: AtomicU64,
}

impl StateStore {
    pub fn new() -> Self {
        let (update_tx, _) = broadcast::channel(1000);

        Self {
            robots: Arc::new(DashMap::new()),
            update_tx,
            stale_discards: AtomicU64::new(0),
        }
    }

    /// Register a statically configured robot with identity and capabilities.
    ///
    /// Identity and capability fields are immutable after registration;
    /// re-registering an already known id is ignored.
    pub fn register(&self, profile: &RobotProfile) {
        let mut created = false;
        self.robots.entry(profile.id.clone()).or_insert_with(|| {
            created = true;
            let mut state = RobotState::new(&profile.id);
            state.name = profile.name.clone();
            state.code = profile.code.clone();
            state.capabilities = profile.capabilities.clone();
            RobotRecord::new(state)
        });

        if created {
            info!(robot_id = %profile.id, name = %profile.name, "Robot registered");
        }
    }

    /// Merge a patch into the stored record for one robot and channel.
    ///
    /// Only fields present in the patch are merged. Returns whether any
    /// field actually changed. A patch whose `observed_at` is older than the
    /// last accepted timestamp for that specific channel is discarded
    /// silently (stale-channel guard).
    pub fn apply_patch(
        &self,
        robot_id: &str,
        channel: Channel,
        patch: &RobotPatch,
        observed_at: DateTime<Utc>,
    ) -> bool {
        // An empty patch never advances the channel watermark: a blob
        // stamped with receive time would otherwise shadow later telemetry
        // carrying older producer timestamps. The raw payload is still kept
        // for diagnostics.
        if patch.is_empty() {
            if let Some(raw) = &patch.raw {
                let mut record = self
                    .robots
                    .entry(robot_id.to_string())
                    .or_insert_with(|| RobotRecord::new(RobotState::new(robot_id)));
                record
                    .state
                    .raw_last_payload
                    .insert(channel.wire_name().to_string(), raw.clone());
            }
            return false;
        }

        let mut record = self
            .robots
            .entry(robot_id.to_string())
            .or_insert_with(|| RobotRecord::new(RobotState::new(robot_id)));

        if let Some(last) = record.channel_applied.get(&channel) {
            if observed_at < *last {
                self.stale_discards.fetch_add(1, Ordering::Relaxed);
                debug!(
                    robot_id = %robot_id,
                    channel = %channel,
                    observed_at = %observed_at,
                    last_applied = %last,
                    "Stale patch discarded"
                );
                return false;
            }
        }
        record.channel_applied.insert(channel, observed_at);

        // Connectivity is derived from the patch plus pre-merge state; the
        // store is its sole writer.
        let connectivity = derive_connectivity(patch, &record.state);

        let mut changed = false;
        merge_fields(&mut record.state, patch, &mut changed);

        // A finished delivery releases the assigned order.
        if matches!(
            patch.delivery_state,
            Some(delivery_state::COMPLETED) | Some(delivery_state::CANCELLED)
        ) && record.state.current_order.take().is_some()
        {
            changed = true;
        }

        if record.state.connectivity != connectivity {
            record.state.connectivity = connectivity;
            changed = true;
        }

        if let Some(raw) = &patch.raw {
            record
                .state
                .raw_last_payload
                .insert(channel.wire_name().to_string(), raw.clone());
        }

        if changed {
            record.state.last_updated = observed_at;

            if let Some(pct) = patch.battery_percent {
                if pct < LOW_BATTERY_WARN_PCT {
                    warn!(robot_id = %robot_id, percentage = pct, "Battery low");
                }
            }

            let update = StateUpdate {
                robot_id: robot_id.to_string(),
                channel,
                state: record.state.clone(),
                at: observed_at,
            };
            drop(record);
            let _ = self.update_tx.send(update);
        }

        changed
    }

    /// Record the order assigned by a successfully dispatched delivery
    /// command. Cleared again when a status patch reports the delivery
    /// completed or cancelled.
    pub fn set_current_order(&self, robot_id: &str, order: CurrentOrder) {
        let mut record = self
            .robots
            .entry(robot_id.to_string())
            .or_insert_with(|| RobotRecord::new(RobotState::new(robot_id)));
        record.state.current_order = Some(order);
    }

    /// Get an owned copy of one robot's state.
    pub fn get(&self, robot_id: &str) -> Option<RobotState> {
        self.robots.get(robot_id).map(|r| r.state.clone())
    }

    /// Owned copies of all current records; consumers cannot mutate the
    /// store through the returned map.
    pub fn snapshot(&self) -> HashMap<String, RobotState> {
        self.robots
            .iter()
            .map(|r| (r.key().clone(), r.value().state.clone()))
            .collect()
    }

    /// Subscribe to merged state changes.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<StateUpdate> {
        self.update_tx.subscribe()
    }

    /// Stale patches discarded so far (operational logging).
    pub fn stale_discard_count(&self) -> u64 {
        self.stale_discards.load(Ordering::Relaxed)
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_fields(state: &mut RobotState, patch: &RobotPatch, changed: &mut bool) {
    set_if_present(&mut state.operation_mode, patch.operation_mode, changed);
    set_if_present(&mut state.drive_mode, patch.drive_mode, changed);
    set_if_present(&mut state.delivery_state, patch.delivery_state, changed);
    set_if_present(&mut state.lid_status, patch.lid_status, changed);
    set_if_present(&mut state.cruise_state, patch.cruise_state, changed);

    set_if_present(&mut state.battery.percentage, patch.battery_percent, changed);
    set_if_present(&mut state.battery.voltage_volts, patch.voltage_volts, changed);
    set_if_present(&mut state.battery.current_amps, patch.current_amps, changed);
    set_if_present(&mut state.battery.is_charging, patch.charging, changed);

    set_if_present(&mut state.location.latitude, patch.latitude, changed);
    set_if_present(&mut state.location.longitude, patch.longitude, changed);
    set_if_present(&mut state.speed_mps, patch.speed_mps, changed);

    set_option_if_present(&mut state.location.accuracy_meters, patch.accuracy_meters, changed);
    set_option_if_present(&mut state.location.heading_degrees, patch.heading_degrees, changed);
}

fn set_if_present<T: PartialEq + Copy>(slot: &mut T, value: Option<T>, changed: &mut bool) {
    if let Some(v) = value {
        if *slot != v {
            *slot = v;
            *changed = true;
        }
    }
}

fn set_option_if_present<T: PartialEq + Copy>(
    slot: &mut Option<T>,
    value: Option<T>,
    changed: &mut bool,
) {
    if let Some(v) = value {
        if *slot != Some(v) {
            *slot = Some(v);
            *changed = true;
        }
    }
}
