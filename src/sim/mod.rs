use crate::robot::{Channel, Connectivity, RobotPatch};
use crate::store::StateStore;
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};


/// Simulation fallback configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Battery percentage drained per tick while delivering.
    #[serde(default = "default_drain_pct")]
    pub battery_drain_pct: f64,
    /// Battery percentage gained per tick while charging.
    #[serde(default = "default_charge_pct")]
    pub battery_charge_pct: f64,
    /// Max absolute lat/lon jitter per tick while delivering, in degrees.
    #[serde(default = "default_jitter_deg")]
    pub location_jitter_deg: f64,
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_drain_pct() -> f64 {
    0.2
}

fn default_charge_pct() -> f64 {
    0.5
}

fn default_jitter_deg() -> f64 {
    0.0001
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            battery_drain_pct: default_drain_pct(),
            battery_charge_pct: default_charge_pct(),
            location_jitter_deg: default_jitter_deg(),
        }
    }
}

/// Spawn the synthetic data generator.
///
/// Runs until `stop` flips to true; each tick perturbs the last known state
/// of every robot through the normal patch path, so downstream consumers
/// keep receiving plausible, fully-merged updates while the live transport
/// is unreachable. The task mutates nothing after cancellation.
pub fn spawn(
    store: Arc<StateStore>,
    config: SimulationConfig,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            tick_interval_ms = config.tick_interval_ms,
            "Simulation fallback started"
        );

        let mut timer = interval(Duration::from_millis(config.tick_interval_ms));
        // First tick of tokio's interval fires immediately; skip it so the
        // first perturbation lands one full interval after activation.
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => tick(&store, &config),
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Simulation fallback stopped");
    })
}

/// Apply one round of perturbations to every robot.
fn tick(store: &StateStore, config: &SimulationConfig) {
    let now = Utc::now();
    let mut rng = rand::thread_rng();

    for (robot_id, state) in store.snapshot() {
        match state.connectivity {
            Connectivity::Delivering => {
                let mut battery = RobotPatch::default();
                battery.battery_percent =
                    Some((state.battery.percentage - config.battery_drain_pct).max(0.0));
                store.apply_patch(&robot_id, Channel::Battery, &battery, now);

                let jitter = config.location_jitter_deg;
                let mut gps = RobotPatch::default();
                gps.latitude = Some(state.location.latitude + rng.gen_range(-jitter..=jitter));
                gps.longitude = Some(state.location.longitude + rng.gen_range(-jitter..=jitter));
                store.apply_patch(&robot_id, Channel::Gps, &gps, now);
            }
            Connectivity::Charging => {
                let mut battery = RobotPatch::default();
                battery.battery_percent =
                    Some((state.battery.percentage + config.battery_charge_pct).min(100.0));
                store.apply_patch(&robot_id, Channel::Battery, &battery, now);
            }
            _ => {}
        }
    }

    debug!("Simulation tick applied");
}
