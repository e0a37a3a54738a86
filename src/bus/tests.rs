use super::*;
use crate::config::{RetryConfig, SimulationConfig};
use crate::robot::{Channel, RobotPatch};
use crate::transport::TransportConfig;
use chrono::Utc;

fn bus_with_store() -> (Arc<StateStore>, NotificationBus) {
    let store = Arc::new(StateStore::new());
    let conn = Arc::new(ConnectionManager::new(
        Arc::clone(&store),
        TransportConfig::default(),
        RetryConfig::default(),
        SimulationConfig::default(),
    ));
    let bus = NotificationBus::new(Arc::clone(&store), conn);
    (store, bus)
}

fn battery(percent: f64) -> RobotPatch {
    let mut patch = RobotPatch::default();
    patch.battery_percent = Some(percent);
    patch
}

#[tokio::test]
async fn subscribers_get_identical_initial_snapshots() {
    let (store, bus) = bus_with_store();
    store.apply_patch("r1", Channel::Battery, &battery(80.0), Utc::now());
    store.apply_patch("r2", Channel::Battery, &battery(60.0), Utc::now());

    // Both registered before any further message arrives
    let first = bus.subscribe();
    let second = bus.subscribe();

    assert_eq!(first.initial.len(), 2);
    assert_eq!(second.initial.len(), 2);
    assert_eq!(
        first.initial["r1"].battery.percentage,
        second.initial["r1"].battery.percentage
    );
    assert_eq!(
        first.initial["r2"].battery.percentage,
        second.initial["r2"].battery.percentage
    );
}

#[tokio::test]
async fn live_updates_follow_the_snapshot() {
    let (store, bus) = bus_with_store();
    store.apply_patch("r1", Channel::Battery, &battery(80.0), Utc::now());

    let mut sub = bus.subscribe();
    assert_eq!(sub.initial["r1"].battery.percentage, 80.0);

    store.apply_patch(
        "r1",
        Channel::Battery,
        &battery(79.0),
        Utc::now() + chrono::Duration::seconds(1),
    );

    let update = sub.updates.recv().await.unwrap();
    assert_eq!(update.robot_id, "r1");
    assert_eq!(update.state.battery.percentage, 79.0);
}

#[tokio::test]
async fn no_update_is_lost_between_snapshot_and_receiver() {
    let (store, bus) = bus_with_store();

    let mut sub = bus.subscribe();
    assert!(sub.initial.is_empty());

    store.apply_patch("r1", Channel::Battery, &battery(55.0), Utc::now());

    let update = sub.updates.recv().await.unwrap();
    assert_eq!(update.state.battery.percentage, 55.0);
}

#[tokio::test]
async fn connectivity_subscription_reports_current_status() {
    let (_store, bus) = bus_with_store();

    let sub = bus.subscribe_connectivity();
    assert_eq!(sub.initial, crate::conn::ConnectionStatus::Disconnected);
}
