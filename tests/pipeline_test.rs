// End-to-end pipeline tests without a live broker: messages are fed through
// the same ingest path the transport pump uses.

use fleetlink::codec;
use fleetlink::command::{DeliveryOrder, RobotCommand};
use fleetlink::config::{FleetConfig, RobotProfile};
use fleetlink::conn::{self, ConnectionStatus};
use fleetlink::robot::{Capabilities, Connectivity, GeoPoint};
use fleetlink::FleetContext;
use serde_json::json;

fn config_with_fleet() -> FleetConfig {
    FleetConfig {
        fleet: vec![RobotProfile {
            id: "neubie-01".to_string(),
            name: "Neubie One".to_string(),
            code: "NB-001".to_string(),
            capabilities: Capabilities {
                max_speed_mps: 1.5,
                battery_capacity_wh: 480.0,
                payload_capacity_kg: 25.0,
                operating_radius_m: 3000.0,
            },
        }],
        ..FleetConfig::default()
    }
}

#[tokio::test]
async fn telemetry_flows_from_wire_to_subscriber() {
    let context = FleetContext::new(config_with_fleet());

    let mut sub = context.subscribe();
    assert_eq!(sub.initial.len(), 1);
    assert_eq!(sub.initial["neubie-01"].name, "Neubie One");

    let payload =
        serde_json::to_vec(&json!({ "battery_percent": 85, "charging": false })).unwrap();
    conn::ingest(context.store(), "neubie-01.r2s.battery_status", &payload);

    let update = sub.updates.recv().await.unwrap();
    assert_eq!(update.robot_id, "neubie-01");
    assert_eq!(update.state.battery.percentage, 85.0);
    // Identity from registration survives the merge
    assert_eq!(update.state.code, "NB-001");
}

#[tokio::test]
async fn mixed_encodings_reconcile_into_one_record() {
    let context = FleetContext::new(config_with_fleet());
    let store = context.store();

    // JSON battery message
    let battery = serde_json::to_vec(&json!({ "battery_percent": 72 })).unwrap();
    conn::ingest(store, "neubie-01.r2s.battery_status", &battery);

    // Binary status message
    let mut fields = serde_json::Map::new();
    fields.insert("status".to_string(), json!(1));
    fields.insert("delivery_state".to_string(), json!(2));
    let status = codec::encode(&fields).unwrap();
    conn::ingest(store, "neubie-01.r2s.robot_status", &status);

    // Raw text fragment on the gps channel
    conn::ingest(store, "neubie-01.r2s.gps", b"lat:37.5326 lon:126.9882");

    let snapshot = context.snapshot();
    let state = &snapshot["neubie-01"];
    assert_eq!(state.battery.percentage, 72.0);
    assert_eq!(state.delivery_state, 2);
    assert_eq!(state.connectivity, Connectivity::Delivering);
    assert_eq!(state.location.latitude, 37.5326);
    assert_eq!(state.location.longitude, 126.9882);
}

#[tokio::test]
async fn out_of_order_battery_messages_keep_newest() {
    let context = FleetContext::new(FleetConfig::default());
    let store = context.store();

    let first = serde_json::to_vec(&json!({
        "battery_percent": 85, "charging": false, "timestamp": 10_000_i64
    }))
    .unwrap();
    let second = serde_json::to_vec(&json!({
        "battery_percent": 83, "timestamp": 11_000_i64
    }))
    .unwrap();
    let stale = serde_json::to_vec(&json!({
        "battery_percent": 99, "charging": true, "timestamp": 9_000_i64
    }))
    .unwrap();

    conn::ingest(store, "r1.r2s.battery_status", &first);
    conn::ingest(store, "r1.r2s.battery_status", &second);
    conn::ingest(store, "r1.r2s.battery_status", &stale);

    let snapshot = context.snapshot();
    let state = &snapshot["r1"];
    assert_eq!(state.battery.percentage, 83.0);
    assert!(!state.battery.is_charging);
}

#[tokio::test]
async fn garbage_on_one_channel_never_blocks_another() {
    let context = FleetContext::new(FleetConfig::default());
    let store = context.store();

    conn::ingest(store, "r1.r2s.gps", &[0xde, 0xad, 0xbe, 0xef]);
    let speed = serde_json::to_vec(&json!({ "speed": 1.2 })).unwrap();
    conn::ingest(store, "r1.r2s.speed", &speed);

    let snapshot = context.snapshot();
    let state = &snapshot["r1"];
    assert_eq!(state.location.latitude, 0.0);
    assert_eq!(state.speed_mps, 1.2);
}

#[tokio::test]
async fn garbage_blob_does_not_shadow_later_telemetry() {
    let context = FleetContext::new(FleetConfig::default());
    let store = context.store();

    // Undecodable blob, stamped with receive time on arrival
    conn::ingest(store, "r1.r2s.battery_status", &[0xde, 0xad, 0xbe, 0xef]);

    // A valid message whose producer timestamp lags the wall clock (skew
    // plus transit latency) must still be reflected in the snapshot
    let lagged = (chrono::Utc::now() - chrono::Duration::seconds(2)).timestamp_millis();
    let valid =
        serde_json::to_vec(&json!({ "battery_percent": 64, "timestamp": lagged })).unwrap();
    conn::ingest(store, "r1.r2s.battery_status", &valid);

    let snapshot = context.snapshot();
    assert_eq!(snapshot["r1"].battery.percentage, 64.0);
}

#[tokio::test]
async fn commands_are_rejected_until_connected() {
    let context = FleetContext::new(config_with_fleet());
    assert_eq!(context.connectivity_status(), ConnectionStatus::Disconnected);

    let order = RobotCommand::StartDelivery(DeliveryOrder {
        store_location: GeoPoint { x: 1.0, y: 2.0 },
        customer_location: GeoPoint { x: 3.0, y: 4.0 },
        drive_tele_mode: None,
    });

    let result = context.send_command("neubie-01", order).await;
    assert!(result.is_err(), "command must not be queued while offline");

    // Emergency stop is attempted for robots the store has never seen
    let result = context.send_command("unknown", RobotCommand::EmergencyStop).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn connectivity_subscription_sees_initial_state() {
    let context = FleetContext::new(FleetConfig::default());

    let sub = context.subscribe_connectivity();
    assert_eq!(sub.initial, ConnectionStatus::Disconnected);
}
