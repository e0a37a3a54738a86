use super::*;
use crate::conn::ConnectionManager;
use crate::robot::{Channel, RobotPatch};
use crate::transport::TransportConfig;
use chrono::Utc;
use serde_json::json;

fn dispatcher_with_store() -> (Arc<StateStore>, CommandDispatcher) {
    let store = Arc::new(StateStore::new());
    let conn = Arc::new(ConnectionManager::new(
        Arc::clone(&store),
        TransportConfig::default(),
        crate::config::RetryConfig::default(),
        crate::config::SimulationConfig::default(),
    ));
    let dispatcher = CommandDispatcher::new(Arc::clone(&store), conn);
    (store, dispatcher)
}

fn order() -> DeliveryOrder {
    DeliveryOrder {
        store_location: GeoPoint { x: 10.0, y: 20.0 },
        customer_location: GeoPoint { x: 30.5, y: -4.25 },
        drive_tele_mode: Some(2),
    }
}

#[test]
fn delivery_order_encodes_wire_schema() {
    let fields = encode_command(&RobotCommand::StartDelivery(order()));

    assert_eq!(fields["operation_mode"], json!(1));
    assert_eq!(fields["server_cmd_state"], json!(1));
    assert_eq!(fields["store_location"], json!({ "x": 10.0, "y": 20.0 }));
    assert_eq!(fields["customer_location"], json!({ "x": 30.5, "y": -4.25 }));
    assert_eq!(fields["drive_tele_mode"], json!(2));
    assert!(!fields.contains_key("open_lid_cmd"));
}

#[test]
fn optional_fields_are_omitted() {
    let mut o = order();
    o.drive_tele_mode = None;
    let fields = encode_command(&RobotCommand::StartDelivery(o));
    assert!(!fields.contains_key("drive_tele_mode"));
}

#[test]
fn lid_commands_encode_single_field() {
    let open = encode_command(&RobotCommand::OpenLid);
    assert_eq!(open["open_lid_cmd"], json!(1));
    assert_eq!(open.len(), 1);

    let close = encode_command(&RobotCommand::CloseLid);
    assert_eq!(close["open_lid_cmd"], json!(0));
}

#[test]
fn command_round_trips_through_the_decoder() {
    // Symmetry requirement: the structured decode path must yield the
    // original field values of an encoded command.
    let fields = encode_command(&RobotCommand::StartDelivery(order()));
    let bytes = codec::encode(&fields).unwrap();

    let decoded = codec::decode(&bytes, Channel::Status).unwrap();
    assert!(!decoded.partial);
    assert_eq!(decoded.fields, fields);
}

#[test]
fn emergency_stop_round_trips() {
    let fields = encode_command(&RobotCommand::EmergencyStop);
    let bytes = codec::encode(&fields).unwrap();
    let decoded = codec::decode(&bytes, Channel::Status).unwrap();
    assert_eq!(decoded.fields, fields);
}

#[tokio::test]
async fn commands_fail_fast_when_not_connected() {
    let (store, dispatcher) = dispatcher_with_store();
    store.apply_patch("r1", Channel::Battery, &RobotPatch::default(), Utc::now());

    let result = dispatcher.send_command("r1", RobotCommand::OpenLid).await;
    assert!(matches!(result, Err(CommandError::NotConnected)));
}

#[tokio::test]
async fn emergency_stop_bypasses_robot_validation() {
    // Unknown robot, but e-stop must still be attempted; the first gate it
    // hits is the transport, not the business check
    let (_store, dispatcher) = dispatcher_with_store();

    let result = dispatcher
        .send_command("never-seen", RobotCommand::EmergencyStop)
        .await;
    assert!(matches!(result, Err(CommandError::NotConnected)));
}

#[tokio::test]
async fn lid_command_requires_known_robot() {
    let (_store, dispatcher) = dispatcher_with_store();

    let result = dispatcher.send_command("ghost", RobotCommand::OpenLid).await;
    assert!(matches!(result, Err(CommandError::UnknownRobot(id)) if id == "ghost"));
}

#[tokio::test]
async fn delivery_start_refuses_robot_mid_delivery() {
    let (store, dispatcher) = dispatcher_with_store();

    let mut status = RobotPatch::default();
    status.delivery_state = Some(crate::robot::delivery_state::PICKED_UP);
    store.apply_patch("r1", Channel::Status, &status, Utc::now());

    let result = dispatcher
        .send_command("r1", RobotCommand::StartDelivery(order()))
        .await;
    assert!(matches!(result, Err(CommandError::DeliveryInProgress(_))));
}
