use crate::codec::{self, EncodeError};
use crate::conn::{ConnectionManager, ConnectionStatus};
use crate::robot::{delivery_state, CurrentOrder, GeoPoint};
use crate::store::StateStore;
use crate::transport::topic::{self, CommandDestination, TopicError};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[cfg(test)]
mod tests;

const HEADER_COMMAND_ID: &str = "Fleetlink-Command-Id";

/// Operation mode requested by an outbound command.
mod operation_mode {
    pub const DELIVERY: i64 = 1;
    pub const EMERGENCY_STOP: i64 = 9;
}

/// Server command state values (`server_cmd_state` wire field).
mod server_cmd {
    pub const START: i64 = 1;
    pub const STOP: i64 = 0;
}

/// Lid command values (`open_lid_cmd` wire field).
mod lid_cmd {
    pub const OPEN: i64 = 1;
    pub const CLOSE: i64 = 0;
}

#[derive(Debug, Error)]
pub enum CommandError {
    /// The transport is not connected; commands are never queued, the
    /// caller must retry.
    #[error("transport not connected")]
    NotConnected,
    #[error("unknown robot '{0}'")]
    UnknownRobot(String),
    #[error("robot '{0}' already has a delivery in progress")]
    DeliveryInProgress(String),
    #[error(transparent)]
    Topic(#[from] TopicError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("publish failed: {0}")]
    Publish(anyhow::Error),
}

/// Delivery order parameters (wire schema of the `order` destination).
#[derive(Clone, Debug, PartialEq)]
pub struct DeliveryOrder {
    pub store_location: GeoPoint,
    pub customer_location: GeoPoint,
    /// Tele-operation drive mode override, if any.
    pub drive_tele_mode: Option<i64>,
}

/// Outbound control message kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum RobotCommand {
    StartDelivery(DeliveryOrder),
    EmergencyStop,
    OpenLid,
    CloseLid,
}

impl RobotCommand {
    fn destination(&self) -> CommandDestination {
        match self {
            RobotCommand::StartDelivery(_) => CommandDestination::Order,
            _ => CommandDestination::Command,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            RobotCommand::StartDelivery(_) => "start_delivery",
            RobotCommand::EmergencyStop => "emergency_stop",
            RobotCommand::OpenLid => "open_lid",
            RobotCommand::CloseLid => "close_lid",
        }
    }
}

/// Encodes outbound control messages and publishes them, independent of the
/// inbound flow.
pub struct CommandDispatcher {
    store: Arc<StateStore>,
    conn: Arc<ConnectionManager>,
}

impl CommandDispatcher {
    pub fn new(store: Arc<StateStore>, conn: Arc<ConnectionManager>) -> Self {
        Self { store, conn }
    }

    /// Encode and publish one command with an at-least-once delivery hint.
    ///
    /// Fails with `NotConnected` unless the connection manager is in
    /// `Connected`. Emergency stop bypasses all per-robot validation and is
    /// always attempted regardless of the robot's last known state.
    pub async fn send_command(
        &self,
        robot_id: &str,
        command: RobotCommand,
    ) -> Result<(), CommandError> {
        self.validate(robot_id, &command)?;

        if self.conn.status() != ConnectionStatus::Connected {
            return Err(CommandError::NotConnected);
        }
        let transport = self.conn.transport().ok_or(CommandError::NotConnected)?;

        let destination = topic::command_topic(robot_id, command.destination())?;
        let fields = encode_command(&command);
        let payload = codec::encode(&fields)?;

        let command_id = Uuid::now_v7().to_string();
        let mut headers = async_nats::HeaderMap::new();
        headers.insert(HEADER_COMMAND_ID, command_id.as_str());

        transport
            .publish_command(&destination, headers, payload)
            .await
            .map_err(CommandError::Publish)?;

        if let RobotCommand::StartDelivery(order) = &command {
            self.store.set_current_order(
                robot_id,
                CurrentOrder {
                    order_id: command_id.clone(),
                    status: delivery_state::WAITING,
                    pickup_location: Some(order.store_location),
                    delivery_location: Some(order.customer_location),
                },
            );
        }

        info!(
            robot_id = %robot_id,
            command = command.kind_name(),
            command_id = %command_id,
            topic = %destination,
            "Command published"
        );

        Ok(())
    }

    /// Per-robot business validation. Emergency stop skips everything;
    /// other commands require a known robot, and delivery start additionally
    /// refuses a robot already mid-delivery.
    fn validate(&self, robot_id: &str, command: &RobotCommand) -> Result<(), CommandError> {
        if matches!(command, RobotCommand::EmergencyStop) {
            return Ok(());
        }

        let state = self
            .store
            .get(robot_id)
            .ok_or_else(|| CommandError::UnknownRobot(robot_id.to_string()))?;

        if matches!(command, RobotCommand::StartDelivery(_))
            && delivery_state::in_progress(state.delivery_state)
        {
            return Err(CommandError::DeliveryInProgress(robot_id.to_string()));
        }

        Ok(())
    }
}

/// Build the wire field map for a command.
///
/// The map is encoded with the same binary codec used for inbound decode;
/// decoding the encoded frame yields these fields back unchanged.
pub fn encode_command(command: &RobotCommand) -> Map<String, Value> {
    let mut fields = Map::new();

    match command {
        RobotCommand::StartDelivery(order) => {
            fields.insert("operation_mode".into(), json!(operation_mode::DELIVERY));
            fields.insert("server_cmd_state".into(), json!(server_cmd::START));
            fields.insert(
                "store_location".into(),
                json!({ "x": order.store_location.x, "y": order.store_location.y }),
            );
            fields.insert(
                "customer_location".into(),
                json!({ "x": order.customer_location.x, "y": order.customer_location.y }),
            );
            if let Some(mode) = order.drive_tele_mode {
                fields.insert("drive_tele_mode".into(), json!(mode));
            }
        }
        RobotCommand::EmergencyStop => {
            fields.insert("operation_mode".into(), json!(operation_mode::EMERGENCY_STOP));
            fields.insert("server_cmd_state".into(), json!(server_cmd::STOP));
        }
        RobotCommand::OpenLid => {
            fields.insert("open_lid_cmd".into(), json!(lid_cmd::OPEN));
        }
        RobotCommand::CloseLid => {
            fields.insert("open_lid_cmd".into(), json!(lid_cmd::CLOSE));
        }
    }

    fields
}
