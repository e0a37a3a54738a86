// Canonical robot state model and field normalization

mod normalize;

pub use normalize::{derive_connectivity, normalize, RobotPatch};


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Telemetry channel carried by an inbound message.
///
/// Each channel owns a fixed subset of `RobotState` fields; a patch derived
/// from one channel never touches fields owned by another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Status,
    Battery,
    Gps,
    Speed,
}

impl Channel {
    /// All channels, in subscription order.
    pub const ALL: [Channel; 4] = [
        Channel::Status,
        Channel::Battery,
        Channel::Gps,
        Channel::Speed,
    ];

    /// Wire-level channel name as it appears in topic paths.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Channel::Status => "robot_status",
            Channel::Battery => "battery_status",
            Channel::Gps => "gps",
            Channel::Speed => "speed",
        }
    }

    /// Parse a wire-level channel name.
    pub fn from_wire(name: &str) -> Option<Channel> {
        match name {
            "robot_status" => Some(Channel::Status),
            "battery_status" => Some(Channel::Battery),
            "gps" => Some(Channel::Gps),
            "speed" => Some(Channel::Speed),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Derived connectivity of a single robot.
///
/// Never received directly from the wire; the state store is the sole writer,
/// via `derive_connectivity`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Offline,
    Connecting,
    Online,
    Charging,
    Delivering,
    Maintenance,
    Error,
}

/// Delivery state codes as published by robot firmware.
///
/// Values 1..=3 are the "in progress" range; waiting, completed and cancelled
/// fall outside it and do not mark a robot as delivering.
pub mod delivery_state {
    pub const WAITING: i32 = 0;
    pub const HEADING_TO_STORE: i32 = 1;
    pub const PICKED_UP: i32 = 2;
    pub const HEADING_TO_CUSTOMER: i32 = 3;
    pub const COMPLETED: i32 = 4;
    pub const CANCELLED: i32 = 5;

    /// True for the in-progress range (exclusive of waiting/completed/cancelled).
    pub fn in_progress(code: i32) -> bool {
        (HEADING_TO_STORE..=HEADING_TO_CUSTOMER).contains(&code)
    }
}

/// Battery telemetry block.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Battery {
    /// State of charge, 0–100.
    pub percentage: f64,
    pub voltage_volts: f64,
    pub current_amps: f64,
    pub is_charging: bool,
}

/// Last known position.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_degrees: Option<f64>,
}

/// Static robot capabilities, immutable after registration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub max_speed_mps: f64,
    #[serde(default)]
    pub battery_capacity_wh: f64,
    #[serde(default)]
    pub payload_capacity_kg: f64,
    #[serde(default)]
    pub operating_radius_m: f64,
}

/// Planar coordinate used by command payloads (store/customer locations).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub x: f64,
    pub y: f64,
}

/// Order currently assigned to a robot, if any.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurrentOrder {
    pub order_id: String,
    pub status: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_location: Option<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_location: Option<GeoPoint>,
}

/// Canonical per-robot state record.
///
/// One record exists for every robot identifier ever observed or statically
/// configured; records are created lazily on first reference and never
/// deleted during a process lifetime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RobotState {
    pub id: String,
    pub name: String,
    pub code: String,

    pub connectivity: Connectivity,

    // Integer-coded operational enums; unknown/unset values keep the
    // previous value.
    pub operation_mode: i32,
    pub drive_mode: i32,
    pub delivery_state: i32,
    pub lid_status: i32,
    pub cruise_state: i32,

    pub battery: Battery,
    pub location: Location,
    pub speed_mps: f64,

    pub capabilities: Capabilities,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_order: Option<CurrentOrder>,

    /// Timestamp of the most recent accepted field update.
    pub last_updated: DateTime<Utc>,

    /// Last raw decoded payload per channel (wire name keyed). Diagnostics
    /// only; never consulted for derived fields.
    #[serde(default)]
    pub raw_last_payload: HashMap<String, Value>,
}

impl RobotState {
    /// Bare record for a robot seen on the wire before any registration.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            code: String::new(),
            connectivity: Connectivity::Offline,
            operation_mode: 0,
            drive_mode: 0,
            delivery_state: delivery_state::WAITING,
            lid_status: 0,
            cruise_state: 0,
            battery: Battery::default(),
            location: Location::default(),
            speed_mps: 0.0,
            capabilities: Capabilities::default(),
            current_order: None,
            last_updated: Utc::now(),
            raw_last_payload: HashMap::new(),
        }
    }
}
