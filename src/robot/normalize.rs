use super::{delivery_state, Channel, Connectivity, RobotState};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Partial set of field updates derived from one decoded message.
///
/// Only the fields the originating channel owns are ever set; everything
/// else stays `None` and leaves the stored record unchanged.
#[derive(Clone, Debug, Default)]
pub struct RobotPatch {
    /// Explicit online flag from the status channel (`status: 0|1`).
    pub online: Option<bool>,

    pub operation_mode: Option<i32>,
    pub drive_mode: Option<i32>,
    pub delivery_state: Option<i32>,
    pub lid_status: Option<i32>,
    pub cruise_state: Option<i32>,

    pub battery_percent: Option<f64>,
    pub voltage_volts: Option<f64>,
    pub current_amps: Option<f64>,
    pub charging: Option<bool>,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy_meters: Option<f64>,

    pub speed_mps: Option<f64>,
    pub heading_degrees: Option<f64>,

    /// Producer timestamp extracted from the payload, when present.
    pub observed_at: Option<DateTime<Utc>>,

    /// The raw decoded field map, retained per channel for diagnostics.
    pub raw: Option<Value>,
}

impl RobotPatch {
    /// True when no canonical field is set (raw payload does not count).
    pub fn is_empty(&self) -> bool {
        self.online.is_none()
            && self.operation_mode.is_none()
            && self.drive_mode.is_none()
            && self.delivery_state.is_none()
            && self.lid_status.is_none()
            && self.cruise_state.is_none()
            && self.battery_percent.is_none()
            && self.voltage_volts.is_none()
            && self.current_amps.is_none()
            && self.charging.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.accuracy_meters.is_none()
            && self.speed_mps.is_none()
            && self.heading_degrees.is_none()
    }
}

/// Map a decoded field map onto a canonical patch for one channel.
///
/// Per-channel field ownership is fixed: the status channel owns the
/// integer-coded operational enums, battery owns `battery.*`, gps owns
/// `location.*`, speed owns speed and heading. Fields outside the channel's
/// ownership are ignored even if present. Multiple naming conventions across
/// message types and robot firmware generations fold onto one canonical name.
pub fn normalize(channel: Channel, fields: &Map<String, Value>) -> RobotPatch {
    let mut patch = RobotPatch::default();

    patch.observed_at = first_i64(fields, &["timestamp", "ts"])
        .and_then(DateTime::from_timestamp_millis);

    match channel {
        Channel::Status => {
            patch.online = first_bool(fields, &["status", "online"]);
            patch.operation_mode =
                first_i32(fields, &["operation_state", "operation_mode", "operationMode"]);
            patch.drive_mode = first_i32(fields, &["drive_state", "drive_mode", "driveMode"]);
            patch.delivery_state = first_i32(fields, &["delivery_state", "deliveryState"]);
            patch.lid_status = first_i32(fields, &["lid_status", "lid_state", "lidStatus"]);
            patch.cruise_state = first_i32(fields, &["cruise_state", "cruiseState"]);
        }
        Channel::Battery => {
            patch.battery_percent = first_f64(
                fields,
                &["battery_percent", "batteryPercent", "percentage", "soc"],
            )
            .map(|p| p.clamp(0.0, 100.0));
            patch.voltage_volts = first_f64(fields, &["voltage", "voltage_v", "batteryVoltage"]);
            patch.current_amps = first_f64(fields, &["current", "current_a", "batteryCurrent"]);
            patch.charging = first_bool(fields, &["charging", "is_charging", "isCharging"]);
        }
        Channel::Gps => {
            patch.latitude = first_f64(fields, &["latitude", "lat"]);
            patch.longitude = first_f64(fields, &["longitude", "lon", "lng"]);
            patch.accuracy_meters = first_f64(fields, &["accuracy", "accuracy_m"]);
        }
        Channel::Speed => {
            patch.speed_mps = first_f64(fields, &["speed", "velocity", "speed_mps"]);
            patch.heading_degrees = first_f64(fields, &["heading", "course"]);
        }
    }

    patch.raw = Some(Value::Object(fields.clone()));
    patch
}

/// Derive connectivity from a patch plus the existing record.
///
/// Precedence, first match wins:
/// 1. effective charging flag true        -> Charging
/// 2. effective delivery state in progress -> Delivering
/// 3. explicit online flag false           -> Offline
/// 4. explicit online flag true            -> Online
/// 5. otherwise                            -> keep prior
///
/// A robot that is both charging and mid-delivery reports `Charging`;
/// battery safety takes priority over delivery visibility.
pub fn derive_connectivity(patch: &RobotPatch, current: &RobotState) -> Connectivity {
    let charging = patch.charging.unwrap_or(current.battery.is_charging);
    if charging {
        return Connectivity::Charging;
    }

    let delivery = patch.delivery_state.unwrap_or(current.delivery_state);
    if delivery_state::in_progress(delivery) {
        return Connectivity::Delivering;
    }

    match patch.online {
        Some(false) => Connectivity::Offline,
        Some(true) => Connectivity::Online,
        None => current.connectivity,
    }
}

// Field-map accessors tolerant of mixed firmware encodings: numbers may
// arrive as JSON numbers or numeric strings, booleans as bools or 0/1.

fn first_f64(fields: &Map<String, Value>, names: &[&str]) -> Option<f64> {
    names.iter().find_map(|n| fields.get(*n)).and_then(as_f64)
}

fn first_i64(fields: &Map<String, Value>, names: &[&str]) -> Option<i64> {
    names
        .iter()
        .find_map(|n| fields.get(*n))
        .and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        })
}

fn first_i32(fields: &Map<String, Value>, names: &[&str]) -> Option<i32> {
    first_i64(fields, names).and_then(|v| i32::try_from(v).ok())
}

fn first_bool(fields: &Map<String, Value>, names: &[&str]) -> Option<bool> {
    names
        .iter()
        .find_map(|n| fields.get(*n))
        .and_then(|v| match v {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|i| i != 0),
            Value::String(s) => match s.trim() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        })
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
