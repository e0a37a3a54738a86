//! Topic grammar and its mapping onto NATS subjects.
//!
//! Fleet topics are slash-separated: inbound `{robotId}/r2s/{channel}`,
//! outbound `{robotId}/s2r/{command|order}`, with `+` as the single-level
//! wildcard in subscription patterns. The NATS binding maps `/` to `.` and
//! `+` to `*`; robot identifiers therefore must not contain `.`, `/`, `*`,
//! `>` or whitespace.

use crate::robot::Channel;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TopicError {
    #[error("topic '{0}' does not have three segments")]
    BadShape(String),
    #[error("unknown direction '{0}', expected r2s or s2r")]
    BadDirection(String),
    #[error("unknown channel '{0}'")]
    BadChannel(String),
    #[error("invalid robot id '{0}'")]
    BadRobotId(String),
}

/// Outbound destination kind under `{robotId}/s2r/`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandDestination {
    /// `{robotId}/s2r/command` — direct control (e-stop, lid)
    Command,
    /// `{robotId}/s2r/order` — delivery orders
    Order,
}

impl CommandDestination {
    fn segment(&self) -> &'static str {
        match self {
            CommandDestination::Command => "command",
            CommandDestination::Order => "order",
        }
    }
}

/// A parsed inbound telemetry topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelemetryTopic {
    pub robot_id: String,
    pub channel: Channel,
}

impl fmt::Display for TelemetryTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/r2s/{}", self.robot_id, self.channel.wire_name())
    }
}

pub fn validate_robot_id(id: &str) -> Result<(), TopicError> {
    let valid = !id.is_empty()
        && !id.contains(['.', '/', '*', '>', '+'])
        && !id.contains(char::is_whitespace);
    if valid {
        Ok(())
    } else {
        Err(TopicError::BadRobotId(id.to_string()))
    }
}

/// Parse an inbound topic (`{robotId}/r2s/{channel}`).
pub fn parse_telemetry(topic: &str) -> Result<TelemetryTopic, TopicError> {
    let mut parts = topic.splitn(3, '/');
    let (robot_id, direction, channel) = match (parts.next(), parts.next(), parts.next()) {
        (Some(r), Some(d), Some(c)) => (r, d, c),
        _ => return Err(TopicError::BadShape(topic.to_string())),
    };

    validate_robot_id(robot_id)?;
    if direction != "r2s" {
        return Err(TopicError::BadDirection(direction.to_string()));
    }
    let channel =
        Channel::from_wire(channel).ok_or_else(|| TopicError::BadChannel(channel.to_string()))?;

    Ok(TelemetryTopic {
        robot_id: robot_id.to_string(),
        channel,
    })
}

/// Parse an inbound NATS subject (`{robotId}.r2s.{channel}`).
pub fn parse_telemetry_subject(subject: &str) -> Result<TelemetryTopic, TopicError> {
    parse_telemetry(&subject.replace('.', "/"))
}

/// Wildcard subscription pattern for one channel: `+/r2s/{channel}`.
pub fn telemetry_pattern(channel: Channel) -> String {
    format!("+/r2s/{}", channel.wire_name())
}

/// Outbound topic for one robot and destination kind.
pub fn command_topic(robot_id: &str, destination: CommandDestination) -> Result<String, TopicError> {
    validate_robot_id(robot_id)?;
    Ok(format!("{}/s2r/{}", robot_id, destination.segment()))
}

/// Translate a slash/`+` topic or pattern into a NATS subject.
pub fn to_subject(topic: &str) -> String {
    topic
        .split('/')
        .map(|segment| if segment == "+" { "*" } else { segment })
        .collect::<Vec<_>>()
        .join(".")
}
