use serde::Deserialize;

use crate::robot::Capabilities;

// Re-export existing config types
pub use crate::sim::SimulationConfig;
pub use crate::transport::TransportConfig;

/// Complete Fleetlink configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FleetConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Statically configured robots, registered at startup.
    #[serde(default)]
    pub fleet: Vec<RobotProfile>,
}

/// Reconnect retry policy
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Base backoff delay; doubles on each failed attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Attempts before falling back to simulation.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Probe cadence while in simulated mode.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_attempts() -> u32 {
    6
}

fn default_probe_interval_ms() -> u64 {
    15_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
            probe_interval_ms: default_probe_interval_ms(),
        }
    }
}

/// Static robot registration entry
#[derive(Debug, Clone, Deserialize)]
pub struct RobotProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub capabilities: Capabilities,
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<FleetConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: FleetConfig = toml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FleetConfig::default();
        assert_eq!(config.transport.command_stream, "FLEET_COMMANDS");
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.retry.max_attempts, 6);
        assert_eq!(config.simulation.tick_interval_ms, 1000);
        assert!(config.fleet.is_empty());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [transport]
            url = "nats://broker:4222"
            command_stream = "TEST_COMMANDS"

            [retry]
            base_delay_ms = 250
            max_attempts = 3

            [simulation]
            tick_interval_ms = 500

            [[fleet]]
            id = "r1"
            name = "Neubie 1"
            code = "NB-001"

            [fleet.capabilities]
            max_speed_mps = 1.5
            battery_capacity_wh = 480.0
        "#;

        let config: FleetConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.transport.url, "nats://broker:4222");
        assert_eq!(config.retry.base_delay_ms, 250);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.simulation.tick_interval_ms, 500);
        assert_eq!(config.fleet.len(), 1);
        assert_eq!(config.fleet[0].id, "r1");
        assert_eq!(config.fleet[0].capabilities.max_speed_mps, 1.5);
    }

    #[test]
    fn test_partial_config() {
        // Missing sections use defaults
        let toml = r#"
            [retry]
            max_attempts = 10
        "#;

        let config: FleetConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.retry.max_attempts, 10);
        assert_eq!(config.retry.base_delay_ms, 500); // Default
        assert_eq!(config.transport.command_stream, "FLEET_COMMANDS"); // Default
    }
}
