// Payload decoding (binary, JSON, heuristic fallback)
pub mod codec;

// Canonical robot state model and field normalization
pub mod robot;

// In-memory state registry
pub mod store;

// Transport binding (topics, NATS session)
pub mod transport;

// Connection lifecycle state machine
pub mod conn;

// Simulation fallback generator
pub mod sim;

// Outbound command dispatch
pub mod command;

// Local subscriber fan-out
pub mod bus;

// Configuration
pub mod config;

mod context;

pub use context::FleetContext;
