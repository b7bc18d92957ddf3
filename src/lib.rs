//! wM-Bus meter monitor library
//!
//! Keeps a fixed table of meters, mirrors it onto a wM-Bus receiver stick,
//! polls the stick once a minute and logs decoded readings to CSV/XML files.

pub mod models;
pub mod storage;
pub mod registry;
pub mod decoder;
pub mod gateway;
pub mod telemetry;
pub mod acquisition;
pub mod commands;
pub mod console;
pub mod config;

// Re-export common types for easier access
pub use models::{MeterDefinition, MeterType, RadioMode};
pub use registry::MeterRegistry;
pub use gateway::{DeviceGateway, StickKind, WmbusDriver};
pub use gateway::simulator::SimulatedStick;
pub use telemetry::TelemetryLogger;
pub use acquisition::AcquisitionLoop;
pub use config::Config;
