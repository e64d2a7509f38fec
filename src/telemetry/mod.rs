//! # Telemetry Module
//!
//! Handles sensor telemetry on the host and device sides.
//!
//! This module handles:
//! - Formatting sensor readings as JSONL (JSON Lines)
//! - Writing to rotating log files
//! - Managing file rotation (max N records per file)
//! - Retaining only last M files
//! - Simulated sensor readings for the device simulator

pub mod logger;
pub mod sim;

pub use logger::TelemetryLogger;
pub use sim::SimulatedSensors;
