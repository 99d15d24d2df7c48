//! TECS Simulation Library
//!
//! Provides a longitudinal fixed-wing plant, sensor modeling and closed-loop
//! scenario running for the energy controller.

pub mod plant;
pub mod scenario;
pub mod sensor;

// Re-export main types
pub use plant::{Plant, PlantParams};
pub use scenario::{run_scenario, ScenarioConfig, ScenarioKind, ScenarioResult};
pub use sensor::{SensorConfig, SensorModel, SensorSample};
