//! Eyedro Energy Monitor Library
//!
//! Polls a two-channel Eyedro energy monitor over its local `/getdata` HTTP API,
//! keeps the latest validated snapshot and derives total power, total current,
//! average voltage and average power factor from it.

pub mod config;
pub mod device_response;
pub mod error;
pub mod eyedro_api;
pub mod metrics;
pub mod registry;
pub mod sensor;
pub mod update_coordinator;

// Re-export commonly used types for easier access
pub use config::EyedroConfig;
pub use device_response::{normalize, ChannelReading, DeviceSnapshot, Envelope};
pub use error::{ConfigError, ParseError, SetupError, TransportError, UpdateError};
pub use eyedro_api::EyedroAPI;
pub use metrics::{reduce, DerivedMetrics};
pub use registry::{validate_input, EyedroRegistry};
pub use sensor::{EyedroSensor, SensorKind, SensorState};
pub use update_coordinator::{CoordinatorHandle, CoordinatorState, EyedroCoordinator};
