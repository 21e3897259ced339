pub mod config;
pub mod generator;
pub mod reading;
pub mod sensor;
pub mod status;
pub mod tags;
pub mod uptime;

pub use config::{ChannelConfigError, MachineConfig, SensorConfig, SensorsConfig};
pub use generator::SampleGenerator;
pub use reading::Reading;
pub use sensor::{Precision, SensorBank, SensorChannel, SensorKind};
pub use status::{MachineStatus, StatusModel, STATUS_STICKINESS};
pub use uptime::UptimeAccumulator;
