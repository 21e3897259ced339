use crate::sensor::SensorKind;
use crate::status::MachineStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Random-walk parameters for one sensor channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub initial: f64,
    pub min: f64,
    pub max: f64,
    /// Largest magnitude of a single step.
    pub variation: f64,
}

impl SensorConfig {
    pub const fn new(initial: f64, min: f64, max: f64, variation: f64) -> Self {
        Self {
            initial,
            min,
            max,
            variation,
        }
    }

    pub fn validate(&self, kind: SensorKind) -> Result<(), ChannelConfigError> {
        let values = [self.initial, self.min, self.max, self.variation];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ChannelConfigError::NonFinite { kind });
        }
        if self.min > self.max {
            return Err(ChannelConfigError::InvertedBounds {
                kind,
                min: self.min,
                max: self.max,
            });
        }
        if self.variation < 0.0 {
            return Err(ChannelConfigError::NegativeVariation {
                kind,
                variation: self.variation,
            });
        }
        if self.initial < self.min || self.initial > self.max {
            return Err(ChannelConfigError::InitialOutOfBounds {
                kind,
                initial: self.initial,
                min: self.min,
                max: self.max,
            });
        }
        if !kind.precision().fits(self.min, self.max) {
            return Err(ChannelConfigError::NoRepresentableValue {
                kind,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    pub temperature: SensorConfig,
    pub humidity: SensorConfig,
    pub rpm: SensorConfig,
    pub vibration: SensorConfig,
    pub energy: SensorConfig,
}

impl SensorsConfig {
    pub fn get(&self, kind: SensorKind) -> &SensorConfig {
        match kind {
            SensorKind::Temperature => &self.temperature,
            SensorKind::Humidity => &self.humidity,
            SensorKind::Rpm => &self.rpm,
            SensorKind::Vibration => &self.vibration,
            SensorKind::Energy => &self.energy,
        }
    }
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            temperature: SensorConfig::new(25.0, 15.0, 85.0, 2.0),
            humidity: SensorConfig::new(50.0, 30.0, 90.0, 5.0),
            rpm: SensorConfig::new(1450.0, 0.0, 3000.0, 50.0),
            vibration: SensorConfig::new(1.0, 0.5, 5.0, 0.2),
            energy: SensorConfig::new(2.5, 0.5, 15.0, 0.5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub id: String,
    pub name: Option<String>,
    pub initial_status: MachineStatus,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            id: "AUTO-01".to_string(),
            name: None,
            initial_status: MachineStatus::On,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelConfigError {
    #[error("{kind} sensor configuration contains a non-finite value")]
    NonFinite { kind: SensorKind },

    #[error("{kind} sensor min {min} is greater than max {max}")]
    InvertedBounds { kind: SensorKind, min: f64, max: f64 },

    #[error("{kind} sensor variation {variation} must not be negative")]
    NegativeVariation { kind: SensorKind, variation: f64 },

    #[error("{kind} sensor initial value {initial} is outside [{min}, {max}]")]
    InitialOutOfBounds {
        kind: SensorKind,
        initial: f64,
        min: f64,
        max: f64,
    },

    #[error("{kind} sensor range [{min}, {max}] holds no value at its reporting precision")]
    NoRepresentableValue { kind: SensorKind, min: f64, max: f64 },
}
