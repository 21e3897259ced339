use crate::config::{ChannelConfigError, SensorConfig, SensorsConfig};
use crate::tags::{self, Tag};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    Humidity,
    Rpm,
    Vibration,
    Energy,
}

impl SensorKind {
    pub const ALL: [SensorKind; 5] = [
        SensorKind::Temperature,
        SensorKind::Humidity,
        SensorKind::Rpm,
        SensorKind::Vibration,
        SensorKind::Energy,
    ];

    pub fn tag(self) -> Tag {
        match self {
            SensorKind::Temperature => tags::TEMPERATURE,
            SensorKind::Humidity => tags::HUMIDITY,
            SensorKind::Rpm => tags::RPM,
            SensorKind::Vibration => tags::VIBRATION,
            SensorKind::Energy => tags::ENERGY_KWH,
        }
    }

    pub fn precision(self) -> Precision {
        match self {
            SensorKind::Rpm => Precision::Integer,
            _ => Precision::OneDecimal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::Rpm => "rpm",
            SensorKind::Vibration => "vibration",
            SensorKind::Energy => "energy",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a raw walk value is presented in a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    OneDecimal,
    Integer,
}

impl Precision {
    fn scale(self) -> f64 {
        match self {
            Precision::OneDecimal => 10.0,
            Precision::Integer => 1.0,
        }
    }

    /// Smallest value expressible at this precision that is `>= min`.
    pub fn lowest_at_least(self, min: f64) -> f64 {
        let scale = self.scale();
        let n = (min * scale).round();
        if n / scale >= min {
            n / scale
        } else {
            (n + 1.0) / scale
        }
    }

    /// Largest value expressible at this precision that is `<= max`.
    pub fn highest_at_most(self, max: f64) -> f64 {
        let scale = self.scale();
        let n = (max * scale).round();
        if n / scale <= max {
            n / scale
        } else {
            (n - 1.0) / scale
        }
    }

    /// Whether `[min, max]` holds at least one value at this precision.
    pub fn fits(self, min: f64, max: f64) -> bool {
        self.lowest_at_least(min) <= self.highest_at_most(max)
    }

    /// Quantizes `value` and keeps the result inside `[min, max]`.
    ///
    /// Rounding can push a value sitting on a bound that is not itself
    /// representable at this precision outside the bounds; in that case the
    /// nearest representable value inside the bounds is used. Bounds that
    /// hold no representable value are rejected by `SensorConfig::validate`.
    pub fn apply(self, value: f64, min: f64, max: f64) -> f64 {
        let scale = self.scale();
        let quantized = match self {
            Precision::OneDecimal => (value * scale).round() / scale,
            Precision::Integer => value.trunc(),
        };
        if quantized < min {
            let up = self.lowest_at_least(min);
            if up <= max {
                up
            } else {
                min
            }
        } else if quantized > max {
            let down = self.highest_at_most(max);
            if down >= min {
                down
            } else {
                max
            }
        } else {
            quantized
        }
    }
}

/// One reflecting bounded random walk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorChannel {
    current: f64,
    min: f64,
    max: f64,
    step_range: f64,
}

impl SensorChannel {
    pub fn new(kind: SensorKind, config: &SensorConfig) -> Result<Self, ChannelConfigError> {
        config.validate(kind)?;
        Ok(Self {
            current: config.initial,
            min: config.min,
            max: config.max,
            step_range: config.variation,
        })
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn step_range(&self) -> f64 {
        self.step_range
    }

    /// Moves the walk by `delta`, clamped to the channel bounds.
    pub fn apply(&mut self, delta: f64) -> f64 {
        self.current = (self.current + delta).clamp(self.min, self.max);
        self.current
    }

    /// Draws a uniform step in `[-step_range, +step_range]` and applies it.
    pub fn step<R: Rng>(&mut self, rng: &mut R) -> f64 {
        let delta = if self.step_range > 0.0 {
            rng.random_range(-self.step_range..=self.step_range)
        } else {
            0.0
        };
        self.apply(delta)
    }

    #[cfg(test)]
    pub(crate) fn set_current(&mut self, value: f64) {
        self.current = value.clamp(self.min, self.max);
    }
}

/// Walk state for every measured quantity, indexed by [`SensorKind`].
#[derive(Debug, Clone)]
pub struct SensorBank {
    channels: [SensorChannel; 5],
}

impl SensorBank {
    pub fn new(config: &SensorsConfig) -> Result<Self, ChannelConfigError> {
        Ok(Self {
            channels: [
                SensorChannel::new(SensorKind::Temperature, &config.temperature)?,
                SensorChannel::new(SensorKind::Humidity, &config.humidity)?,
                SensorChannel::new(SensorKind::Rpm, &config.rpm)?,
                SensorChannel::new(SensorKind::Vibration, &config.vibration)?,
                SensorChannel::new(SensorKind::Energy, &config.energy)?,
            ],
        })
    }

    pub fn update<R: Rng>(&mut self, kind: SensorKind, rng: &mut R) -> f64 {
        self.channels[kind.index()].step(rng)
    }

    pub fn channel(&self, kind: SensorKind) -> &SensorChannel {
        &self.channels[kind.index()]
    }

}
