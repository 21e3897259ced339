use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Probability of keeping the current status on a tick.
pub const STATUS_STICKINESS: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MachineStatus {
    #[default]
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
    #[serde(rename = "ERREUR")]
    Error,
}

impl MachineStatus {
    pub const ALL: [MachineStatus; 3] = [MachineStatus::On, MachineStatus::Off, MachineStatus::Error];

    pub fn as_str(self) -> &'static str {
        match self {
            MachineStatus::On => "ON",
            MachineStatus::Off => "OFF",
            MachineStatus::Error => "ERREUR",
        }
    }

    /// The two states a transition out of `self` can land in.
    pub fn others(self) -> [MachineStatus; 2] {
        match self {
            MachineStatus::On => [MachineStatus::Off, MachineStatus::Error],
            MachineStatus::Off => [MachineStatus::On, MachineStatus::Error],
            MachineStatus::Error => [MachineStatus::On, MachineStatus::Off],
        }
    }

    /// Gauge encoding (0=off, 1=on, 2=error).
    pub fn as_gauge(self) -> f64 {
        match self {
            MachineStatus::Off => 0.0,
            MachineStatus::On => 1.0,
            MachineStatus::Error => 2.0,
        }
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sticky three-state machine.
///
/// [`StatusModel::next_status`] only proposes a status; the caller commits it
/// with [`StatusModel::commit`] once the tick that observed the previous
/// status is done with it.
#[derive(Debug, Clone)]
pub struct StatusModel {
    current: MachineStatus,
    stickiness: f64,
}

impl StatusModel {
    pub fn new(initial: MachineStatus) -> Self {
        Self {
            current: initial,
            stickiness: STATUS_STICKINESS,
        }
    }

    pub fn current(&self) -> MachineStatus {
        self.current
    }

    pub fn stickiness(&self) -> f64 {
        self.stickiness
    }

    pub fn next_status<R: Rng>(&self, rng: &mut R) -> MachineStatus {
        let p: f64 = rng.random();
        if p < self.stickiness {
            return self.current;
        }
        let others = self.current.others();
        others[rng.random_range(0..others.len())]
    }

    pub fn commit(&mut self, status: MachineStatus) {
        if status != self.current {
            log::debug!("machine status {} -> {}", self.current, status);
        }
        self.current = status;
    }
}

impl Default for StatusModel {
    fn default() -> Self {
        Self::new(MachineStatus::default())
    }
}
