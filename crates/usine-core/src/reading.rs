use crate::sensor::SensorKind;
use crate::status::MachineStatus;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// One sampled telemetry record.
///
/// Field names and order are the record shape every serializing sink
/// reproduces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub machine_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub rpm: i64,
    pub vibration: f64,
    pub energy_kwh: f64,
    pub uptime: u64,
    pub status: MachineStatus,
}

impl Reading {
    /// RFC 3339 timestamp in UTC with a trailing `Z`.
    pub fn timestamp_rfc3339(&self) -> String {
        format_timestamp(&self.timestamp)
    }

    pub fn value(&self, kind: SensorKind) -> f64 {
        match kind {
            SensorKind::Temperature => self.temperature,
            SensorKind::Humidity => self.humidity,
            SensorKind::Rpm => self.rpm as f64,
            SensorKind::Vibration => self.vibration,
            SensorKind::Energy => self.energy_kwh,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(ts))
}
