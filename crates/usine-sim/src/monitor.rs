//! Offline summary of a data file written by the file output.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use usine_core::{MachineStatus, Reading};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: record {record} is not a valid reading: {source}", .path.display())]
    Parse {
        path: PathBuf,
        record: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("{} contains no records", .path.display())]
    Empty { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSummary {
    pub records: usize,
    pub latest: Reading,
    /// Only computed when there is more than one record.
    pub temperature: Option<TemperatureStats>,
    /// Records per status, in `MachineStatus::ALL` order.
    pub status_counts: [(MachineStatus, usize); 3],
}

/// Reads a JSON-array or JSON-lines data file.
pub fn load_records(path: &Path) -> Result<Vec<Reading>, MonitorError> {
    let text = std::fs::read_to_string(path).map_err(|source| MonitorError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if text.trim_start().starts_with('[') {
        return serde_json::from_str(&text).map_err(|source| MonitorError::Parse {
            path: path.to_path_buf(),
            record: 0,
            source,
        });
    }

    text.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| MonitorError::Parse {
                path: path.to_path_buf(),
                record: idx + 1,
                source,
            })
        })
        .collect()
}

pub fn summarize(path: &Path) -> Result<DataSummary, MonitorError> {
    let records = load_records(path)?;
    let latest = records.last().cloned().ok_or_else(|| MonitorError::Empty {
        path: path.to_path_buf(),
    })?;

    let temperature = (records.len() > 1).then(|| {
        let temps = records.iter().map(|r| r.temperature);
        TemperatureStats {
            mean: temps.clone().sum::<f64>() / records.len() as f64,
            min: temps.clone().fold(f64::INFINITY, f64::min),
            max: temps.fold(f64::NEG_INFINITY, f64::max),
        }
    });

    let status_counts = MachineStatus::ALL
        .map(|status| (status, records.iter().filter(|r| r.status == status).count()));

    Ok(DataSummary {
        records: records.len(),
        latest,
        temperature,
        status_counts,
    })
}

impl fmt::Display for DataSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.latest;
        writeln!(f, "SIMULATOR DATA")?;
        writeln!(f, "{}", "=".repeat(40))?;
        writeln!(f, "Records:     {}", self.records)?;
        writeln!(f, "Latest:      {}", r.timestamp_rfc3339())?;
        writeln!(f, "Machine:     {}", r.machine_id)?;
        writeln!(f, "Temperature: {:.1}°C", r.temperature)?;
        writeln!(f, "Humidity:    {:.1}%", r.humidity)?;
        writeln!(f, "RPM:         {}", r.rpm)?;
        writeln!(f, "Vibration:   {:.1}mm/s", r.vibration)?;
        writeln!(f, "Energy:      {:.1}kWh", r.energy_kwh)?;
        writeln!(f, "Uptime:      {}s", r.uptime)?;
        writeln!(f, "Status:      {}", r.status)?;

        if let Some(t) = &self.temperature {
            writeln!(f)?;
            writeln!(f, "TEMPERATURE")?;
            writeln!(f, "  mean: {:.1}°C", t.mean)?;
            writeln!(f, "  min:  {:.1}°C", t.min)?;
            writeln!(f, "  max:  {:.1}°C", t.max)?;
        }

        writeln!(f)?;
        writeln!(f, "STATUS")?;
        for (status, count) in &self.status_counts {
            writeln!(f, "  {:<7} {}", status.as_str(), count)?;
        }
        Ok(())
    }
}
