use crate::sink::{Sink, SinkError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::{self, Stdout, Write};
use usine_core::{tags, Reading, SensorKind};

const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    /// One line per reading.
    #[default]
    Simple,
    /// Pretty-printed JSON between separator rules.
    Detailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: ConsoleFormat,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: ConsoleFormat::Simple,
        }
    }
}

/// Prints readings for a human watching the terminal.
pub struct ConsoleSink<W: Write + Send = Stdout> {
    format: ConsoleFormat,
    out: W,
}

impl ConsoleSink<Stdout> {
    pub fn stdout(format: ConsoleFormat) -> Self {
        Self::with_writer(format, io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn with_writer(format: ConsoleFormat, out: W) -> Self {
        Self { format, out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn render(&self, reading: &Reading) -> Result<String, SinkError> {
        match self.format {
            ConsoleFormat::Simple => Ok(format_simple(reading)),
            ConsoleFormat::Detailed => {
                let rule = "=".repeat(RULE_WIDTH);
                let body = serde_json::to_string_pretty(reading)?;
                Ok(format!("{rule}\n{body}\n{rule}"))
            }
        }
    }
}

/// `[ts] Machine: id | Temp: 25.5°C | ... | Status: ON`
pub fn format_simple(reading: &Reading) -> String {
    let mut line = format!(
        "[{}] {}: {}",
        reading.timestamp_rfc3339(),
        tags::MACHINE_ID.label,
        reading.machine_id
    );
    for kind in SensorKind::ALL {
        let tag = kind.tag();
        let value = reading.value(kind);
        // Writing into a String cannot fail.
        let _ = match kind {
            SensorKind::Rpm => write!(line, " | {}: {:.0}{}", tag.label, value, tag.unit),
            _ => write!(line, " | {}: {:.1}{}", tag.label, value, tag.unit),
        };
    }
    let _ = write!(
        line,
        " | {}: {}{} | {}: {}",
        tags::UPTIME.label,
        reading.uptime,
        tags::UPTIME.unit,
        tags::STATUS.label,
        reading.status
    );
    line
}

#[async_trait]
impl<W: Write + Send> Sink for ConsoleSink<W> {
    fn name(&self) -> &str {
        "console"
    }

    async fn initialize(&mut self) -> Result<(), SinkError> {
        tracing::debug!(format = ?self.format, "Console sink ready");
        Ok(())
    }

    async fn send(&mut self, reading: &Reading) -> Result<(), SinkError> {
        let text = self.render(reading)?;
        writeln!(self.out, "{text}").map_err(|e| SinkError::Delivery(e.to_string()))?;
        self.out
            .flush()
            .map_err(|e| SinkError::Delivery(e.to_string()))
    }

    async fn cleanup(&mut self) -> Result<(), SinkError> {
        self.out
            .flush()
            .map_err(|e| SinkError::Delivery(e.to_string()))
    }
}
