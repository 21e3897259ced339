use crate::sink::{Sink, SinkError};
use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use usine_core::{tags, Reading, SensorKind};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// The whole file is one JSON array.
    #[default]
    Json,
    /// One JSON object per line.
    Jsonl,
    Csv,
}

impl FileFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            FileFormat::Json => "json",
            FileFormat::Jsonl => "jsonl",
            FileFormat::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub format: FileFormat,
    /// Rename the file aside once it grows past `max_size_mb`.
    pub rotation: bool,
    pub max_size_mb: f64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("data/machine_data.json"),
            format: FileFormat::Json,
            rotation: false,
            max_size_mb: 10.0,
        }
    }
}

/// Persists readings to a local file.
pub struct FileSink {
    config: FileConfig,
    initialized: bool,
    written: u64,
}

impl FileSink {
    pub fn new(config: FileConfig) -> Self {
        Self {
            config,
            initialized: false,
            written: 0,
        }
    }

    async fn should_rotate(&self) -> Result<bool, SinkError> {
        match fs::metadata(&self.config.path).await {
            Ok(meta) => Ok(meta.len() as f64 > self.config.max_size_mb * BYTES_PER_MB),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SinkError::io(&self.config.path)(e)),
        }
    }

    async fn rotate(&self) -> Result<PathBuf, SinkError> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut target = rotated_path(&self.config.path, &stamp, 0);
        let mut attempt = 0;
        while fs::try_exists(&target).await.unwrap_or(false) {
            attempt += 1;
            target = rotated_path(&self.config.path, &stamp, attempt);
        }
        fs::rename(&self.config.path, &target)
            .await
            .map_err(SinkError::io(&self.config.path))?;
        info!(from = %self.config.path.display(), to = %target.display(), "Data file rotated");
        Ok(target)
    }

    async fn append_json_array(&self, reading: &Reading) -> Result<(), SinkError> {
        let path = &self.config.path;
        let mut records = match fs::read(path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Ok(bytes) => match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(serde_json::Value::Array(records)) => records,
                Ok(other) => vec![other],
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Data file is not valid JSON; starting a new array");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(SinkError::io(path)(e)),
        };
        records.push(serde_json::to_value(reading)?);

        let mut body = serde_json::to_vec_pretty(&records)?;
        body.push(b'\n');
        fs::write(path, body).await.map_err(SinkError::io(path))
    }

    async fn append_line(&self, line: String) -> Result<(), SinkError> {
        let path = &self.config.path;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(SinkError::io(path))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(SinkError::io(path))?;
        file.flush().await.map_err(SinkError::io(path))
    }

    async fn ensure_csv_header(&self) -> Result<(), SinkError> {
        let path = &self.config.path;
        if fs::try_exists(path).await.map_err(SinkError::io(path))? {
            return Ok(());
        }
        self.append_line(csv_header()).await
    }
}

fn rotated_path(path: &Path, stamp: &str, attempt: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = match attempt {
        0 => String::new(),
        n => format!("_{n}"),
    };
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{stamp}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{stamp}{suffix}"),
    };
    path.with_file_name(name)
}

pub fn csv_header() -> String {
    let names: Vec<&str> = tags::RECORD_TAGS.iter().map(|tag| tag.key).collect();
    format!("{}\n", names.join(","))
}

/// One CSV row in record-shape order, RFC 4180 quoting.
pub fn csv_row(reading: &Reading) -> String {
    let mut fields = vec![reading.timestamp_rfc3339(), csv_field(&reading.machine_id)];
    for kind in SensorKind::ALL {
        fields.push(match kind {
            SensorKind::Rpm => reading.rpm.to_string(),
            _ => format!("{:.1}", reading.value(kind)),
        });
    }
    fields.push(reading.uptime.to_string());
    fields.push(reading.status.to_string());
    format!("{}\n", fields.join(","))
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[async_trait]
impl Sink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn initialize(&mut self) -> Result<(), SinkError> {
        let path = &self.config.path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(SinkError::io(parent))?;
        }
        if self.config.format == FileFormat::Csv {
            self.ensure_csv_header().await?;
        }
        self.initialized = true;
        info!(
            path = %path.display(),
            format = self.config.format.as_str(),
            rotation = self.config.rotation,
            "File sink ready"
        );
        Ok(())
    }

    async fn send(&mut self, reading: &Reading) -> Result<(), SinkError> {
        if !self.initialized {
            return Err(SinkError::NotInitialized);
        }
        if self.config.rotation && self.should_rotate().await? {
            self.rotate().await?;
        }

        match self.config.format {
            FileFormat::Json => self.append_json_array(reading).await?,
            FileFormat::Jsonl => {
                let mut line = reading.to_json()?;
                line.push('\n');
                self.append_line(line).await?;
            }
            FileFormat::Csv => {
                self.ensure_csv_header().await?;
                self.append_line(csv_row(reading)).await?;
            }
        }
        self.written += 1;
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), SinkError> {
        if self.initialized {
            debug!(path = %self.config.path.display(), records = self.written, "File sink closed");
        }
        self.initialized = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;
    use usine_core::MachineStatus;

    fn reading(uptime: u64) -> Reading {
        Reading {
            timestamp: Utc.with_ymd_and_hms(2025, 6, 28, 10, 0, 0).unwrap(),
            machine_id: "AUTO-01".to_string(),
            temperature: 25.5,
            humidity: 60.0,
            rpm: 1500,
            vibration: 1.2,
            energy_kwh: 3.0,
            uptime,
            status: MachineStatus::Error,
        }
    }

    fn config(path: PathBuf, format: FileFormat) -> FileConfig {
        FileConfig {
            enabled: true,
            path,
            format,
            ..FileConfig::default()
        }
    }

    #[tokio::test]
    async fn json_array_grows_per_send() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/data.json");
        let mut sink = FileSink::new(config(path.clone(), FileFormat::Json));
        sink.initialize().await.unwrap();
        sink.send(&reading(1)).await.unwrap();
        sink.send(&reading(2)).await.unwrap();
        sink.cleanup().await.unwrap();

        let records: Vec<Reading> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].uptime, 2);
    }

    #[tokio::test]
    async fn corrupt_json_starts_a_new_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{not json").unwrap();

        let mut sink = FileSink::new(config(path.clone(), FileFormat::Json));
        sink.initialize().await.unwrap();
        sink.send(&reading(7)).await.unwrap();

        let records: Vec<Reading> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(records, vec![reading(7)]);
    }

    #[tokio::test]
    async fn jsonl_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        let mut sink = FileSink::new(config(path.clone(), FileFormat::Jsonl));
        sink.initialize().await.unwrap();
        for uptime in 0..3 {
            sink.send(&reading(uptime)).await.unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], reading(0).to_json().unwrap());
    }

    #[tokio::test]
    async fn csv_has_header_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let mut sink = FileSink::new(config(path.clone(), FileFormat::Csv));
        sink.initialize().await.unwrap();
        sink.send(&reading(1)).await.unwrap();
        sink.cleanup().await.unwrap();

        // A second run against the same file must not repeat the header.
        let mut sink = FileSink::new(config(path.clone(), FileFormat::Csv));
        sink.initialize().await.unwrap();
        sink.send(&reading(2)).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "timestamp,machine_id,temperature,humidity,rpm,vibration,energy_kwh,uptime,status",
                "2025-06-28T10:00:00.000Z,AUTO-01,25.5,60.0,1500,1.2,3.0,1,ERREUR",
                "2025-06-28T10:00:00.000Z,AUTO-01,25.5,60.0,1500,1.2,3.0,2,ERREUR",
            ]
        );
    }

    #[test]
    fn csv_quotes_special_characters() {
        let mut r = reading(0);
        r.machine_id = "LINE \"A\", 2".to_string();
        assert!(csv_row(&r).contains(r#","LINE ""A"", 2","#));
    }

    #[tokio::test]
    async fn rotation_moves_oversized_file_aside() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        let mut sink = FileSink::new(FileConfig {
            rotation: true,
            max_size_mb: 0.0001,
            ..config(path.clone(), FileFormat::Jsonl)
        });
        sink.initialize().await.unwrap();
        // Each record is ~200 bytes; 0.0001 MiB is ~104 bytes.
        sink.send(&reading(1)).await.unwrap();
        sink.send(&reading(2)).await.unwrap();
        sink.send(&reading(3)).await.unwrap();

        let rotated: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("data_") && name.ends_with(".jsonl"))
            .collect();
        assert_eq!(rotated.len(), 2, "{rotated:?}");

        let current = std::fs::read_to_string(&path).unwrap();
        assert_eq!(current.lines().count(), 1);
    }

    #[test]
    fn rotated_name_keeps_extension() {
        let path = Path::new("/tmp/out/machine_data.json");
        assert_eq!(
            rotated_path(path, "20250628_100000", 0),
            Path::new("/tmp/out/machine_data_20250628_100000.json")
        );
        assert_eq!(
            rotated_path(path, "20250628_100000", 2),
            Path::new("/tmp/out/machine_data_20250628_100000_2.json")
        );
    }

    #[tokio::test]
    async fn send_before_initialize_fails() {
        let dir = tempdir().unwrap();
        let mut sink = FileSink::new(config(dir.path().join("x.json"), FileFormat::Json));
        assert!(matches!(
            sink.send(&reading(0)).await,
            Err(SinkError::NotInitialized)
        ));
    }
}
