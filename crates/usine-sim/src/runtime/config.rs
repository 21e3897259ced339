use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use usine_core::{ChannelConfigError, MachineConfig, SensorKind, SensorsConfig};
use usine_io::{ConsoleConfig, FileConfig, HttpConfig};

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Longest accepted sampling interval: one day.
pub const MAX_INTERVAL_SECS: f64 = 86_400.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{flag} expects a value")]
    MissingValue { flag: String },

    #[error("invalid value {value:?} for {flag}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown argument {0:?}")]
    UnknownArgument(String),

    #[error("sampling interval must be in (0, 86400] seconds, got {0}")]
    InvalidInterval(f64),

    #[error(transparent)]
    Sensor(#[from] ChannelConfigError),
}

/// Command-line options. Values given here override the YAML file.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub config_path: Option<PathBuf>,
    pub machine_id: Option<String>,
    pub interval_ms: Option<u64>,
    pub seed: Option<u64>,
    pub run_seconds: Option<u64>,
    pub ticks: Option<u64>,
    pub console_enabled: bool,
    pub json_logs: bool,
    pub log_dir: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub monitor_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            config_path: None,
            machine_id: None,
            interval_ms: None,
            seed: None,
            run_seconds: None,
            ticks: None,
            console_enabled: true,
            json_logs: false,
            log_dir: None,
            metrics_addr: None,
            monitor_path: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    /// Parses `args`, skipping the program name in `args[0]`.
    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--config" => {
                    cfg.config_path = Some(PathBuf::from(value(args, &mut i)?));
                }
                "--machine-id" => {
                    cfg.machine_id = Some(value(args, &mut i)?.to_string());
                }
                "--interval-ms" => {
                    cfg.interval_ms = Some(parsed(args, &mut i)?);
                }
                "--seed" => {
                    cfg.seed = Some(parsed(args, &mut i)?);
                }
                "--run-seconds" => {
                    cfg.run_seconds = Some(parsed(args, &mut i)?);
                }
                "--ticks" => {
                    cfg.ticks = Some(parsed(args, &mut i)?);
                }
                "--no-console" => {
                    cfg.console_enabled = false;
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--log-dir" => {
                    cfg.log_dir = Some(PathBuf::from(value(args, &mut i)?));
                }
                "--metrics-addr" => {
                    cfg.metrics_addr = Some(value(args, &mut i)?.to_string());
                }
                "--monitor" => {
                    cfg.monitor_path = Some(PathBuf::from(value(args, &mut i)?));
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                other => return Err(ConfigError::UnknownArgument(other.to_string())),
            }
            i += 1;
        }
        Ok(cfg)
    }

    pub fn print_help() {
        println!(
            r#"usine-sim - Industrial machine telemetry simulator

USAGE:
    usine-sim [OPTIONS]

OPTIONS:
    --config <PATH>         YAML configuration file [default: ./config.yaml if present]
    --machine-id <ID>       Override machine.id
    --interval-ms <MS>      Override the sampling interval in milliseconds
    --seed <N>              Seed the random generator for a reproducible run
    --run-seconds <SECS>    Shut down gracefully after a fixed duration
    --ticks <N>             Stop after N readings
    --no-console            Disable the console output
    --json-logs             Output logs in JSON format (for log aggregation)
    --log-dir <DIR>         Also write logs to a daily-rotated file in DIR
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --monitor <PATH>        Summarize a data file written by the file output, then exit
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,usine_io=trace)

EXAMPLES:
    # Default configuration, one reading per second on the console
    usine-sim

    # Fast reproducible run writing JSONL
    usine-sim --config config.yaml --interval-ms 100 --seed 42 --ticks 500

    # Inspect the data collected so far
    usine-sim --monitor data/machine_data.json
"#
        );
    }
}

fn value<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str, ConfigError> {
    let flag = &args[*i];
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingValue { flag: flag.clone() })
}

fn parsed<T: std::str::FromStr>(args: &[String], i: &mut usize) -> Result<T, ConfigError> {
    let flag = args[*i].clone();
    let raw = value(args, i)?;
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        flag,
        value: raw.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seconds between readings.
    pub interval: f64,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            interval: 1.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputsConfig {
    pub console: ConsoleConfig,
    pub file: FileConfig,
    pub http: HttpConfig,
}

/// Contents of the YAML configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub machine: MachineConfig,
    pub simulation: SimulationConfig,
    pub sensors: SensorsConfig,
    pub outputs: OutputsConfig,
}

impl SimulatorConfig {
    /// Loads `path`, or `config.yaml` when no path is given. A missing
    /// default file yields the built-in defaults; a missing explicit file is
    /// an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document means "all defaults".
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn apply_overrides(&mut self, runtime: &RuntimeConfig) {
        if let Some(id) = &runtime.machine_id {
            self.machine.id = id.clone();
        }
        if let Some(ms) = runtime.interval_ms {
            self.simulation.interval = ms as f64 / 1000.0;
        }
        if runtime.seed.is_some() {
            self.simulation.seed = runtime.seed;
        }
        if !runtime.console_enabled {
            self.outputs.console.enabled = false;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.interval()?;
        for kind in SensorKind::ALL {
            self.sensors.get(kind).validate(kind)?;
        }
        Ok(())
    }

    pub fn interval(&self) -> Result<Duration, ConfigError> {
        let secs = self.simulation.interval;
        if !(secs > 0.0 && secs <= MAX_INTERVAL_SECS) {
            return Err(ConfigError::InvalidInterval(secs));
        }
        Duration::try_from_secs_f64(secs)
            .ok()
            .filter(|interval| !interval.is_zero())
            .ok_or(ConfigError::InvalidInterval(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usine_core::MachineStatus;
    use usine_io::{ConsoleFormat, FileFormat};

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("usine-sim")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parses_flags() {
        let cfg = RuntimeConfig::from_args(&args(&[
            "--config",
            "plant.yaml",
            "--machine-id",
            "PRESS-7",
            "--interval-ms",
            "250",
            "--seed",
            "42",
            "--ticks",
            "10",
            "--no-console",
            "--json-logs",
            "--metrics-addr",
            "127.0.0.1:9100",
        ]))
        .unwrap();
        assert_eq!(cfg.config_path.as_deref(), Some(Path::new("plant.yaml")));
        assert_eq!(cfg.machine_id.as_deref(), Some("PRESS-7"));
        assert_eq!(cfg.interval_ms, Some(250));
        assert_eq!(cfg.seed, Some(42));
        assert_eq!(cfg.ticks, Some(10));
        assert!(!cfg.console_enabled);
        assert!(cfg.json_logs);
        assert_eq!(cfg.metrics_addr.as_deref(), Some("127.0.0.1:9100"));
        assert!(!cfg.show_help);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(matches!(
            RuntimeConfig::from_args(&args(&["--ticks"])),
            Err(ConfigError::MissingValue { .. })
        ));
        assert!(matches!(
            RuntimeConfig::from_args(&args(&["--seed", "many"])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            RuntimeConfig::from_args(&args(&["--bogus"])),
            Err(ConfigError::UnknownArgument(_))
        ));
    }

    #[test]
    fn help_stops_parsing() {
        let cfg = RuntimeConfig::from_args(&args(&["-h", "--bogus"])).unwrap();
        assert!(cfg.show_help);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = r#"
machine:
  id: LINE-2
  initial_status: ERREUR
simulation:
  interval: 0.5
sensors:
  temperature: { initial: 20.0, min: 10.0, max: 40.0, variation: 1.0 }
outputs:
  console: { format: detailed }
  file: { enabled: true, path: out/data.csv, format: csv }
"#;
        let cfg = SimulatorConfig::from_yaml(yaml).unwrap();
        assert_eq!(cfg.machine.id, "LINE-2");
        assert_eq!(cfg.machine.initial_status, MachineStatus::Error);
        assert_eq!(cfg.simulation.interval, 0.5);
        assert_eq!(cfg.sensors.temperature.max, 40.0);
        assert_eq!(cfg.sensors.rpm, SensorsConfig::default().rpm);
        assert!(cfg.outputs.console.enabled);
        assert_eq!(cfg.outputs.console.format, ConsoleFormat::Detailed);
        assert_eq!(cfg.outputs.file.format, FileFormat::Csv);
        assert_eq!(cfg.outputs.file.max_size_mb, 10.0);
        assert!(!cfg.outputs.http.enabled);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(SimulatorConfig::from_yaml("").unwrap(), SimulatorConfig::default());
    }

    #[test]
    fn cli_overrides_file() {
        let mut cfg = SimulatorConfig::default();
        let runtime = RuntimeConfig::from_args(&args(&[
            "--machine-id",
            "X-1",
            "--interval-ms",
            "100",
            "--seed",
            "9",
            "--no-console",
        ]))
        .unwrap();
        cfg.apply_overrides(&runtime);
        assert_eq!(cfg.machine.id, "X-1");
        assert_eq!(cfg.interval().unwrap(), Duration::from_millis(100));
        assert_eq!(cfg.simulation.seed, Some(9));
        assert!(!cfg.outputs.console.enabled);
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut cfg = SimulatorConfig::default();
        cfg.simulation.interval = 0.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidInterval(_))));

        let mut cfg = SimulatorConfig::default();
        cfg.sensors.humidity.min = 95.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Sensor(_))));
    }

    #[test]
    fn oversized_interval_is_rejected_not_fatal() {
        for yaml in [
            "simulation:\n  interval: 1.0e20\n",
            "simulation:\n  interval: 1.0e19\n",
            "simulation:\n  interval: .nan\n",
        ] {
            let cfg = SimulatorConfig::from_yaml(yaml).unwrap();
            assert!(
                matches!(cfg.validate(), Err(ConfigError::InvalidInterval(_))),
                "{yaml}"
            );
            assert!(cfg.interval().is_err(), "{yaml}");
        }

        let mut cfg = SimulatorConfig::default();
        let runtime = RuntimeConfig::from_args(&args(&[
            "--interval-ms",
            "18446744073709551615",
        ]))
        .unwrap();
        cfg.apply_overrides(&runtime);
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidInterval(_))));

        cfg.simulation.interval = MAX_INTERVAL_SECS;
        assert_eq!(
            cfg.interval().unwrap(),
            Duration::from_secs(MAX_INTERVAL_SECS as u64)
        );
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(matches!(
            SimulatorConfig::load(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "machine: [unclosed").unwrap();
        let err = SimulatorConfig::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("bad.yaml"), "{err}");
    }
}
