use crate::monitor::{self, MonitorError};
use crate::runtime::config::{ConfigError, RuntimeConfig, SimulatorConfig};
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use usine_core::{ChannelConfigError, SampleGenerator};
use usine_io::{
    shutdown_channel, ConsoleSink, DispatchConfig, DispatchLoop, DispatchStats, FileSink,
    HttpSink, MetricsSink, ShutdownTrigger,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sensor(#[from] ChannelConfigError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("failed to set up log files: {0}")]
    Logging(#[from] tracing_appender::rolling::InitError),
}

pub async fn run_from_args() -> ExitCode {
    let runtime = match RuntimeConfig::from_env() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Run with --help for usage.");
            return ExitCode::from(2);
        }
    };
    if runtime.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }

    if let Some(path) = &runtime.monitor_path {
        return match run_monitor(path) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let _log_guard = match init_tracing(runtime.json_logs, runtime.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {}", AppError::from(e));
            return ExitCode::FAILURE;
        }
    };

    match run(runtime).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Simulator failed");
            ExitCode::FAILURE
        }
    }
}

/// Prints the summary of a data file written by an earlier run.
pub fn run_monitor(path: &Path) -> Result<(), AppError> {
    let summary = monitor::summarize(path)?;
    print!("{summary}");
    Ok(())
}

/// Loads configuration, wires the sinks and runs until shutdown.
pub async fn run(runtime: RuntimeConfig) -> Result<DispatchStats, AppError> {
    let mut config = SimulatorConfig::load(runtime.config_path.as_deref())?;
    config.apply_overrides(&runtime);
    config.validate()?;
    let interval = config.interval()?;

    telemetry::init();
    let metrics_server = telemetry::start_metrics_server(&runtime.metrics_addr);

    let generator = SampleGenerator::from_config(
        &config.machine,
        &config.sensors,
        config.simulation.seed,
    )?;
    let mut dispatch = DispatchLoop::new(
        generator,
        DispatchConfig {
            interval,
            max_ticks: runtime.ticks,
        },
    );

    let outputs = &config.outputs;
    dispatch.register(
        Box::new(ConsoleSink::stdout(outputs.console.format)),
        outputs.console.enabled,
    );
    dispatch.register(
        Box::new(FileSink::new(outputs.file.clone())),
        outputs.file.enabled,
    );
    dispatch.register(
        Box::new(HttpSink::new(outputs.http.clone())),
        outputs.http.enabled,
    );
    dispatch.register(Box::new(MetricsSink::new()), metrics_server.is_some());

    info!(
        machine_id = %config.machine.id,
        machine_name = config.machine.name.as_deref().unwrap_or(""),
        interval_ms = interval.as_millis() as u64,
        seed = ?config.simulation.seed,
        initial_status = %config.machine.initial_status,
        "Starting telemetry simulator"
    );

    let (trigger, signal) = shutdown_channel();
    tokio::spawn(shutdown_on_signal(trigger.clone()));
    if let Some(seconds) = runtime.run_seconds {
        info!(seconds, "Running for limited duration");
        let trigger = trigger.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            trigger.trigger();
        });
    }

    let stats = dispatch.run(signal).await;

    info!(
        ticks = stats.ticks,
        ticks_overrun = stats.ticks_overrun,
        deliveries_ok = stats.deliveries_ok,
        deliveries_failed = stats.deliveries_failed,
        sinks_failed_init = stats.sinks_failed_init,
        cleanup_failures = stats.cleanup_failures,
        "Run complete"
    );

    if let Some(server) = metrics_server {
        if tokio::task::spawn_blocking(move || server.shutdown())
            .await
            .is_err()
        {
            warn!("Metrics server did not shut down cleanly");
        }
    }

    Ok(stats)
}

/// Fires `trigger` on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_on_signal(trigger: ShutdownTrigger) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if let Err(e) = res {
                            warn!(error = %e, "Ctrl-C handler failed");
                            return;
                        }
                    }
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable; listening for Ctrl-C only");
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler failed");
            return;
        }
    }
    info!("Termination signal received");
    trigger.trigger();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_failures_are_app_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_monitor(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, AppError::Monitor(MonitorError::Read { .. })));

        let empty = dir.path().join("empty.jsonl");
        std::fs::write(&empty, "").unwrap();
        let err = run_monitor(&empty).unwrap_err();
        assert!(matches!(err, AppError::Monitor(MonitorError::Empty { .. })));
    }
}
