use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

const DEFAULT_FILTER: &str = "info,usine_sim=debug,usine_io=debug,usine_core=info";
const LOG_FILE_PREFIX: &str = "usine-sim.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize the tracing subscriber with optional JSON output.
///
/// Logs go to stderr; stdout belongs to the console output. With `log_dir`
/// a daily-rotated JSON log file is written as well, and the returned guard
/// must be kept alive for the file writer to flush.
pub fn init_tracing(
    json_output: bool,
    log_dir: Option<&Path>,
) -> Result<Option<WorkerGuard>, InitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if json_output {
        layers.push(fmt::layer().json().with_writer(io::stderr).boxed());
    } else {
        layers.push(fmt::layer().pretty().with_writer(io::stderr).boxed());
    }

    let guard = match log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .build(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry().with(layers).with(filter).init();

    if let Some(dir) = log_dir {
        tracing::info!(dir = %dir.display(), "Logging to rotated files");
    }
    Ok(guard)
}
