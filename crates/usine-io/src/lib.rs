pub mod dispatch;
pub mod metrics;
pub mod sink;
pub mod sinks;

pub use dispatch::{
    shutdown_channel, DispatchConfig, DispatchLoop, DispatchState, DispatchStats, ShutdownSignal,
    ShutdownTrigger,
};
pub use metrics::{init_metrics, serve_metrics, MetricsSink};
pub use sink::{Sink, SinkError};
pub use sinks::{
    ConsoleConfig, ConsoleFormat, ConsoleSink, FileConfig, FileFormat, FileSink, HttpConfig,
    HttpSink,
};
