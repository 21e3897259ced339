//! Prometheus metrics for the telemetry simulator.
//!
//! The dispatch loop records tick and delivery counters here; the
//! [`MetricsSink`] mirrors the latest reading into gauges. Everything is
//! exported by [`serve_metrics`].

use crate::sink::{Sink, SinkError};
use async_trait::async_trait;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Response, Server};
use usine_core::{tags, Reading, SensorKind};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Dispatch Loop Metrics
// ============================================================================

/// Total ticks sampled and dispatched
pub static TICKS_EXECUTED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "usine_ticks_executed_total",
        "Total sampling ticks executed",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Ticks whose dispatch outlasted the sampling interval
pub static TICKS_OVERRUN: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "usine_ticks_overrun_total",
        "Ticks whose dispatch took longer than the sampling interval",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Sink failures by sink and lifecycle phase
pub static SINK_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "usine_sink_failures_total",
            "Sink failures by sink name and phase (initialize, send, cleanup)",
        ),
        &["sink", "phase"],
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Successful deliveries
pub static DELIVERIES: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "usine_deliveries_total",
        "Readings delivered successfully to a sink",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Time spent delivering one reading to all sinks
pub static DISPATCH_DURATION_MS: LazyLock<Histogram> = LazyLock::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(
            "usine_dispatch_duration_milliseconds",
            "Time to deliver one reading to every enabled sink",
        )
        .buckets(vec![
            0.1, 0.5, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0,
        ]),
    )
    .unwrap();
    REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
});

// ============================================================================
// Reading Metrics
// ============================================================================

fn gauge(tag: tags::Tag, help: &str) -> Gauge {
    let gauge = Gauge::new(tag.metric, help).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
}

/// Latest temperature in Celsius
pub static TEMPERATURE: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::TEMPERATURE, "Latest temperature in Celsius"));

/// Latest relative humidity in percent
pub static HUMIDITY: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::HUMIDITY, "Latest relative humidity in percent"));

/// Latest rotational speed
pub static RPM: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::RPM, "Latest rotational speed in RPM"));

/// Latest vibration velocity
pub static VIBRATION: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::VIBRATION, "Latest vibration velocity in mm/s"));

/// Latest energy rate
pub static ENERGY_KWH: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::ENERGY_KWH, "Latest energy consumption in kWh"));

/// Accumulated ON time
pub static UPTIME_SECONDS: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::UPTIME, "Accumulated machine ON time in seconds"));

/// Machine status (0=off, 1=on, 2=error)
pub static MACHINE_STATUS: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::STATUS, "Machine status (0=off,1=on,2=error)"));

pub fn sensor_gauge(kind: SensorKind) -> &'static Gauge {
    match kind {
        SensorKind::Temperature => &*TEMPERATURE,
        SensorKind::Humidity => &*HUMIDITY,
        SensorKind::Rpm => &*RPM,
        SensorKind::Vibration => &*VIBRATION,
        SensorKind::Energy => &*ENERGY_KWH,
    }
}

/// Mirrors every reading into the reading gauges.
#[derive(Debug, Default)]
pub struct MetricsSink;

impl MetricsSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sink for MetricsSink {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn initialize(&mut self) -> Result<(), SinkError> {
        init_metrics();
        Ok(())
    }

    async fn send(&mut self, reading: &Reading) -> Result<(), SinkError> {
        for kind in SensorKind::ALL {
            sensor_gauge(kind).set(reading.value(kind));
        }
        UPTIME_SECONDS.set(reading.uptime as f64);
        MACHINE_STATUS.set(reading.status.as_gauge());
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

// ============================================================================
// Metrics HTTP Server
// ============================================================================

pub type ServeError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Start the metrics HTTP server on the given address.
///
/// Binding happens before this returns, so an unusable address is reported
/// to the caller. The server thread exits once `stop` is set.
pub fn serve_metrics(
    bind_addr: &str,
    stop: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>, ServeError> {
    let server = Server::http(bind_addr)?;
    tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

    Ok(thread::spawn(move || {

        while !stop.load(Ordering::Relaxed) {
            let request = match server.recv_timeout(Duration::from_millis(200)) {
                Ok(Some(request)) => request,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Metrics server receive error");
                    continue;
                }
            };

            let response = match request.url() {
                "/metrics" => match render_metrics() {
                    Ok(buffer) => {
                        let mut response = Response::from_data(buffer);
                        if let Ok(header) = Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/plain; version=0.0.4"[..],
                        ) {
                            response = response.with_header(header);
                        }
                        response
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to encode metrics");
                        Response::from_string("Internal Server Error").with_status_code(500)
                    }
                },
                "/health" => Response::from_string("OK"),
                "/ready" => {
                    // Ready once the first reading has gone out
                    if TICKS_EXECUTED.get() > 0 {
                        Response::from_string("Ready")
                    } else {
                        Response::from_string("Not Ready").with_status_code(503)
                    }
                }
                _ => Response::from_string("Not Found").with_status_code(404),
            };
            let _ = request.respond(response);
        }
    }))
}

pub fn render_metrics() -> prometheus::Result<Vec<u8>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = TICKS_EXECUTED.get();
    let _ = TICKS_OVERRUN.get();
    let _ = DELIVERIES.get();
    LazyLock::force(&SINK_FAILURES);
    let _ = DISPATCH_DURATION_MS.get_sample_count();
    for kind in SensorKind::ALL {
        let _ = sensor_gauge(kind).get();
    }
    let _ = UPTIME_SECONDS.get();
    let _ = MACHINE_STATUS.get();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use usine_core::MachineStatus;

    #[tokio::test]
    async fn metrics_sink_sets_gauges() {
        let mut sink = MetricsSink::new();
        sink.initialize().await.unwrap();
        let reading = Reading {
            timestamp: Utc::now(),
            machine_id: "TEST-01".to_string(),
            temperature: 42.5,
            humidity: 55.0,
            rpm: 1234,
            vibration: 2.2,
            energy_kwh: 7.5,
            uptime: 99,
            status: MachineStatus::Error,
        };
        sink.send(&reading).await.unwrap();
        assert_eq!(RPM.get(), 1234.0);
        assert_eq!(MACHINE_STATUS.get(), 2.0);

        let text = String::from_utf8(render_metrics().unwrap()).unwrap();
        assert!(text.contains(tags::TEMPERATURE.metric));
        assert!(text.contains("usine_ticks_executed_total"));
    }

    #[test]
    fn serving_on_a_taken_port_is_an_error() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let stop = Arc::new(AtomicBool::new(false));
        assert!(serve_metrics(&addr, stop).is_err());
    }

    #[test]
    fn server_thread_exits_on_stop() {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = serve_metrics("127.0.0.1:0", Arc::clone(&stop)).unwrap();
        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }
}
