use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};
use usine_io::{init_metrics, serve_metrics};

pub fn init() {
    init_metrics();
}

/// Handle on the `/metrics` server thread.
pub struct MetricsServer {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl MetricsServer {
    /// Stops accepting requests and waits for the server thread.
    pub fn shutdown(self) {
        self.stop.store(true, Ordering::Relaxed);
        if self.handle.join().is_err() {
            warn!("Metrics server thread panicked");
        }
    }
}

/// Binds the `/metrics` server when an address is configured. A bind
/// failure is logged and leaves metrics off for the run.
pub fn start_metrics_server(addr: &Option<String>) -> Option<MetricsServer> {
    let addr = addr.as_ref()?;
    info!(addr = %addr, "Starting metrics server");
    let stop = Arc::new(AtomicBool::new(false));
    match serve_metrics(addr, Arc::clone(&stop)) {
        Ok(handle) => Some(MetricsServer { stop, handle }),
        Err(e) => {
            error!(addr = %addr, error = %e, "Failed to start metrics server; metrics disabled");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taken_port_leaves_metrics_off() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        assert!(start_metrics_server(&Some(addr)).is_none());
        assert!(start_metrics_server(&None).is_none());
    }

    #[test]
    fn free_port_starts_and_stops() {
        let server = start_metrics_server(&Some("127.0.0.1:0".to_string()));
        server.expect("metrics server should bind").shutdown();
    }
}
