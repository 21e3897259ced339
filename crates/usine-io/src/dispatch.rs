use crate::metrics::{
    DELIVERIES, DISPATCH_DURATION_MS, SINK_FAILURES, TICKS_EXECUTED, TICKS_OVERRUN,
};
use crate::sink::{Sink, SinkError};
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};
use usine_core::{Reading, SampleGenerator};

#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub interval: Duration,
    /// Stop and drain after this many ticks.
    pub max_ticks: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_ticks: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchState {
    #[default]
    Stopped,
    Running,
    Draining,
}

#[derive(Clone, Default, Debug)]
pub struct DispatchStats {
    pub ticks: u64,
    pub ticks_overrun: u64,
    pub deliveries_ok: u64,
    pub deliveries_failed: u64,
    pub sinks_failed_init: u64,
    pub cleanup_failures: u64,
}

/// Fires the shutdown of a [`DispatchLoop`].
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Observes a [`ShutdownTrigger`]. Once triggered it stays triggered.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when shutdown is requested. Never resolves if every trigger
    /// was dropped without firing.
    pub async fn triggered(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx: Arc::new(tx) }, ShutdownSignal { rx })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    /// Turned off by configuration; never touched.
    Disabled,
    /// Registered, waiting for `initialize`.
    Pending,
    Active,
    /// `initialize` failed; only `cleanup` remains.
    Failed,
    /// `cleanup` has run; never touched again.
    Closed,
}

struct SinkSlot {
    sink: Box<dyn Sink>,
    state: SinkState,
}

/// Samples on a fixed interval and fans every reading out to the
/// registered sinks.
///
/// Sampling happens on the loop's own task; only delivery runs
/// concurrently, one future per sink, joined before the next tick.
pub struct DispatchLoop {
    generator: SampleGenerator,
    config: DispatchConfig,
    sinks: Vec<SinkSlot>,
    state: DispatchState,
    stats: DispatchStats,
    drained: bool,
}

impl DispatchLoop {
    pub fn new(generator: SampleGenerator, config: DispatchConfig) -> Self {
        Self {
            generator,
            config,
            sinks: Vec::new(),
            state: DispatchState::Stopped,
            stats: DispatchStats::default(),
            drained: false,
        }
    }

    pub fn register(&mut self, sink: Box<dyn Sink>, enabled: bool) {
        let state = if enabled {
            SinkState::Pending
        } else {
            debug!(sink = %sink.name(), "Sink disabled by configuration");
            SinkState::Disabled
        };
        self.sinks.push(SinkSlot { sink, state });
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn active_sinks(&self) -> usize {
        self.sinks
            .iter()
            .filter(|slot| slot.state == SinkState::Active)
            .count()
    }

    /// Runs until `shutdown` fires or the tick limit is reached, then drains.
    pub async fn run(&mut self, mut shutdown: ShutdownSignal) -> DispatchStats {
        self.start().await;

        let mut next_tick = Instant::now();
        while self.state == DispatchState::Running {
            if shutdown.is_triggered() {
                info!("Shutdown requested");
                break;
            }

            let tick_start = Instant::now();
            self.tick().await;
            DISPATCH_DURATION_MS.observe(tick_start.elapsed().as_secs_f64() * 1000.0);

            if let Some(max) = self.config.max_ticks {
                if self.stats.ticks >= max {
                    info!(ticks = max, "Tick limit reached");
                    break;
                }
            }

            next_tick = match next_tick.checked_add(self.config.interval) {
                Some(next) => next,
                None => {
                    warn!(
                        interval_secs = self.config.interval.as_secs(),
                        "Sampling interval cannot be scheduled; idling until shutdown"
                    );
                    shutdown.triggered().await;
                    info!("Shutdown requested");
                    break;
                }
            };
            let now = Instant::now();
            if next_tick < now {
                // Ticks never overlap; the late one simply starts now.
                debug!(
                    overrun_ms = now.duration_since(next_tick).as_millis() as u64,
                    "Dispatch overran the sampling interval"
                );
                self.stats.ticks_overrun += 1;
                TICKS_OVERRUN.inc();
                next_tick = now;
            }

            tokio::select! {
                _ = time::sleep_until(next_tick) => {}
                _ = shutdown.triggered() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.drain().await;
        self.stats.clone()
    }

    /// Initializes every registered sink. A sink that fails stays registered
    /// for `cleanup` but receives no readings.
    ///
    /// A loop that has been drained stays stopped.
    pub async fn start(&mut self) {
        if self.drained {
            warn!("Dispatch loop already drained; not restarting");
            return;
        }
        if self.state != DispatchState::Stopped {
            warn!(state = ?self.state, "Dispatch loop already started");
            return;
        }

        let pending = self
            .sinks
            .iter_mut()
            .filter(|slot| slot.state == SinkState::Pending)
            .map(|slot| async move {
                let res = guarded(slot.sink.initialize()).await;
                (slot, res)
            });

        for (slot, res) in join_all(pending).await {
            match res {
                Ok(()) => {
                    info!(sink = %slot.sink.name(), "Sink initialized");
                    slot.state = SinkState::Active;
                }
                Err(e) => {
                    warn!(sink = %slot.sink.name(), error = %e, "Sink failed to initialize; disabled for this run");
                    SINK_FAILURES
                        .with_label_values(&[slot.sink.name(), "initialize"])
                        .inc();
                    self.stats.sinks_failed_init += 1;
                    slot.state = SinkState::Failed;
                }
            }
        }

        self.state = DispatchState::Running;
        info!(
            sinks = self.sinks.len(),
            active = self.active_sinks(),
            interval_ms = self.config.interval.as_millis() as u64,
            "Dispatch loop running"
        );
    }

    /// Samples one reading and delivers it to every active sink.
    pub async fn tick(&mut self) -> Reading {
        let reading = self.generator.next();
        self.stats.ticks += 1;
        TICKS_EXECUTED.inc();

        let tick = self.stats.ticks;
        debug!(
            tick,
            temperature = reading.temperature,
            rpm = reading.rpm,
            uptime = reading.uptime,
            status = %reading.status,
            "Reading generated"
        );

        let reading_ref = &reading;
        let deliveries = self
            .sinks
            .iter_mut()
            .filter(|slot| slot.state == SinkState::Active)
            .map(move |slot| async move {
                let res = guarded(slot.sink.send(reading_ref)).await;
                (slot, res)
            });

        for (slot, res) in join_all(deliveries).await {
            match res {
                Ok(()) => {
                    self.stats.deliveries_ok += 1;
                    DELIVERIES.inc();
                }
                Err(e) => {
                    warn!(sink = %slot.sink.name(), tick, error = %e, "Delivery failed");
                    SINK_FAILURES
                        .with_label_values(&[slot.sink.name(), "send"])
                        .inc();
                    self.stats.deliveries_failed += 1;
                }
            }
        }

        reading
    }

    /// Cleans up every sink that went through `initialize`, then stops for
    /// good.
    pub async fn drain(&mut self) {
        if self.state == DispatchState::Stopped {
            return;
        }
        self.state = DispatchState::Draining;
        info!("Draining sinks");

        let started = self
            .sinks
            .iter_mut()
            .filter(|slot| matches!(slot.state, SinkState::Active | SinkState::Failed))
            .map(|slot| async move {
                let res = guarded(slot.sink.cleanup()).await;
                (slot, res)
            });

        for (slot, res) in join_all(started).await {
            slot.state = SinkState::Closed;
            if let Err(e) = res {
                warn!(sink = %slot.sink.name(), error = %e, "Sink cleanup failed");
                SINK_FAILURES
                    .with_label_values(&[slot.sink.name(), "cleanup"])
                    .inc();
                self.stats.cleanup_failures += 1;
            }
        }

        self.state = DispatchState::Stopped;
        self.drained = true;
        info!(
            ticks = self.stats.ticks,
            deliveries_ok = self.stats.deliveries_ok,
            deliveries_failed = self.stats.deliveries_failed,
            "Dispatch loop stopped"
        );
    }
}

/// Runs one sink operation, turning a panic into that sink's error.
async fn guarded<F>(op: F) -> Result<(), SinkError>
where
    F: Future<Output = Result<(), SinkError>>,
{
    match AssertUnwindSafe(op).catch_unwind().await {
        Ok(res) => res,
        Err(payload) => Err(SinkError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
