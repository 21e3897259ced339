use crate::status::MachineStatus;
use chrono::{DateTime, Utc};

/// Accumulated time spent in [`MachineStatus::On`].
#[derive(Debug, Clone, Copy)]
pub struct UptimeAccumulator {
    total_seconds: f64,
    last_tick: DateTime<Utc>,
}

impl UptimeAccumulator {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            total_seconds: 0.0,
            last_tick: started_at,
        }
    }

    /// Credits the time since the previous call when `status` is ON and
    /// returns whole seconds of uptime.
    ///
    /// `status` must be the status that held during the elapsed interval,
    /// i.e. the one observed before this tick's transition. A clock that
    /// steps backwards contributes nothing.
    pub fn accumulate(&mut self, status: MachineStatus, now: DateTime<Utc>) -> u64 {
        let elapsed = (now - self.last_tick)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        if status == MachineStatus::On {
            self.total_seconds += elapsed;
        }
        self.last_tick = now;
        self.seconds()
    }

    pub fn seconds(&self) -> u64 {
        self.total_seconds.floor() as u64
    }

    pub fn total_seconds(&self) -> f64 {
        self.total_seconds
    }

    pub fn last_tick(&self) -> DateTime<Utc> {
        self.last_tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 28, 10, 0, 0).unwrap()
    }

    #[test]
    fn first_call_counts_from_construction() {
        let mut uptime = UptimeAccumulator::new(t0());
        assert_eq!(uptime.accumulate(MachineStatus::On, t0()), 0);
        assert_eq!(
            uptime.accumulate(MachineStatus::On, t0() + Duration::seconds(3)),
            3
        );
    }

    #[test]
    fn frozen_while_not_on() {
        let mut uptime = UptimeAccumulator::new(t0());
        uptime.accumulate(MachineStatus::On, t0() + Duration::seconds(5));
        let off = uptime.accumulate(MachineStatus::Off, t0() + Duration::seconds(10));
        let err = uptime.accumulate(MachineStatus::Error, t0() + Duration::seconds(20));
        assert_eq!(off, 5);
        assert_eq!(err, 5);
        // The OFF interval is not credited when the machine comes back.
        let on = uptime.accumulate(MachineStatus::On, t0() + Duration::seconds(21));
        assert_eq!(on, 6);
    }

    #[test]
    fn fractional_seconds_carry_over() {
        let mut uptime = UptimeAccumulator::new(t0());
        let mut now = t0();
        for _ in 0..3 {
            now += Duration::milliseconds(600);
            uptime.accumulate(MachineStatus::On, now);
        }
        assert_eq!(uptime.seconds(), 1);
        assert!((uptime.total_seconds() - 1.8).abs() < 1e-9);
    }

    #[test]
    fn backwards_clock_is_ignored() {
        let mut uptime = UptimeAccumulator::new(t0());
        uptime.accumulate(MachineStatus::On, t0() + Duration::seconds(10));
        let after = uptime.accumulate(MachineStatus::On, t0() + Duration::seconds(4));
        assert_eq!(after, 10);
        assert_eq!(uptime.last_tick(), t0() + Duration::seconds(4));
    }
}
