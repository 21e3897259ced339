use crate::config::{ChannelConfigError, MachineConfig, SensorsConfig};
use crate::reading::Reading;
use crate::sensor::{SensorBank, SensorKind};
use crate::status::{MachineStatus, StatusModel};
use crate::uptime::UptimeAccumulator;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Produces one [`Reading`] per tick from the sensor walks, the status
/// model, and the uptime counter.
#[derive(Debug, Clone)]
pub struct SampleGenerator<R: Rng = StdRng> {
    machine_id: String,
    bank: SensorBank,
    status: StatusModel,
    uptime: UptimeAccumulator,
    rng: R,
}

impl SampleGenerator<StdRng> {
    /// Seeds from `seed` when given, otherwise from OS entropy.
    pub fn from_config(
        machine: &MachineConfig,
        sensors: &SensorsConfig,
        seed: Option<u64>,
    ) -> Result<Self, ChannelConfigError> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::new(
            machine.id.clone(),
            sensors,
            machine.initial_status,
            rng,
            Utc::now(),
        )
    }
}

impl<R: Rng> SampleGenerator<R> {
    pub fn new(
        machine_id: impl Into<String>,
        sensors: &SensorsConfig,
        initial_status: MachineStatus,
        rng: R,
        started_at: DateTime<Utc>,
    ) -> Result<Self, ChannelConfigError> {
        Ok(Self {
            machine_id: machine_id.into(),
            bank: SensorBank::new(sensors)?,
            status: StatusModel::new(initial_status),
            uptime: UptimeAccumulator::new(started_at),
            rng,
        })
    }

    pub fn next(&mut self) -> Reading {
        self.next_at(Utc::now())
    }

    /// Samples as of `now`.
    ///
    /// Uptime is credited with the status that held before this tick; the
    /// transition decided here is committed afterwards and is the status
    /// carried by the returned reading.
    pub fn next_at(&mut self, now: DateTime<Utc>) -> Reading {
        let mut values = [0.0; 5];
        for (slot, kind) in values.iter_mut().zip(SensorKind::ALL) {
            let raw = self.bank.update(kind, &mut self.rng);
            let channel = self.bank.channel(kind);
            *slot = kind.precision().apply(raw, channel.min(), channel.max());
        }
        let [temperature, humidity, rpm, vibration, energy_kwh] = values;

        let previous = self.status.current();
        let uptime = self.uptime.accumulate(previous, now);

        let next_status = self.status.next_status(&mut self.rng);
        self.status.commit(next_status);

        Reading {
            timestamp: now,
            machine_id: self.machine_id.clone(),
            temperature,
            humidity,
            rpm: rpm as i64,
            vibration,
            energy_kwh,
            uptime,
            status: next_status,
        }
    }

    pub fn status(&self) -> MachineStatus {
        self.status.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 28, 10, 0, 0).unwrap()
    }

    fn generator(seed: u64, status: MachineStatus) -> SampleGenerator {
        SampleGenerator::new(
            "TEST-01",
            &SensorsConfig::default(),
            status,
            StdRng::seed_from_u64(seed),
            t0(),
        )
        .unwrap()
    }

    #[test]
    fn readings_stay_within_bounds() {
        let config = SensorsConfig::default();
        let mut generator = generator(11, MachineStatus::On);
        let mut now = t0();
        for _ in 0..5_000 {
            now += Duration::seconds(1);
            let reading = generator.next_at(now);
            for kind in SensorKind::ALL {
                let bounds = config.get(kind);
                let value = reading.value(kind);
                assert!(
                    value >= bounds.min && value <= bounds.max,
                    "{kind} = {value} outside [{}, {}]",
                    bounds.min,
                    bounds.max
                );
            }
        }
    }

    #[test]
    fn continuous_values_have_one_decimal() {
        let mut generator = generator(5, MachineStatus::On);
        for _ in 0..200 {
            let reading = generator.next_at(t0());
            for value in [
                reading.temperature,
                reading.humidity,
                reading.vibration,
                reading.energy_kwh,
            ] {
                let scaled = value * 10.0;
                assert!((scaled - scaled.round()).abs() < 1e-9, "{value}");
            }
        }
    }

    #[test]
    fn emitted_status_is_the_committed_one() {
        let mut generator = generator(21, MachineStatus::Off);
        let mut now = t0();
        for _ in 0..500 {
            now += Duration::seconds(1);
            let reading = generator.next_at(now);
            assert!(MachineStatus::ALL.contains(&reading.status));
            assert_eq!(reading.status, generator.status());
        }
    }

    #[test]
    fn uptime_uses_pre_transition_status() {
        let mut generator = generator(33, MachineStatus::On);
        let mut now = t0();
        let mut previous_uptime = 0;
        let mut status_before = generator.status();
        for _ in 0..2_000 {
            now += Duration::seconds(1);
            let reading = generator.next_at(now);
            assert!(reading.uptime >= previous_uptime);
            if status_before == MachineStatus::On {
                assert_eq!(reading.uptime, previous_uptime + 1);
            } else {
                assert_eq!(reading.uptime, previous_uptime);
            }
            previous_uptime = reading.uptime;
            status_before = reading.status;
        }
    }

    #[test]
    fn starting_off_accrues_nothing_on_first_tick() {
        let mut generator = generator(1, MachineStatus::Off);
        let reading = generator.next_at(t0() + Duration::seconds(30));
        assert_eq!(reading.uptime, 0);
    }

    #[test]
    fn seeded_generators_are_reproducible() {
        let mut a = generator(99, MachineStatus::On);
        let mut b = generator(99, MachineStatus::On);
        for _ in 0..50 {
            assert_eq!(a.next_at(t0()), b.next_at(t0()));
        }
    }

    #[test]
    fn narrow_rpm_range_reports_whole_numbers_inside_it() {
        let mut sensors = SensorsConfig::default();
        sensors.rpm = crate::config::SensorConfig::new(1.5, 0.5, 2.7, 1.0);
        let mut generator = SampleGenerator::new(
            "TEST-01",
            &sensors,
            MachineStatus::On,
            StdRng::seed_from_u64(4),
            t0(),
        )
        .unwrap();
        for _ in 0..500 {
            let rpm = generator.next_at(t0()).rpm;
            assert!((1..=2).contains(&rpm), "rpm {rpm} outside [0.5, 2.7]");
        }
    }

    #[test]
    fn rejects_invalid_sensor_config() {
        let mut sensors = SensorsConfig::default();
        sensors.temperature.variation = -2.0;
        let res = SampleGenerator::new(
            "X",
            &sensors,
            MachineStatus::On,
            StdRng::seed_from_u64(0),
            t0(),
        );
        assert!(res.is_err());
    }
}
