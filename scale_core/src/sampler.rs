//! Stable-raw sampler (spec §4.B).
//!
//! Produces a single denoised raw average by collecting ADC samples until
//! dispersion is low or a capped sample count is reached. Used both by the
//! calibration engine's tare/plateau-gate flow and anywhere else a single
//! stable raw reading is needed.
use scale_traits::AdcReader;
use scale_traits::clock::Clock;
use std::time::Duration;

/// Internal floor on `max_samples`: a caller-specified cap below this is
/// raised, per spec §4.B edge cases ("capped at an internal bound, >= 128").
const MAX_SAMPLES_FLOOR: usize = 128;

#[derive(Debug, Clone, Copy)]
pub struct StableRawParams {
    pub min_samples: usize,
    pub max_samples: usize,
    pub max_stddev_counts: f64,
    pub min_duration_ms: u64,
    pub read_timeout: Duration,
    /// Overall wall-clock bound mirroring `TareParams::overall_timeout`: if
    /// every read errors, this still ends the loop rather than spinning
    /// forever (spec §4.B: "never fails").
    pub overall_timeout: Duration,
}

/// Collect raw samples until `n >= min_samples` AND elapsed >= `min_duration_ms`.
/// If the stddev of the collected samples is <= `max_stddev_counts`, returns
/// their rounded mean. If `max_samples` is reached first, or the overall
/// timeout elapses first (e.g. every read is erroring), returns the mean of
/// whatever was collected so far. Never fails (worst case: a less-stable, or
/// empty, mean).
pub fn read_stable_raw(adc: &mut dyn AdcReader, clock: &dyn Clock, params: &StableRawParams) -> i32 {
    let min_samples = params.min_samples.max(1);
    let max_samples = params.max_samples.max(MAX_SAMPLES_FLOOR);

    let start = clock.now();
    let mut samples: Vec<i32> = Vec::with_capacity(max_samples.min(256));

    loop {
        if samples.len() >= max_samples {
            break;
        }
        if clock.ms_since(start) >= params.overall_timeout.as_millis() as u64 {
            break;
        }
        if let Ok(v) = adc.read(params.read_timeout) {
            samples.push(v);
        }
        // A single flaky read is non-fatal; keep collecting, still bounded
        // by max_samples and overall_timeout.

        let elapsed_ms = clock.ms_since(start);
        let have_enough = samples.len() >= min_samples && elapsed_ms >= params.min_duration_ms;
        if have_enough {
            let sd = sample_stddev(&samples);
            if sd <= params.max_stddev_counts {
                break;
            }
        }
    }

    round_mean(&samples)
}

fn sample_stddev(x: &[i32]) -> f64 {
    if x.len() < 2 {
        return 0.0;
    }
    let n = x.len() as f64;
    let mean = x.iter().map(|v| *v as f64).sum::<f64>() / n;
    let var = x.iter().map(|v| (*v as f64 - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.sqrt()
}

fn round_mean(x: &[i32]) -> i32 {
    if x.is_empty() {
        return 0;
    }
    let n = x.len() as f64;
    let mean = x.iter().map(|v| *v as f64).sum::<f64>() / n;
    mean.round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use scale_traits::clock::test_clock::TestClock;
    use std::cell::Cell;

    struct StepAdc {
        values: Vec<i32>,
        idx: Cell<usize>,
    }

    impl AdcReader for StepAdc {
        fn read(&mut self, _timeout: Duration) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
            let i = self.idx.get();
            let v = self.values[i.min(self.values.len() - 1)];
            self.idx.set(i + 1);
            Ok(v)
        }
    }

    #[test]
    fn stable_readings_average_quickly() {
        let mut adc = StepAdc {
            values: vec![1000; 50],
            idx: Cell::new(0),
        };
        let clock = TestClock::new();
        let params = StableRawParams {
            min_samples: 16,
            max_samples: 200,
            max_stddev_counts: 5.0,
            min_duration_ms: 0,
            read_timeout: Duration::from_millis(10),
            overall_timeout: Duration::from_secs(12),
        };
        let result = read_stable_raw(&mut adc, &clock, &params);
        assert_eq!(result, 1000);
    }

    #[test]
    fn caps_at_max_samples_when_never_stable() {
        let mut adc = StepAdc {
            values: (0..300).map(|i| i * 1000).collect(),
            idx: Cell::new(0),
        };
        let clock = TestClock::new();
        let params = StableRawParams {
            min_samples: 1,
            max_samples: 150,
            max_stddev_counts: 1.0,
            min_duration_ms: 0,
            read_timeout: Duration::from_millis(10),
            overall_timeout: Duration::from_secs(12),
        };
        let result = read_stable_raw(&mut adc, &clock, &params);
        let expected = (0..150i64).sum::<i64>() as f64 / 150.0 * 1000.0;
        assert!((result as f64 - expected).abs() < 1.0);
    }

    #[test]
    fn max_samples_is_floored_internally() {
        let mut adc = StepAdc {
            values: vec![42; 10],
            idx: Cell::new(0),
        };
        let clock = TestClock::new();
        let params = StableRawParams {
            min_samples: 1,
            max_samples: 4, // below the internal floor
            max_stddev_counts: 0.0,
            min_duration_ms: 0,
            read_timeout: Duration::from_millis(10),
            overall_timeout: Duration::from_secs(12),
        };
        let result = read_stable_raw(&mut adc, &clock, &params);
        assert_eq!(result, 42);
    }

    /// An ADC that errors on every read but advances the shared clock by
    /// `read_timeout` each call, the way a real blocking driver's internal
    /// timeout would consume wall-clock time.
    struct AlwaysErrsAdc {
        clock: TestClock,
        read_timeout: Duration,
    }

    impl AdcReader for AlwaysErrsAdc {
        fn read(&mut self, _timeout: Duration) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
            self.clock.advance(self.read_timeout);
            Err(Box::new(std::io::Error::other("no data")))
        }
    }

    #[test]
    fn overall_timeout_bounds_an_adc_that_never_succeeds() {
        let clock = TestClock::new();
        let read_timeout = Duration::from_millis(50);
        let mut adc = AlwaysErrsAdc { clock: clock.clone(), read_timeout };
        let params = StableRawParams {
            min_samples: 1,
            max_samples: 128,
            max_stddev_counts: 5.0,
            min_duration_ms: 0,
            read_timeout,
            overall_timeout: Duration::from_millis(500),
        };
        let result = read_stable_raw(&mut adc, &clock, &params);
        // No samples were ever collected; the mean of an empty set is 0.
        assert_eq!(result, 0);
    }
}
