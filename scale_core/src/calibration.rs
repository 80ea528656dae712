//! Calibration engine (spec §4.C): tare, single-/two-point gain derivation,
//! a plateau gate that precedes the actual measurement, and durable
//! persistence of the resulting constant.
//!
//! Tare + plateau-gate logic has no donor analog (the donor calibrates a
//! motor-dosing gain, not a tare/plateau-gated scale zero) and is built
//! fresh here in the donor's validation style (typed errors, explicit
//! timeouts via `Clock`). Single-point settle-then-sample is grounded in
//! the crungo weight-monitor's `calibrate_weight_sensor` (fixed-duration
//! sample collection, persist-then-broadcast); two-point regression mirrors
//! `scale_config::Calibration::from_rows`'s slope/intercept shape.
use crate::atomic::write_atomic;
use crate::error::CalibrationError;
use crate::sampler::{StableRawParams, read_stable_raw};
use scale_traits::AdcReader;
use scale_traits::clock::Clock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct TareParams {
    pub reads: usize,
    pub per_read_timeout: Duration,
    pub overall_timeout: Duration,
}

/// Average `params.reads` raw reads to obtain a zero offset. If zero reads
/// succeed within the overall timeout, tare fails.
pub fn tare(adc: &mut dyn AdcReader, clock: &dyn Clock, params: &TareParams) -> Result<i32, CalibrationError> {
    let start = clock.now();
    let mut sum: i64 = 0;
    let mut n: usize = 0;
    for _ in 0..params.reads {
        if clock.ms_since(start) >= params.overall_timeout.as_millis() as u64 {
            break;
        }
        if let Ok(v) = adc.read(params.per_read_timeout) {
            sum += i64::from(v);
            n += 1;
        }
    }
    if n == 0 {
        return Err(CalibrationError::TareFailed(
            "no successful reads within tare timeout".to_string(),
        ));
    }
    Ok((sum as f64 / n as f64).round() as i32)
}

#[derive(Debug, Clone, Copy)]
pub struct PlateauGateParams {
    pub window: usize,
    pub max_stddev_counts: f64,
    pub min_stable_ms: u64,
    pub phase_timeout: Duration,
}

/// Wait for two consecutive low-dispersion raw windows whose means differ by
/// no more than `max(1% of |mean|, 2000 counts)`, with combined stable
/// duration at or above `min_stable_ms`. Returns the mean of the second
/// (most recent) window. Times out with `PlateauTimeout`.
pub fn wait_for_plateau(
    adc: &mut dyn AdcReader,
    clock: &dyn Clock,
    read_timeout: Duration,
    params: &PlateauGateParams,
) -> Result<i32, CalibrationError> {
    const MIN_DIFF_FLOOR_COUNTS: f64 = 2000.0;
    let start = clock.now();
    let window = params.window.max(2);

    let mut buf: VecDeque<i32> = VecDeque::with_capacity(window);
    let mut window_start_ms: u64 = 0;
    let mut prev_mean: Option<f64> = None;
    let mut prev_window_start_ms: Option<u64> = None;

    loop {
        if clock.ms_since(start) >= params.phase_timeout.as_millis() as u64 {
            return Err(CalibrationError::PlateauTimeout);
        }

        let Ok(v) = adc.read(read_timeout) else {
            continue;
        };
        if buf.is_empty() {
            window_start_ms = clock.ms_since(start);
        }
        buf.push_back(v);
        if buf.len() < window {
            continue;
        }

        let now_ms = clock.ms_since(start);
        let values: Vec<f64> = buf.iter().map(|x| *x as f64).collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let sd = sample_stddev(&values, mean);

        if sd <= params.max_stddev_counts {
            if let (Some(pm), Some(pws)) = (prev_mean, prev_window_start_ms) {
                let tol = (0.01 * mean.abs()).max(MIN_DIFF_FLOOR_COUNTS);
                if (mean - pm).abs() <= tol {
                    let combined_ms = now_ms.saturating_sub(pws);
                    if combined_ms >= params.min_stable_ms {
                        return Ok(mean.round() as i32);
                    }
                }
            }
            prev_mean = Some(mean);
            prev_window_start_ms = Some(window_start_ms);
            buf.clear();
        } else {
            prev_mean = None;
            prev_window_start_ms = None;
            buf.clear();
        }
    }
}

fn sample_stddev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

#[derive(Debug, Clone, Copy)]
pub struct CalibrationResult {
    pub counts_per_gram: f32,
    pub zero_counts: i32,
}

/// Single-point calibration: settle, gate on a plateau, sample a stable raw
/// reading, derive `counts_per_gram = (r - zero_counts) / m_g`.
pub fn calibrate_single_point(
    adc: &mut dyn AdcReader,
    clock: &dyn Clock,
    settle_wait: Duration,
    read_timeout: Duration,
    gate: &PlateauGateParams,
    stable: &StableRawParams,
    zero_counts: i32,
    mass_g: f32,
) -> Result<CalibrationResult, CalibrationError> {
    if mass_g.abs() < f32::EPSILON {
        return Err(CalibrationError::TareFailed(
            "known mass must be non-zero".to_string(),
        ));
    }
    clock.sleep(settle_wait);
    wait_for_plateau(adc, clock, read_timeout, gate)?;
    let r = read_stable_raw(adc, clock, stable);
    let delta = f64::from(r - zero_counts);
    let counts_per_gram = (delta / f64::from(mass_g)) as f32;
    Ok(CalibrationResult {
        counts_per_gram,
        zero_counts,
    })
}

/// One leg of a two-point calibration: gate on a plateau, then sample a
/// stable raw reading for the placed mass.
pub fn capture_two_point_leg(
    adc: &mut dyn AdcReader,
    clock: &dyn Clock,
    settle_wait: Duration,
    read_timeout: Duration,
    gate: &PlateauGateParams,
    stable: &StableRawParams,
) -> Result<i32, CalibrationError> {
    clock.sleep(settle_wait);
    wait_for_plateau(adc, clock, read_timeout, gate)?;
    Ok(read_stable_raw(adc, clock, stable))
}

/// Two-point calibration: `counts_per_gram = (r2 - r1) / (m2 - m1)`, with the
/// zero offset derived as the raw count at which the line crosses zero mass.
pub fn calibrate_two_point(
    r1: i32,
    m1_g: f32,
    r2: i32,
    m2_g: f32,
    min_mass_delta_g: f32,
) -> Result<CalibrationResult, CalibrationError> {
    let delta_m = (m2_g - m1_g).abs();
    if delta_m < min_mass_delta_g {
        return Err(CalibrationError::MassDeltaTooSmall {
            min_delta_g: min_mass_delta_g,
            actual_g: delta_m,
        });
    }
    let counts_per_gram = (f64::from(r2 - r1) / f64::from(m2_g - m1_g)) as f32;
    // Where grams == 0: r1 - m1 * counts_per_gram.
    let zero_counts = (f64::from(r1) - f64::from(m1_g) * f64::from(counts_per_gram)).round() as i32;
    Ok(CalibrationResult {
        counts_per_gram,
        zero_counts,
    })
}

/// Durable storage for the calibration constant (spec §6: device NVS
/// namespace "autoscale", key "cal"). Backed by an atomic file write in this
/// re-implementation; erasable to a compile-time default via `reset`.
pub trait CalibrationStore {
    fn save(&self, result: &CalibrationResult) -> Result<(), CalibrationError>;
    fn load(&self) -> Option<CalibrationResult>;
    fn reset(&self) -> Result<(), CalibrationError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCalibration {
    counts_per_gram: f32,
    zero_counts: i32,
}

/// Compile-time default applied after `reset()` or when no persisted value
/// exists.
pub const DEFAULT_CALIBRATION: CalibrationResult = CalibrationResult {
    counts_per_gram: 1.0,
    zero_counts: 0,
};

pub struct FileCalibrationStore {
    path: PathBuf,
}

impl FileCalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CalibrationStore for FileCalibrationStore {
    fn save(&self, result: &CalibrationResult) -> Result<(), CalibrationError> {
        let persisted = PersistedCalibration {
            counts_per_gram: result.counts_per_gram,
            zero_counts: result.zero_counts,
        };
        let bytes = serde_json::to_vec_pretty(&persisted)
            .map_err(|e| CalibrationError::Persist(e.to_string()))?;
        write_atomic(&self.path, &bytes).map_err(|e| CalibrationError::Persist(e.to_string()))
    }

    fn load(&self) -> Option<CalibrationResult> {
        let bytes = std::fs::read(&self.path).ok()?;
        let persisted: PersistedCalibration = serde_json::from_slice(&bytes).ok()?;
        Some(CalibrationResult {
            counts_per_gram: persisted.counts_per_gram,
            zero_counts: persisted.zero_counts,
        })
    }

    fn reset(&self) -> Result<(), CalibrationError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CalibrationError::Persist(e.to_string())),
        }
    }
}

/// Load the persisted calibration, or `DEFAULT_CALIBRATION` if absent.
pub fn load_or_default(store: &dyn CalibrationStore) -> CalibrationResult {
    store.load().unwrap_or(DEFAULT_CALIBRATION)
}

pub fn calibration_store_path(base_dir: &Path) -> PathBuf {
    base_dir.join("autoscale.cal.json")
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
    fn tare_averages_reads() {
        let mut adc = StepAdc {
            values: vec![100, 102, 98, 100],
            idx: Cell::new(0),
        };
        let clock = TestClock::new();
        let params = TareParams {
            reads: 4,
            per_read_timeout: Duration::from_millis(10),
            overall_timeout: Duration::from_secs(12),
        };
        let zero = tare(&mut adc, &clock, &params).unwrap();
        assert_eq!(zero, 100);
    }

    #[test]
    fn tare_fails_when_adc_never_responds() {
        struct DeadAdc;
        impl AdcReader for DeadAdc {
            fn read(&mut self, _timeout: Duration) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
                Err(Box::new(std::io::Error::other("no data")))
            }
        }
        let mut adc = DeadAdc;
        let clock = TestClock::new();
        let params = TareParams {
            reads: 3,
            per_read_timeout: Duration::from_millis(10),
            overall_timeout: Duration::from_millis(10),
        };
        let err = tare(&mut adc, &clock, &params).unwrap_err();
        assert!(matches!(err, CalibrationError::TareFailed(_)));
    }

    #[test]
    fn two_point_rejects_too_small_mass_delta() {
        let err = calibrate_two_point(1000, 0.0, 1010, 10.0, 50.0).unwrap_err();
        assert!(matches!(err, CalibrationError::MassDeltaTooSmall { .. }));
    }

    #[test]
    fn two_point_computes_expected_gain() {
        // r1=0 counts at 0g, r2=100000 counts at 1000g -> 100 counts/gram.
        let result = calibrate_two_point(0, 0.0, 100_000, 1000.0, 50.0).unwrap();
        assert!((result.counts_per_gram - 100.0).abs() < 1e-6);
        assert_eq!(result.zero_counts, 0);
    }

    #[test]
    fn persist_roundtrips_through_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCalibrationStore::new(calibration_store_path(dir.path()));
        assert!(store.load().is_none());
        let result = CalibrationResult {
            counts_per_gram: 42.5,
            zero_counts: 123,
        };
        store.save(&result).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.zero_counts, 123);
        assert!((loaded.counts_per_gram - 42.5).abs() < 1e-6);

        store.reset().unwrap();
        assert!(store.load().is_none());
        assert_eq!(
            load_or_default(&store).counts_per_gram,
            DEFAULT_CALIBRATION.counts_per_gram
        );
    }

    #[test]
    fn plateau_gate_times_out_on_noisy_signal() {
        let mut adc = StepAdc {
            values: (0..50).map(|i| i * 10_000).collect(),
            idx: Cell::new(0),
        };
        let clock = TestClock::new();
        let params = PlateauGateParams {
            window: 5,
            max_stddev_counts: 10.0,
            min_stable_ms: 500,
            phase_timeout: Duration::from_millis(0),
        };
        let err = wait_for_plateau(&mut adc, &clock, Duration::from_millis(10), &params).unwrap_err();
        assert!(matches!(err, CalibrationError::PlateauTimeout));
    }
}
