#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and calibration parsing for the scale device.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Calibration CSV loader enforces headers and performs a robust refit
//!   to reduce outlier influence before slope/intercept estimation.
use serde::Deserialize;
use serde::de::Deserializer;

/// Calibration CSV schema.
///
/// Expected headers:
/// raw,grams
///
/// Example:
/// raw,grams
/// 842913,0.0
/// 1024913,10000.0
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub raw: i64,
    pub grams: f32,
}

#[derive(Debug, Deserialize)]
pub struct Pins {
    pub hx711_dt: u8,
    pub hx711_sck: u8,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Hardware {
    /// Max time to wait for HX711 data-ready (DT low) before failing.
    pub sensor_read_timeout_ms: u64,
    /// HX711 gain/channel select, encoded as trailing clock pulses (25/26/27).
    pub gain_pulses: u8,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            sensor_read_timeout_ms: 150,
            gain_pulses: 25,
        }
    }
}

/// Event-capture state machine tunables (spec §4.D).
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct CaptureCfg {
    pub idle_poll_ms: u64,
    pub trigger_kg: f32,
    pub release_kg: f32,
    pub below_hold_ms: u64,
    pub active_max_ms: u64,
    pub max_samples: usize,
    pub arm_band_kg: f32,
    pub arm_stable_ms: u64,
    pub rise_min_kg: f32,
    pub post_active_cooldown_ms: u64,
    pub ema_alpha: f32,
    pub deadband_kg: f32,
    /// Applied to every converted read; flips cell polarity without rewiring.
    pub invert_sign: bool,
}

impl Default for CaptureCfg {
    fn default() -> Self {
        Self {
            idle_poll_ms: 200,
            trigger_kg: 4.00,
            release_kg: 3.00,
            below_hold_ms: 2000,
            active_max_ms: 90_000,
            max_samples: 6000,
            arm_band_kg: 1.0,
            arm_stable_ms: 2500,
            rise_min_kg: 0.20,
            post_active_cooldown_ms: 4000,
            ema_alpha: 0.1,
            deadband_kg: 0.005,
            invert_sign: false,
        }
    }
}

/// Stable-raw sampler tunables (spec §4.B), used by both the tare/calibration
/// flow and any on-device stable-read operation.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SamplerCfg {
    pub min_samples: usize,
    pub max_samples: usize,
    pub max_stddev_counts: f64,
    pub min_duration_ms: u64,
    /// Overall wall-clock bound on `read_stable_raw` (spec §4.B: "never
    /// fails"); a stalled ADC still returns the mean of whatever was
    /// collected rather than spinning forever.
    pub overall_timeout_ms: u64,
}

impl Default for SamplerCfg {
    fn default() -> Self {
        Self {
            min_samples: 16,
            max_samples: 200,
            max_stddev_counts: 50.0,
            min_duration_ms: 300,
            overall_timeout_ms: 12_000,
        }
    }
}

/// Calibration engine tunables (spec §4.C): tare budgets, plateau gate, cooldown.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct CalibrationCfg {
    pub tare_reads: usize,
    pub tare_per_read_timeout_ms: u64,
    pub tare_overall_timeout_ms: u64,
    pub settle_wait_ms: u64,
    /// Minimum absolute difference between two-point masses, in grams.
    pub min_mass_delta_g: f32,
    /// Plateau-gate window size in raw samples.
    pub plateau_window: usize,
    /// Plateau-gate per-window max stddev, in raw counts.
    pub plateau_max_stddev_counts: f64,
    /// Plateau-gate minimum combined stable duration.
    pub plateau_min_stable_ms: u64,
    pub phase_timeout_ms: u64,
    pub post_cal_cooldown_ms: u64,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            tare_reads: 20,
            tare_per_read_timeout_ms: 500,
            tare_overall_timeout_ms: 12_000,
            settle_wait_ms: 1500,
            min_mass_delta_g: 50.0,
            plateau_window: 20,
            plateau_max_stddev_counts: 2000.0,
            plateau_min_stable_ms: 1000,
            phase_timeout_ms: 60_000,
            post_cal_cooldown_ms: 4000,
        }
    }
}

/// A value given either as a flat clamp range `[lo, hi]` or an explicit table
/// `{ lo = ..., hi = ... }`. Mirrors the donor's dual-shape TOML tables
/// (there: per-band speed thresholds; here: detector gating clamp ranges).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClampToml {
    Tuple((f64, f64)),
    Table { lo: f64, hi: f64 },
}

fn de_clamp_range<'de, D>(deserializer: D) -> Result<(f64, f64), D::Error>
where
    D: Deserializer<'de>,
{
    let raw = ClampToml::deserialize(deserializer)?;
    Ok(match raw {
        ClampToml::Tuple(t) => t,
        ClampToml::Table { lo, hi } => (lo, hi),
    })
}

fn default_deriv_clamp() -> (f64, f64) {
    (0.01, 0.05)
}

fn default_std_clamp() -> (f64, f64) {
    (0.06, 0.20)
}

/// Plateau detector v6 tunables (spec §4.G). The algorithm's shape (Hampel
/// window, MAD scaling, moving-average/rolling-std window formulas) is fixed
/// by the specification; only the final gating clamp ranges are operator
/// overridable.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DetectorCfg {
    pub hampel_window: usize,
    pub hampel_threshold: f64,
    #[serde(deserialize_with = "de_clamp_range")]
    pub deriv_clamp: (f64, f64),
    #[serde(deserialize_with = "de_clamp_range")]
    pub std_clamp: (f64, f64),
    pub min_region_duration_s: f64,
    pub min_survivors: usize,
}

impl Default for DetectorCfg {
    fn default() -> Self {
        Self {
            hampel_window: 15,
            hampel_threshold: 4.0,
            deriv_clamp: default_deriv_clamp(),
            std_clamp: default_std_clamp(),
            min_region_duration_s: 3.0,
            min_survivors: 10,
        }
    }
}

/// Consensus refiner v2 tunables (spec §4.H).
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ConsensusCfg {
    pub band_kg: f64,
    /// Max number of recent raw weights pulled from history (N, up to 10).
    pub history_n: usize,
}

impl Default for ConsensusCfg {
    fn default() -> Self {
        Self {
            band_kg: 1.0,
            history_n: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,
    pub level: Option<String>,
    pub rotation: Option<String>,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            file: None,
            level: None,
            rotation: None,
        }
    }
}

/// Where captured events are sent (spec §4.E/§6).
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TransportCfg {
    pub endpoint_url: String,
    /// Header name carrying the shared secret; the secret value itself is
    /// read from the `FUNCTION_SECRET` environment variable, never from TOML.
    pub secret_header: String,
}

impl Default for TransportCfg {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            secret_header: "x-function-secret".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub hardware: Hardware,
    #[serde(default)]
    pub capture: CaptureCfg,
    #[serde(default)]
    pub sampler: SamplerCfg,
    #[serde(default)]
    pub calibration: CalibrationCfg,
    #[serde(default)]
    pub detector: DetectorCfg,
    #[serde(default)]
    pub consensus: ConsensusCfg,
    #[serde(default)]
    pub transport: TransportCfg,
    #[serde(default)]
    pub logging: Logging,
    /// Optional persisted calibration; preferred at runtime over CSV when present.
    #[serde(default)]
    pub persisted_calibration: Option<PersistedCalibration>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PersistedCalibration {
    /// counts per gram
    pub counts_per_gram: f32,
    /// tare zero in raw counts
    pub zero_counts: i32,
}

impl From<PersistedCalibration> for Calibration {
    fn from(p: PersistedCalibration) -> Self {
        Calibration {
            offset: p.zero_counts,
            scale_factor: p.counts_per_gram,
        }
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

#[derive(Debug, Clone, Copy)]
pub struct Calibration {
    pub offset: i32,
    pub scale_factor: f32,
}

impl Calibration {
    /// Build a `Calibration` from two-point (or multi-point) rows using
    /// ordinary least squares, then a single outlier-rejecting refit.
    /// Fits grams = a*raw + b, then converts to `grams = a*(raw - offset)`,
    /// where `offset = round(-b/a)` is the raw-count tare baseline.
    pub fn from_rows(rows: Vec<CalibrationRow>) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("calibration requires at least two rows, got {}", rows.len());
        }

        // Ensure strictly monotonic raw values (increasing or decreasing), no duplicates
        let mut dir: i8 = 0; // 1 for increasing, -1 for decreasing
        for i in 1..rows.len() {
            let d = rows[i].raw - rows[i - 1].raw;
            if d == 0 {
                eyre::bail!(
                    "calibration rows have duplicate raw values at index {} and {}",
                    i - 1,
                    i
                );
            }
            let step_dir = if d > 0 { 1 } else { -1 };
            if dir == 0 {
                dir = step_dir;
            } else if dir != step_dir {
                eyre::bail!(
                    "calibration raw values must be monotonic (strictly increasing or strictly decreasing)"
                );
            }
        }

        // Closure: OLS fit in f64 for numerical stability
        let fit = |pts: &[(i64, f32)]| -> eyre::Result<(f64, f64)> {
            let n = pts.len() as f64;
            let sum_x: f64 = pts.iter().map(|r| r.0 as f64).sum();
            let sum_y: f64 = pts.iter().map(|r| r.1 as f64).sum();
            let mean_x = sum_x / n;
            let mean_y = sum_y / n;
            let mut sxx = 0.0f64;
            let mut sxy = 0.0f64;
            for (rx, gy) in pts {
                let x = *rx as f64 - mean_x;
                let y = *gy as f64 - mean_y;
                sxx += x * x;
                sxy += x * y;
            }
            if !sxx.is_finite() || sxx == 0.0 {
                eyre::bail!("calibration cannot determine slope (degenerate X variance)");
            }
            let a = sxy / sxx;
            if !a.is_finite() {
                eyre::bail!("calibration produced non-finite slope");
            }
            if a == 0.0 {
                eyre::bail!("calibration produced zero slope (invalid scale factor)");
            }
            let b = mean_y - a * mean_x;
            Ok((a, b))
        };

        // Initial fit
        let pts: Vec<(i64, f32)> = rows.iter().map(|r| (r.raw, r.grams)).collect();
        let (a0, b0) = fit(&pts)?;
        // Compute robust sigma estimate (RMS of residuals) without allocating residuals
        let mut sumsq: f64 = 0.0;
        for (x, y) in &pts {
            let r = (*y as f64) - (a0 * (*x as f64) + b0);
            sumsq += r * r;
        }
        let n_pts = pts.len();
        let rms = if n_pts == 0 {
            0.0
        } else {
            (sumsq / (n_pts as f64)).sqrt()
        };

        // Reject outliers with |residual| > 2*rms and refit if at least 2 remain.
        let (a, b) = robust_refit(&pts, a0, b0, rms, 2.0).unwrap_or((a0, b0));

        // Convert to core representation: grams = a * (raw - offset)
        if a == 0.0 {
            eyre::bail!("calibration slope is zero, cannot compute tare baseline");
        }
        let zero_counts = -b / a; // where grams == 0
        if !zero_counts.is_finite() {
            eyre::bail!("calibration produced invalid tare baseline");
        }
        let offset_i32 = zero_counts.round() as i32;

        Ok(Calibration {
            offset: offset_i32,
            scale_factor: a as f32,
        })
    }
}

/// Perform a single-step robust refit by rejecting outliers defined by
/// `|residual| > k * rms` around the initial line `y = a0*x + b0`. Uses an
/// online (Welford/Chan) covariance update over inliers only. Returns `None`
/// when refit is not applicable (non-finite/zero rms, fewer than 2 inliers,
/// or degenerate variance), in which case the caller keeps `(a0, b0)`.
fn robust_refit(pts: &[(i64, f32)], a0: f64, b0: f64, rms: f64, k: f64) -> Option<(f64, f64)> {
    if !(rms.is_finite() && rms > 0.0 && k.is_finite() && k > 0.0) {
        return None;
    }
    let n_pts = pts.len();
    if n_pts < 2 {
        return None;
    }

    let thr = k * rms;
    let mut n_in: usize = 0;
    let mut mean_x = 0.0f64;
    let mut mean_y = 0.0f64;
    let mut cxx = 0.0f64;
    let mut cxy = 0.0f64;

    for (x_i, y_i) in pts.iter() {
        let x = *x_i as f64;
        let y = *y_i as f64;
        let r = y - (a0 * x + b0);
        if r.abs() <= thr {
            n_in += 1;
            let n_new = n_in as f64;
            let dx = x - mean_x;
            let dy = y - mean_y;
            let mean_x_new = mean_x + dx / n_new;
            let mean_y_new = mean_y + dy / n_new;
            cxx += dx * (x - mean_x_new);
            cxy += dx * (y - mean_y_new);
            mean_x = mean_x_new;
            mean_y = mean_y_new;
        }
    }

    if n_in >= 2 && n_in < n_pts {
        if !cxx.is_finite() || cxx == 0.0 {
            return None;
        }
        let a = cxy / cxx;
        if !a.is_finite() || a == 0.0 {
            return None;
        }
        let b = mean_y - a * mean_x;
        Some((a, b))
    } else {
        None
    }
}

impl TryFrom<Vec<CalibrationRow>> for Calibration {
    type Error = eyre::Report;
    fn try_from(rows: Vec<CalibrationRow>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

impl TryFrom<&[CalibrationRow]> for Calibration {
    type Error = eyre::Report;
    fn try_from(rows: &[CalibrationRow]) -> Result<Self, Self::Error> {
        Self::from_rows(rows.to_vec())
    }
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<Calibration> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["raw", "grams"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers 'raw,grams', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    Calibration::try_from(rows)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.hardware.sensor_read_timeout_ms == 0 {
            eyre::bail!("hardware.sensor_read_timeout_ms must be >= 1");
        }
        if !(25..=27).contains(&self.hardware.gain_pulses) {
            eyre::bail!("hardware.gain_pulses must be one of 25, 26, 27");
        }

        let c = &self.capture;
        if c.idle_poll_ms == 0 {
            eyre::bail!("capture.idle_poll_ms must be >= 1");
        }
        if c.trigger_kg <= c.release_kg {
            eyre::bail!("capture.trigger_kg must be greater than capture.release_kg");
        }
        if c.arm_band_kg < 0.0 {
            eyre::bail!("capture.arm_band_kg must be >= 0");
        }
        if c.rise_min_kg < 0.0 {
            eyre::bail!("capture.rise_min_kg must be >= 0");
        }
        if !(0.0..=1.0).contains(&c.ema_alpha) {
            eyre::bail!("capture.ema_alpha must be in [0.0, 1.0]");
        }
        if c.max_samples == 0 {
            eyre::bail!("capture.max_samples must be >= 1");
        }

        let s = &self.sampler;
        if s.min_samples == 0 {
            eyre::bail!("sampler.min_samples must be >= 1");
        }
        if s.max_samples < s.min_samples {
            eyre::bail!("sampler.max_samples must be >= sampler.min_samples");
        }
        if s.max_samples < 128 {
            eyre::bail!("sampler.max_samples must be >= 128");
        }
        if s.overall_timeout_ms == 0 {
            eyre::bail!("sampler.overall_timeout_ms must be >= 1");
        }

        let cal = &self.calibration;
        if cal.tare_reads == 0 {
            eyre::bail!("calibration.tare_reads must be >= 1");
        }
        if cal.min_mass_delta_g <= 0.0 {
            eyre::bail!("calibration.min_mass_delta_g must be > 0");
        }
        if cal.plateau_window < 2 {
            eyre::bail!("calibration.plateau_window must be >= 2");
        }

        let d = &self.detector;
        if d.hampel_window == 0 {
            eyre::bail!("detector.hampel_window must be >= 1");
        }
        if d.deriv_clamp.0 >= d.deriv_clamp.1 {
            eyre::bail!("detector.deriv_clamp must have lo < hi");
        }
        if d.std_clamp.0 >= d.std_clamp.1 {
            eyre::bail!("detector.std_clamp must have lo < hi");
        }
        if d.min_region_duration_s <= 0.0 {
            eyre::bail!("detector.min_region_duration_s must be > 0");
        }

        let k = &self.consensus;
        if k.band_kg <= 0.0 {
            eyre::bail!("consensus.band_kg must be > 0");
        }
        if k.history_n == 0 || k.history_n > 10 {
            eyre::bail!("consensus.history_n must be in 1..=10");
        }

        Ok(())
    }
}
