//! Error taxonomy for the scale core: one `thiserror` enum per subsystem,
//! plus a shared `eyre`-backed `Result` alias for call sites that need to
//! attach context across subsystem boundaries.
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum CaptureError {
    #[error("sensor read error: {0}")]
    Sensor(String),
    #[error("sensor read timeout")]
    Timeout,
    #[error("invalid configuration: {0}")]
    Config(&'static str),
}

#[derive(Debug, Error, Clone)]
pub enum CalibrationError {
    #[error("tare failed: {0}")]
    TareFailed(String),
    #[error("plateau gate timed out waiting for a stable reading")]
    PlateauTimeout,
    #[error("two-point calibration requires |m2 - m1| >= {min_delta_g} g, got {actual_g}")]
    MassDeltaTooSmall { min_delta_g: f32, actual_g: f32 },
    #[error("sensor error during calibration: {0}")]
    Sensor(String),
    #[error("persistence error: {0}")]
    Persist(String),
}

#[derive(Debug, Error, Clone)]
pub enum DetectorError {
    #[error("no samples to analyze")]
    EmptySeries,
}

/// Shared `eyre`-backed result alias for call sites (CLI, HTTP handlers) that
/// attach `.wrap_err(...)` context across subsystem boundaries.
pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_error_display_is_stable() {
        assert_eq!(CaptureError::Timeout.to_string(), "sensor read timeout");
    }

    #[test]
    fn calibration_error_mass_delta_message() {
        let e = CalibrationError::MassDeltaTooSmall {
            min_delta_g: 50.0,
            actual_g: 3.0,
        };
        assert!(e.to_string().contains("50"));
    }
}
