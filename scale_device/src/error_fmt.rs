//! Human-readable error descriptions and structured JSON error formatting.

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use scale_core::error::{CalibrationError, CaptureError, DetectorError};

    if let Some(ce) = err.downcast_ref::<CaptureError>() {
        return match ce {
            CaptureError::Sensor(msg) => format!(
                "What happened: The HX711 reported a sensor error ({msg}).\nLikely causes: Loose wiring, power brown-out, or a read issued while the chip was mid-conversion.\nHow to fix: Check DT/SCK wiring and 5V/GND, then retry."
            ),
            CaptureError::Timeout => {
                "What happened: Sensor read timed out.\nLikely causes: HX711 not wired correctly, no power/ground, or hardware.sensor_read_timeout_ms set too low.\nHow to fix: Verify DT/SCK pins and power, then raise hardware.sensor_read_timeout_ms in the config.".to_string()
            }
            CaptureError::Config(msg) => format!(
                "What happened: Invalid capture configuration ({msg}).\nLikely causes: An out-of-range or missing value in the [capture] table.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<CalibrationError>() {
        return match ce {
            CalibrationError::TareFailed(msg) => format!(
                "What happened: Tare failed ({msg}).\nLikely causes: No successful reads completed within the tare timeout.\nHow to fix: Check sensor wiring, or raise calibration.tare_overall_timeout_ms."
            ),
            CalibrationError::PlateauTimeout => {
                "What happened: Calibration timed out waiting for a stable reading.\nLikely causes: The scale never settled, or plateau_max_stddev_counts is too tight for this load cell.\nHow to fix: Keep the scale still and unloaded/loaded as instructed, or relax calibration.plateau_max_stddev_counts.".to_string()
            }
            CalibrationError::MassDeltaTooSmall {
                min_delta_g,
                actual_g,
            } => format!(
                "What happened: Two-point calibration legs were too close together (need >= {min_delta_g} g, got {actual_g} g).\nLikely causes: cal1 and cal2 were run with nearly the same known mass.\nHow to fix: Re-run cal1/cal2 with masses further apart, or lower calibration.min_mass_delta_g."
            ),
            CalibrationError::Sensor(msg) => format!(
                "What happened: A sensor error occurred during calibration ({msg}).\nLikely causes: Loose wiring or a transient HX711 fault.\nHow to fix: Check wiring and retry."
            ),
            CalibrationError::Persist(msg) => format!(
                "What happened: Failed to persist the calibration ({msg}).\nLikely causes: --state-dir is not writable, or the disk is full.\nHow to fix: Check permissions and free space on the state directory."
            ),
        };
    }

    if let Some(de) = err.downcast_ref::<DetectorError>() {
        return match de {
            DetectorError::EmptySeries => {
                "What happened: The detector was asked to analyze an empty sample series.\nLikely causes: An event was captured with zero samples.\nHow to fix: This indicates a bug in the capture loop; file an issue with the device log.".to_string()
            }
        };
    }

    // String-based heuristics for errors coming from config load, transport, or I/O.
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("function_secret") {
        return "What happened: The FUNCTION_SECRET environment variable is not set.\nLikely causes: The ingest transport needs a shared secret that is intentionally kept out of the TOML config.\nHow to fix: Export FUNCTION_SECRET before running `run`.".to_string();
    }

    if lower.contains("endpoint_url") {
        return "What happened: No ingest endpoint is configured.\nLikely causes: [transport] endpoint_url is empty in the config.\nHow to fix: Set transport.endpoint_url to the ingest endpoint's URL.".to_string();
    }

    if lower.contains("open hx711") || (lower.contains("pin") && lower.contains("missing")) {
        return "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect [pins] values or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO.".to_string();
    }

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'raw,grams'.".to_string();
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Map known error categories to stable exit codes; everything else returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use scale_core::error::{CalibrationError, CaptureError};

    if let Some(ce) = err.downcast_ref::<CaptureError>() {
        return match ce {
            CaptureError::Timeout => 2,
            CaptureError::Sensor(_) => 3,
            CaptureError::Config(_) => 4,
        };
    }
    if let Some(ce) = err.downcast_ref::<CalibrationError>() {
        return match ce {
            CalibrationError::PlateauTimeout => 5,
            CalibrationError::TareFailed(_) => 6,
            CalibrationError::MassDeltaTooSmall { .. } => 7,
            CalibrationError::Sensor(_) => 3,
            CalibrationError::Persist(_) => 8,
        };
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    json!({ "reason": "Error", "exit_code": exit_code_for_error(err), "message": humanize(err) })
        .to_string()
}
