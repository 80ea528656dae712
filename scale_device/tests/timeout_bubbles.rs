//! The humanized message for a sensor timeout must mention the exact phrase
//! operators grep their logs for, regardless of which command surfaced it.

#[path = "../src/error_fmt.rs"]
mod error_fmt;

#[test]
fn hx711_timeout_humanizes_to_a_grep_friendly_message() {
    let err = eyre::Report::new(scale_core::error::CaptureError::Timeout);
    let msg = error_fmt::humanize(&err);
    assert!(msg.contains("Sensor read timed out"));
    assert_eq!(error_fmt::exit_code_for_error(&err), 2);
}

#[test]
fn plateau_timeout_humanizes_with_a_fix_hint() {
    let err = eyre::Report::new(scale_core::error::CalibrationError::PlateauTimeout);
    let msg = error_fmt::humanize(&err);
    assert!(msg.contains("timed out waiting for a stable reading"));
    assert_eq!(error_fmt::exit_code_for_error(&err), 5);
}
