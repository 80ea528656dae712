//! Assembles the ADC, transport, and capture state machine from config, and
//! drives the IDLE/ACTIVE event-capture loop (spec §4.D) until shutdown.

use scale_config::Config;
use scale_core::capture::{CaptureMachine, CaptureParams, Conversion};
use scale_traits::AdcReader;
use scale_traits::clock::MonotonicClock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::transport::HttpEventTransport;

pub fn capture_params(cfg: &Config) -> CaptureParams {
    let c = &cfg.capture;
    CaptureParams {
        idle_poll_ms: c.idle_poll_ms,
        read_timeout: Duration::from_millis(cfg.hardware.sensor_read_timeout_ms),
        trigger_kg: f64::from(c.trigger_kg),
        release_kg: f64::from(c.release_kg),
        below_hold_ms: c.below_hold_ms,
        active_max_ms: c.active_max_ms,
        max_samples: c.max_samples,
        arm_band_kg: f64::from(c.arm_band_kg),
        arm_stable_ms: c.arm_stable_ms,
        rise_min_kg: f64::from(c.rise_min_kg),
        post_active_cooldown_ms: c.post_active_cooldown_ms,
        ema_alpha: f64::from(c.ema_alpha),
        deadband_kg: f64::from(c.deadband_kg),
        invert_sign: c.invert_sign,
    }
}

pub fn conversion_from(cfg: &Config, counts_per_gram: f32, zero_counts: i32) -> Conversion {
    Conversion {
        counts_per_gram,
        zero_counts,
        invert_sign: cfg.capture.invert_sign,
        deadband_kg: f64::from(cfg.capture.deadband_kg),
    }
}

pub fn build_transport(cfg: &Config) -> eyre::Result<HttpEventTransport> {
    if cfg.transport.endpoint_url.is_empty() {
        eyre::bail!("transport.endpoint_url is not configured");
    }
    let secret = std::env::var("FUNCTION_SECRET")
        .map_err(|_| eyre::eyre!("FUNCTION_SECRET environment variable is not set"))?;
    Ok(HttpEventTransport::new(
        cfg.transport.endpoint_url.clone(),
        cfg.transport.secret_header.clone(),
        secret,
    ))
}

/// Run the IDLE/ACTIVE loop until `shutdown` is set, emitting one captured
/// event per cycle to `transport`. Transport failures are logged and
/// non-fatal; the device always returns to IDLE.
pub fn run_capture_loop(
    device_id: &str,
    adc: &mut dyn AdcReader,
    params: CaptureParams,
    conversion: Conversion,
    transport: &mut HttpEventTransport,
    shutdown: Arc<AtomicBool>,
) -> eyre::Result<()> {
    let clock = MonotonicClock::new();
    let mut machine = CaptureMachine::new(adc, &clock, params, conversion);

    tracing::info!(device_id, "entering IDLE/ACTIVE capture loop");
    while !shutdown.load(Ordering::Relaxed) {
        match machine.capture_one(device_id, transport) {
            Ok(event) => {
                tracing::info!(
                    device_id,
                    sample_count = event.sample_count,
                    peak_kg = event.peak_kg,
                    "event captured"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "capture cycle failed");
                return Err(eyre::eyre!("capture cycle failed: {e}"));
            }
        }
    }
    tracing::info!("shutdown requested; exiting capture loop");
    Ok(())
}
