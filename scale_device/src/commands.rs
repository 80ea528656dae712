//! Implementations for every CLI/serial-CLI command (spec §4.C, §6).
//!
//! All commands operate against a [`DeviceContext`] so the clap front-end and
//! the line-oriented serial REPL share one code path, matching the spec's
//! note that device state should bind to a single owning value rather than
//! module statics.

use scale_config::Config;
use scale_core::calibration::{
    CalibrationResult, CalibrationStore, FileCalibrationStore, PlateauGateParams, TareParams,
    calibrate_single_point, calibrate_two_point, capture_two_point_leg, load_or_default, tare,
};
use scale_core::sampler::StableRawParams;
use scale_traits::AdcReader;
use scale_traits::clock::Clock;
use std::time::Duration;

use crate::twopoint::TwoPointStore;

pub struct DeviceContext {
    pub adc: Box<dyn AdcReader>,
    pub clock: Box<dyn Clock>,
    pub cfg: Config,
    pub cal_store: FileCalibrationStore,
    pub two_point: TwoPointStore,
}

impl DeviceContext {
    fn plateau_gate_params(&self) -> PlateauGateParams {
        let c = &self.cfg.calibration;
        PlateauGateParams {
            window: c.plateau_window,
            max_stddev_counts: c.plateau_max_stddev_counts,
            min_stable_ms: c.plateau_min_stable_ms,
            phase_timeout: Duration::from_millis(c.phase_timeout_ms),
        }
    }

    fn stable_raw_params(&self) -> StableRawParams {
        let s = &self.cfg.sampler;
        StableRawParams {
            min_samples: s.min_samples,
            max_samples: s.max_samples,
            max_stddev_counts: s.max_stddev_counts,
            min_duration_ms: s.min_duration_ms,
            read_timeout: Duration::from_millis(self.cfg.hardware.sensor_read_timeout_ms),
            overall_timeout: Duration::from_millis(s.overall_timeout_ms),
        }
    }

    fn tare_params(&self) -> TareParams {
        let c = &self.cfg.calibration;
        TareParams {
            reads: c.tare_reads,
            per_read_timeout: Duration::from_millis(c.tare_per_read_timeout_ms),
            overall_timeout: Duration::from_millis(c.tare_overall_timeout_ms),
        }
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.cfg.hardware.sensor_read_timeout_ms)
    }

    fn post_cal_cooldown(&self) -> Duration {
        Duration::from_millis(self.cfg.calibration.post_cal_cooldown_ms)
    }

    /// Blocks for the post-calibration cooldown window, emitting a heartbeat
    /// at the same cadence as the IDLE loop's poll interval (spec §4.D:
    /// "the machine emits a heartbeat while paused").
    fn run_post_cal_cooldown(&self) {
        let total = self.post_cal_cooldown();
        if total.is_zero() {
            return;
        }
        let tick = Duration::from_millis(self.cfg.capture.idle_poll_ms.max(1));
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            let step = tick.min(total - elapsed);
            self.clock.sleep(step);
            elapsed += step;
            tracing::debug!(remaining_ms = (total - elapsed).as_millis(), "heartbeat: calibration cooldown");
        }
    }
}

pub fn run_self_check(ctx: &mut DeviceContext) -> eyre::Result<String> {
    let ready = ctx.adc.is_ready();
    let raw = ctx.adc.read(ctx.read_timeout())?;
    Ok(format!("self-check ok: ready={ready} raw={raw}"))
}

pub fn run_health(ctx: &mut DeviceContext) -> eyre::Result<String> {
    match ctx.adc.read(ctx.read_timeout()) {
        Ok(raw) => Ok(format!("health: ok (raw={raw})")),
        Err(e) => Err(eyre::eyre!("health: scale unresponsive: {e}")),
    }
}

/// Every calibration command below runs its body, then unconditionally
/// blocks for `post_cal_cooldown_ms` before returning (spec §4.C: "after any
/// calibration operation (including abort)... so residual platform motion
/// does not trigger a spurious ACTIVE"). In this CLI architecture, where
/// capture and calibration run as separate process invocations rather than
/// one long-lived loop, the cooldown is enforced by holding the calibration
/// command open rather than letting it return immediately.
pub fn run_tare(ctx: &mut DeviceContext) -> eyre::Result<String> {
    let params = ctx.tare_params();
    let result = (|| -> eyre::Result<String> {
        let zero = tare(ctx.adc.as_mut(), &ctx.clock, &params)
            .map_err(|e| eyre::eyre!("tare failed: {e}"))?;
        let mut existing = load_or_default(&ctx.cal_store);
        existing.zero_counts = zero;
        ctx.cal_store
            .save(&existing)
            .map_err(|e| eyre::eyre!("persist tare: {e}"))?;
        Ok(format!("tare ok: zero_counts={zero}"))
    })();
    ctx.run_post_cal_cooldown();
    result
}

pub fn run_cal(ctx: &mut DeviceContext, grams: f32) -> eyre::Result<String> {
    if grams <= 0.0 {
        eyre::bail!("cal requires a positive known mass in grams");
    }
    let params = ctx.tare_params();
    let settle_wait = Duration::from_millis(ctx.cfg.calibration.settle_wait_ms);
    let read_timeout = ctx.read_timeout();
    let gate = ctx.plateau_gate_params();
    let stable = ctx.stable_raw_params();

    let result = (|| -> eyre::Result<String> {
        let zero_counts = tare(ctx.adc.as_mut(), &ctx.clock, &params)
            .map_err(|e| eyre::eyre!("tare failed: {e}"))?;

        let result = calibrate_single_point(
            ctx.adc.as_mut(),
            &ctx.clock,
            settle_wait,
            read_timeout,
            &gate,
            &stable,
            zero_counts,
            grams,
        )
        .map_err(|e| eyre::eyre!("calibration failed: {e}"))?;

        ctx.cal_store
            .save(&result)
            .map_err(|e| eyre::eyre!("persist calibration: {e}"))?;
        Ok(format!(
            "cal ok: counts_per_gram={} zero_counts={}",
            result.counts_per_gram, result.zero_counts
        ))
    })();
    ctx.run_post_cal_cooldown();
    result
}

pub fn run_cal1(ctx: &mut DeviceContext, grams: f32) -> eyre::Result<String> {
    let settle_wait = Duration::from_millis(ctx.cfg.calibration.settle_wait_ms);
    let read_timeout = ctx.read_timeout();
    let gate = ctx.plateau_gate_params();
    let stable = ctx.stable_raw_params();

    let result = (|| -> eyre::Result<String> {
        let raw = capture_two_point_leg(ctx.adc.as_mut(), &ctx.clock, settle_wait, read_timeout, &gate, &stable)
            .map_err(|e| eyre::eyre!("cal1 leg failed: {e}"))?;

        let mut state = ctx.two_point.load();
        state.leg1 = Some((raw, grams));
        ctx.two_point.save(&state)?;
        Ok(format!("cal1 ok: raw={raw} grams={grams}"))
    })();
    ctx.run_post_cal_cooldown();
    result
}

pub fn run_cal2(ctx: &mut DeviceContext, grams: f32) -> eyre::Result<String> {
    let settle_wait = Duration::from_millis(ctx.cfg.calibration.settle_wait_ms);
    let read_timeout = ctx.read_timeout();
    let gate = ctx.plateau_gate_params();
    let stable = ctx.stable_raw_params();

    let result = (|| -> eyre::Result<String> {
        let raw = capture_two_point_leg(ctx.adc.as_mut(), &ctx.clock, settle_wait, read_timeout, &gate, &stable)
            .map_err(|e| eyre::eyre!("cal2 leg failed: {e}"))?;

        let mut state = ctx.two_point.load();
        state.leg2 = Some((raw, grams));
        ctx.two_point.save(&state)?;
        Ok(format!("cal2 ok: raw={raw} grams={grams}"))
    })();
    ctx.run_post_cal_cooldown();
    result
}

pub fn run_solve(ctx: &mut DeviceContext) -> eyre::Result<String> {
    let result = (|| -> eyre::Result<String> {
        let state = ctx.two_point.load();
        let (r1, m1) = state.leg1.ok_or_else(|| eyre::eyre!("solve: run cal1 first"))?;
        let (r2, m2) = state.leg2.ok_or_else(|| eyre::eyre!("solve: run cal2 first"))?;

        let result = calibrate_two_point(r1, m1, r2, m2, ctx.cfg.calibration.min_mass_delta_g)
            .map_err(|e| eyre::eyre!("solve failed: {e}"))?;

        ctx.cal_store
            .save(&result)
            .map_err(|e| eyre::eyre!("persist calibration: {e}"))?;
        ctx.two_point.clear();
        Ok(format!(
            "solve ok: counts_per_gram={} zero_counts={}",
            result.counts_per_gram, result.zero_counts
        ))
    })();
    ctx.run_post_cal_cooldown();
    result
}

/// Dispatch one line of the device serial CLI (spec §6): `help`, `tare`,
/// `cal <g>`, `cal1 <g>`, `cal2 <g>`, `solve`, `resetcal`, case-insensitive.
/// Always returns a short outcome string rather than erroring the caller, so
/// an interactive session can keep reading lines after a mistake.
pub fn dispatch_line(ctx: &mut DeviceContext, line: &str) -> String {
    let mut parts = line.trim().split_whitespace();
    let Some(cmd) = parts.next() else {
        return String::new();
    };
    let cmd = cmd.to_ascii_lowercase();
    let arg = parts.next();

    let result = match cmd.as_str() {
        "help" => {
            return "commands: help, tare, cal <g>, cal1 <g>, cal2 <g>, solve, resetcal".to_string();
        }
        "tare" => run_tare(ctx),
        "cal" => match arg.and_then(|a| a.parse::<f32>().ok()) {
            Some(g) => run_cal(ctx, g),
            None => return "usage: cal <grams>".to_string(),
        },
        "cal1" => match arg.and_then(|a| a.parse::<f32>().ok()) {
            Some(g) => run_cal1(ctx, g),
            None => return "usage: cal1 <grams>".to_string(),
        },
        "cal2" => match arg.and_then(|a| a.parse::<f32>().ok()) {
            Some(g) => run_cal2(ctx, g),
            None => return "usage: cal2 <grams>".to_string(),
        },
        "solve" => run_solve(ctx),
        "resetcal" => run_reset_cal(ctx),
        other => return format!("unknown command: {other} (try 'help')"),
    };

    match result {
        Ok(msg) => msg,
        Err(e) => format!("error: {e}"),
    }
}

pub fn run_reset_cal(ctx: &mut DeviceContext) -> eyre::Result<String> {
    ctx.cal_store
        .reset()
        .map_err(|e| eyre::eyre!("reset failed: {e}"))?;
    ctx.two_point.clear();
    let default: CalibrationResult = load_or_default(&ctx.cal_store);
    Ok(format!(
        "resetcal ok: reverted to default counts_per_gram={}",
        default.counts_per_gram
    ))
}
