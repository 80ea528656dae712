//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "scale_device", version, about = "Load-cell event-capture device")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/scale_device.toml")]
    pub config: PathBuf,

    /// Optional calibration CSV (strict header), used only if no persisted
    /// calibration exists on disk
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Directory holding the persisted calibration file (autoscale.cal.json)
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub state_dir: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Identifier this device tags outgoing events with (spec: `scale_id` on
    /// the wire). Falls back to the `SCALE_DEVICE_ID` environment variable.
    #[arg(long = "device-id", value_name = "ID", env = "SCALE_DEVICE_ID")]
    pub device_id: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the event-capture loop: IDLE/ACTIVE until Ctrl-C
    Run,
    /// Quick health check (hardware presence / sim ok)
    SelfCheck,
    /// Health check for operational monitoring
    Health,
    /// Tare: average raw reads to obtain a zero offset, then persist it
    Tare,
    /// Single-point calibration: place `grams` on the scale, then settle+measure
    Cal {
        /// Known mass placed on the scale, in grams
        grams: f32,
    },
    /// First leg of a two-point calibration: settle+measure at `grams`
    Cal1 {
        /// Known mass placed on the scale, in grams
        grams: f32,
    },
    /// Second leg of a two-point calibration: settle+measure at `grams`
    Cal2 {
        /// Known mass placed on the scale, in grams
        grams: f32,
    },
    /// Solve the two-point calibration from the two captured legs and persist it
    Solve,
    /// Delete the persisted calibration and revert to the compile-time default
    ResetCal,
    /// Line-oriented interactive CLI: help, tare, cal <g>, cal1 <g>, cal2 <g>, solve, resetcal
    Serial,
}
