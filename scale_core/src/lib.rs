#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core, hardware-agnostic load-cell measurement pipeline.
//!
//! All hardware interactions go through `scale_traits::AdcReader`/`Clock`/
//! `EventTransport`; this crate never touches GPIO, the network, or a
//! database directly.
//!
//! ## Architecture
//!
//! - **Fixed-point arithmetic** (`fixed_point`): `i32` centigram helpers.
//!   `capture::Conversion` quantizes every raw-to-kg conversion through
//!   these before the rest of the pipeline ever sees a float, so EMA/
//!   threshold math always operates on the load cell's true resolution
//!   rather than float noise between ADC counts. The detector and
//!   consensus stages work in `f64` kilograms throughout, matching the
//!   server-side job-queue math.
//! - **Stable-raw sampler** (`sampler`): collects ADC samples until
//!   dispersion is low or a cap is reached (spec §4.B).
//! - **Calibration engine** (`calibration`): tare, single-/two-point gain
//!   derivation, plateau gate, durable persistence (spec §4.C).
//! - **Event-capture state machine** (`capture`): IDLE/ACTIVE with
//!   hysteresis, rising-edge arming, post-event cooldown (spec §4.D).
//! - **Data model** (`event`): `Sample`/`Event` (spec §3).
//! - **Plateau detector v6** (`detector`): outlier-robust filtering,
//!   derivative/variance gating, plateau scoring, tail-median fallback
//!   (spec §4.G).
//! - **Consensus refiner v2** (`consensus`): reconciles a fresh detection
//!   with recent per-device history (spec §4.H).
//! - **Durable writes** (`atomic`): temp-file + fsync + rename, used by the
//!   calibration store.
pub mod atomic;
pub mod calibration;
pub mod capture;
pub mod consensus;
pub mod detector;
pub mod error;
pub mod event;
pub mod fixed_point;
pub mod sampler;

pub use calibration::{CalibrationResult, CalibrationStore, FileCalibrationStore};
pub use capture::{CaptureGate, CaptureMachine, CaptureParams, Conversion};
pub use consensus::{ConsensusOutput, ConsensusResult};
pub use detector::{DetectorMode, DetectorOutput, DetectorParams};
pub use event::{Event, Sample};
