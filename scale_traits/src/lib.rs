#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Traits that define the hardware, transport, and time abstractions used by the system.
//!
//! - `AdcReader` provides a blocking `read(timeout)` API that returns raw ADC counts (i32).
//! - `EventTransport` hands a captured event off to whatever collects it.
//! - `clock` offers a `MonotonicClock` for deterministic timing and testability.
//!
//! Other crates depend only on these traits, enabling simulation and multiple hardware
//! backends while keeping `scale_core` hardware- and network-agnostic.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// A blocking 24-bit ADC source, e.g. an HX711 load-cell amplifier.
///
/// `read` blocks until a conversion is ready or the timeout elapses. Offset and
/// scale are applied by callers converting raw counts to a physical unit; the
/// reader itself only ever returns raw signed counts.
pub trait AdcReader {
    fn read(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<i32, Box<dyn std::error::Error + Send + Sync>>;

    /// Non-blocking readiness check. Default implementation assumes the reader
    /// is always ready; real backends (HX711) override this with a DT-pin poll.
    fn is_ready(&mut self) -> bool {
        true
    }
}

/// Hands a captured event to whatever collects it (an HTTPS endpoint on real
/// hardware, a recording fake in tests). Errors are non-fatal to the caller:
/// per the capture state machine's contract, a failed send still clears the
/// device's buffer and returns to IDLE.
pub trait EventTransport {
    type Event;

    fn send(
        &mut self,
        event: &Self::Event,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

// Allow boxed trait objects (Box<dyn AdcReader>) to be used where a generic
// R: AdcReader is expected.
impl<T: ?Sized + AdcReader> AdcReader for Box<T> {
    fn read(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read(timeout)
    }

    fn is_ready(&mut self) -> bool {
        (**self).is_ready()
    }
}
