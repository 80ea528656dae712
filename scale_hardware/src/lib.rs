//! HX711 ADC driver (real, `hardware` feature) and a simulated backend for
//! portability and tests. Both implement `scale_traits::AdcReader`.

pub mod error;
pub mod util;

#[cfg(feature = "hardware")]
pub mod hx711;

#[cfg(feature = "hardware")]
pub use hx711::Hx711;

use scale_traits::AdcReader;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// A fake ADC that produces a slowly rising raw-count sequence, for use in
/// tests and on platforms without real GPIO access.
pub struct SimulatedAdc {
    raw: Rc<Cell<i32>>,
    offset: i32,
    scale: f32,
    step: i32,
}

impl SimulatedAdc {
    pub fn new() -> Self {
        Self {
            raw: Rc::new(Cell::new(0)),
            offset: 0,
            scale: 1.0,
            step: 0,
        }
    }

    /// A simulated ADC that holds steady at `raw_counts` (useful for
    /// plateau/calibration tests that need a stable reading).
    pub fn steady(raw_counts: i32) -> Self {
        Self {
            raw: Rc::new(Cell::new(raw_counts)),
            offset: 0,
            scale: 1.0,
            step: 0,
        }
    }

    /// Each subsequent read advances the raw value by `step` counts.
    pub fn with_ramp(mut self, step: i32) -> Self {
        self.step = step;
        self
    }

    pub fn set_offset(&mut self, offset: i32) {
        self.offset = offset;
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }
}

impl Default for SimulatedAdc {
    fn default() -> Self {
        Self::new()
    }
}

impl AdcReader for SimulatedAdc {
    fn read(
        &mut self,
        _timeout: Duration,
    ) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        let v = self.raw.get();
        self.raw.set(v + self.step);
        Ok(v)
    }

    fn is_ready(&mut self) -> bool {
        true
    }
}
