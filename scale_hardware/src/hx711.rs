use std::time::{Duration, Instant};
use tracing::trace;

use crate::error::{HwError, Result};
use scale_traits::AdcReader;

/// HX711 24-bit ADC driver: DT (data) + SCK (clock) pins, plus a gain/channel
/// selector encoded as a trailing pulse count (25/26/27 depending on mode).
pub struct Hx711 {
    dt: rppal::gpio::InputPin,
    sck: rppal::gpio::OutputPin,
    gain_pulses: u8,
    offset: i32,
    scale: f32,
}

impl Hx711 {
    pub fn new(
        dt_pin: rppal::gpio::InputPin,
        mut sck_pin: rppal::gpio::OutputPin,
        gain_pulses: u8,
    ) -> Result<Self> {
        sck_pin.set_low(); // clock idle low
        Ok(Self {
            dt: dt_pin,
            sck: sck_pin,
            gain_pulses,
            offset: 0,
            scale: 1.0,
        })
    }

    pub fn read_with_timeout(&mut self, timeout: Duration) -> Result<i32> {
        let deadline = Instant::now() + timeout;

        // Wait for data ready (DT goes low)
        while self.dt.is_high() {
            if Instant::now() >= deadline {
                return Err(HwError::Timeout);
            }
            std::thread::sleep(Duration::from_micros(200));
        }

        // Clock out 24 bits
        let mut value: i32 = 0;
        for _ in 0..24 {
            self.sck.set_high();
            // short, consistent timing
            spin_delay_100ns();
            value = (value << 1) | if self.dt.is_high() { 1 } else { 0 };
            self.sck.set_low();
            spin_delay_100ns();
        }

        // Pulse gain to set next measurement
        for _ in 0..self.gain_pulses {
            self.sck.set_high();
            spin_delay_100ns();
            self.sck.set_low();
            spin_delay_100ns();
        }

        // Sign extend 24-bit
        if (value & 0x800000) != 0 {
            value |= !0xFFFFFF;
        }
        trace!(raw = value, "hx711 raw read");
        Ok(value)
    }

    /// Non-blocking: true once the chip has a conversion ready (DT low).
    pub fn is_ready(&self) -> bool {
        !self.dt.is_high()
    }

    pub fn set_offset(&mut self, offset: i32) {
        self.offset = offset;
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }

    /// Converted reading in the caller's physical unit: `(raw - offset) / scale`.
    pub fn read_converted(&mut self, timeout: Duration) -> Result<f32> {
        let raw = self.read_with_timeout(timeout)?;
        Ok((raw - self.offset) as f32 / self.scale)
    }
}

impl AdcReader for Hx711 {
    fn read(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        self.read_with_timeout(timeout).map_err(|e| Box::new(e) as _)
    }

    fn is_ready(&mut self) -> bool {
        Hx711::is_ready(self)
    }
}

#[inline(always)]
fn spin_delay_100ns() {
    // Do nothing; a few CPU cycles—tweak if needed.
    std::hint::spin_loop();
}
