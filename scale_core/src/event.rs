//! Sample/Event data model (spec §3), shared by the device-side capture
//! state machine and the server-side detector/consensus pipeline.
use serde::{Deserialize, Serialize};

/// A single time-stamped reading captured during one weighing event.
///
/// `t` is milliseconds since the event's `session_t0`, non-negative and
/// non-decreasing within an event. `kg` is the converted, sign-corrected
/// reading in kilograms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub t: u64,
    pub kg: f64,
}

impl Sample {
    pub fn new(t: u64, kg: f64) -> Self {
        Self { t, kg }
    }
}

/// An ordered, finite sequence of samples captured for one weighing event.
///
/// Immutable once constructed: `sample_count` and `peak_kg` are derived at
/// construction time and never recomputed in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub device_id: String,
    /// Wall-clock anchor for the event, if the device reported one. Per
    /// spec §9 Open Questions this is advisory only: some firmware sends
    /// uptime instead of wall-clock time here, so downstream consumers
    /// must never treat it as authoritative input to the detector.
    pub t0_epoch_ms: Option<i64>,
    pub samples: Vec<Sample>,
    pub sample_count: usize,
    pub peak_kg: f64,
}

impl Event {
    /// Build an event from a device id and sample buffer, deriving
    /// `sample_count` and `peak_kg`. `peak_kg` of an empty event is `0.0`.
    pub fn new(device_id: impl Into<String>, t0_epoch_ms: Option<i64>, samples: Vec<Sample>) -> Self {
        let sample_count = samples.len();
        let peak_kg = samples.iter().map(|s| s.kg).fold(f64::NEG_INFINITY, f64::max);
        let peak_kg = if peak_kg.is_finite() { peak_kg } else { 0.0 };
        Self {
            device_id: device_id.into(),
            t0_epoch_ms,
            samples,
            sample_count,
            peak_kg,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_kg_is_max_sample() {
        let e = Event::new(
            "dev-1",
            None,
            vec![Sample::new(0, 1.0), Sample::new(100, 5.5), Sample::new(200, 3.0)],
        );
        assert_eq!(e.peak_kg, 5.5);
        assert_eq!(e.sample_count, 3);
    }

    #[test]
    fn empty_event_has_zero_peak() {
        let e = Event::new("dev-1", None, vec![]);
        assert_eq!(e.peak_kg, 0.0);
        assert_eq!(e.sample_count, 0);
        assert!(e.is_empty());
    }

    #[test]
    fn peak_idempotent_under_reinsertion() {
        let samples = vec![Sample::new(0, 2.0), Sample::new(10, 9.0)];
        let e1 = Event::new("dev-1", None, samples.clone());
        let e2 = Event::new("dev-1", None, samples);
        assert_eq!(e1.peak_kg, e2.peak_kg);
    }
}
