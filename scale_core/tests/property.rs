use proptest::prelude::*;
use scale_core::detector::{DetectorParams, detect};
use scale_core::event::Sample;

fn plateau_samples(n: usize, plateau_kg: f64, noise: &[f64]) -> Vec<Sample> {
    (0..n)
        .map(|i| {
            let t = (i as u64) * 100;
            let kg = if t < 500 {
                0.0
            } else {
                plateau_kg + noise[i % noise.len()]
            };
            Sample::new(t, kg)
        })
        .collect()
}

proptest! {
    /// Plateau-inside and weight-bounds invariants (spec §8): a plateau-v6
    /// result's window lies within the series bounds and its weight lies
    /// within the min/max of the samples in that window.
    #[test]
    fn plateau_window_and_weight_are_bounded(
        plateau_kg in 1.0f64..50.0,
        seed in 0u64..10_000,
    ) {
        let noise: Vec<f64> = (0..7)
            .map(|i| {
                let v = (seed.wrapping_add(i as u64 * 2654435761)) % 1000;
                (v as f64 / 1000.0 - 0.5) * 0.01
            })
            .collect();
        let samples = plateau_samples(80, plateau_kg, &noise);
        let t_first = 0.0;
        let t_last = (samples.len() as f64 - 1.0) * 0.1;

        let out = detect(&samples, &DetectorParams::default()).unwrap();

        prop_assert!(out.start_s >= t_first - 1e-6);
        prop_assert!(out.end_s <= t_last + 1e-6);
        prop_assert!(out.quality >= 0.0 && out.quality <= 1.0);

        let lo = samples.iter().map(|s| s.kg).fold(f64::INFINITY, f64::min);
        let hi = samples.iter().map(|s| s.kg).fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(out.weight_kg >= lo - 1e-6 && out.weight_kg <= hi + 1e-6);
    }

    /// Job determinism (spec §8): replaying the same series produces the
    /// same weight and uncertainty to within floating-point rounding.
    #[test]
    fn detect_is_deterministic(plateau_kg in 1.0f64..50.0) {
        let samples = plateau_samples(60, plateau_kg, &[0.0]);
        let a = detect(&samples, &DetectorParams::default()).unwrap();
        let b = detect(&samples, &DetectorParams::default()).unwrap();
        prop_assert_eq!(a.weight_kg.to_bits(), b.weight_kg.to_bits());
        prop_assert_eq!(a.uncertainty_kg.to_bits(), b.uncertainty_kg.to_bits());
    }
}

#[test]
fn plateau_region_spans_at_least_three_seconds_when_mode_is_plateau() {
    let samples = plateau_samples(80, 8.0, &[0.0, 0.002, -0.001]);
    let out = detect(&samples, &DetectorParams::default()).unwrap();
    if out.mode == scale_core::detector::DetectorMode::PlateauV6 {
        assert!(out.duration_s >= 3.0 - 1e-9);
    }
}
