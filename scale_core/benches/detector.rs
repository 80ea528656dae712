use criterion::{Criterion, black_box, criterion_group, criterion_main};
use scale_core::detector::{DetectorParams, detect};
use scale_core::event::Sample;

fn synthetic_event(n: usize) -> Vec<Sample> {
    (0..n)
        .map(|i| {
            let t = (i as u64) * 100;
            let kg = if t < 500 { 0.0 } else { 5.0 };
            Sample::new(t, kg)
        })
        .collect()
}

fn bench_detect(c: &mut Criterion) {
    let samples = synthetic_event(600); // ~60s at 10 Hz
    let params = DetectorParams::default();
    c.bench_function("plateau_detector_v6_600_samples", |b| {
        b.iter(|| detect(black_box(&samples), black_box(&params)))
    });
}

criterion_group!(benches, bench_detect);
criterion_main!(benches);
