//! Consensus refiner v2 (spec §4.H).
//!
//! Given a fresh plateau detection and the recent raw-weight history for the
//! same device, searches within a tolerance band around the historical
//! consensus for a tighter segment. Modeled as a pure function over
//! `(samples, recent_raw_weights, band)` (spec §9): no back-reference to the
//! detector, the worker composes the two stages.
use crate::detector::{self, DetectorOutput};
use crate::event::Sample;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConsensusResult {
    pub weight_kg: f64,
    pub uncertainty_kg: f64,
    pub mode: &'static str,
    pub start_s: f64,
    pub end_s: f64,
    pub duration_s: f64,
    pub band_kg: f64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConsensusOutput {
    pub consensus_kg: f64,
    pub result: Option<ConsensusResult>,
}

const EPS: f64 = 1e-9;

/// Run the consensus refiner.
///
/// `recent_raw_weights` should hold up to 10 of the most recent *raw*
/// detector weights for the same device (oldest-to-newest order does not
/// matter: the consensus is a plain median).
pub fn refine(
    samples: &[Sample],
    raw: &DetectorOutput,
    recent_raw_weights: &[f64],
    band_kg: f64,
) -> ConsensusOutput {
    let mut pool: Vec<f64> = Vec::with_capacity(recent_raw_weights.len() + 1);
    pool.push(raw.weight_kg);
    pool.extend_from_slice(recent_raw_weights);
    let consensus = detector::median(&pool);

    if samples.is_empty() {
        return ConsensusOutput {
            consensus_kg: consensus,
            result: None,
        };
    }

    let mut sorted: Vec<Sample> = samples.to_vec();
    sorted.sort_by(|a, b| a.t.cmp(&b.t));
    let t0 = sorted[0].t;
    let t: Vec<f64> = sorted.iter().map(|s| (s.t - t0) as f64 / 1000.0).collect();
    let kg: Vec<f64> = sorted.iter().map(|s| s.kg).collect();

    let (tk, kk) = detector::positive_floor_filter(&t, &kg);
    if tk.len() < 2 {
        return ConsensusOutput {
            consensus_kg: consensus,
            result: None,
        };
    }

    let hz = detector::estimate_hz(&tk);
    let win = (3.0 * hz).round().max(5.0) as usize;

    let t_first = tk[0];
    let t_last = *tk.last().expect("tk has at least 2 elements");
    let duration = t_last - t_first;
    let tail_start = t_first.max((t_last - 12.0).max(t_first + 0.75 * duration));

    // First pass: restrict to the tail.
    if let Some(r) = best_window(&tk, &kk, win, consensus, band_kg, Some(tail_start)) {
        return ConsensusOutput {
            consensus_kg: consensus,
            result: Some(r),
        };
    }

    // Second pass: the entire series.
    if let Some(r) = best_window(&tk, &kk, win, consensus, band_kg, None) {
        return ConsensusOutput {
            consensus_kg: consensus,
            result: Some(r),
        };
    }

    ConsensusOutput {
        consensus_kg: consensus,
        result: None,
    }
}

fn best_window(
    tk: &[f64],
    kk: &[f64],
    win: usize,
    consensus: f64,
    band_kg: f64,
    tail_start: Option<f64>,
) -> Option<ConsensusResult> {
    let n = tk.len();
    if win == 0 || win > n {
        return None;
    }
    let t_first = tk[0];
    let t_last = tk[n - 1];

    let mut best: Option<(usize, f64, f64, f64)> = None; // (start, m, sigma, score)
    for start in 0..=(n - win) {
        if let Some(ts) = tail_start {
            if tk[start] < ts {
                continue;
            }
        }
        let end = start + win;
        let window_kg = &kk[start..end];
        let m = detector::median(window_kg);
        let sigma = detector::stddev(window_kg);
        let diff = (m - consensus).abs();
        if diff > band_kg {
            continue;
        }
        let t_mid = (tk[start] + tk[end - 1]) / 2.0;
        let late = 0.5 + 0.5 * (t_mid - t_first) / (t_last - t_first).max(EPS);
        let score = ((band_kg - diff) / band_kg) * (1.0 / (sigma + EPS)) * late;
        let better = match &best {
            None => true,
            Some((_, _, _, best_score)) => score > *best_score,
        };
        if better {
            best = Some((start, m, sigma, score));
        }
    }

    best.map(|(start, m, sigma, _)| {
        let end = start + win;
        ConsensusResult {
            weight_kg: m,
            uncertainty_kg: sigma / (win as f64).sqrt(),
            mode: "consensus",
            start_s: tk[start],
            end_s: tk[end - 1],
            duration_s: tk[end - 1] - tk[start],
            band_kg,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorMode;

    fn flat(n: usize, kg: f64) -> Vec<Sample> {
        (0..n).map(|i| Sample::new((i as u64) * 100, kg)).collect()
    }

    fn raw_at(weight: f64) -> DetectorOutput {
        DetectorOutput {
            weight_kg: weight,
            uncertainty_kg: 0.01,
            quality: 0.9,
            mode: DetectorMode::PlateauV6,
            start_s: 0.0,
            end_s: 1.0,
            duration_s: 1.0,
            mean_abs_deriv: 0.0,
            mean_std: 0.0,
            n_points: 10,
        }
    }

    /// Seed scenario 5: no window within band of consensus => raw stands.
    #[test]
    fn no_band_match_returns_null_result() {
        let samples = flat(60, 7.9);
        let recent = vec![10.1, 10.0, 10.2, 9.9, 10.0];
        let out = refine(&samples, &raw_at(7.9), &recent, 1.0);
        assert!((out.consensus_kg - 10.0).abs() < 1e-9);
        assert!(out.result.is_none());
    }

    /// Seed scenario 5 (continued): a tail median near consensus should
    /// produce an accepted consensus result within the band.
    #[test]
    fn band_match_pulls_toward_consensus() {
        let samples = flat(60, 9.95);
        let recent = vec![10.1, 10.0, 10.2, 9.9, 10.0];
        let out = refine(&samples, &raw_at(9.3), &recent, 1.0);
        assert!((out.consensus_kg - 10.0).abs() < 1e-9);
        let r = out.result.expect("expected a window within band");
        assert!((r.weight_kg - 9.95).abs() < 1e-6);
        assert!((r.weight_kg - out.consensus_kg).abs() <= 1.0);
    }
}
