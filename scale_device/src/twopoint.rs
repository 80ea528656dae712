//! Transient state between the `cal1`/`cal2`/`solve` serial CLI commands.
//!
//! A two-point calibration's two legs are normally captured as separate
//! commands (separate process invocations for the binary front-end, separate
//! lines for the serial REPL), so the raw/mass pairs from each leg must
//! survive between them. Persisted the same way as the calibration result
//! itself (`scale_core::atomic::write_atomic` + JSON), in a sibling file that
//! `solve`/`resetcal` clear once consumed.
use scale_core::atomic::write_atomic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TwoPointState {
    pub leg1: Option<(i32, f32)>,
    pub leg2: Option<(i32, f32)>,
}

pub struct TwoPointStore {
    path: PathBuf,
}

impl TwoPointStore {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            path: base_dir.join("autoscale.cal2.json"),
        }
    }

    pub fn load(&self) -> TwoPointState {
        std::fs::read(&self.path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, state: &TwoPointState) -> eyre::Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }

    pub fn clear(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_partial_and_full_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = TwoPointStore::new(dir.path());
        assert!(store.load().leg1.is_none());

        let mut state = store.load();
        state.leg1 = Some((1000, 0.0));
        store.save(&state).unwrap();

        let mut state = store.load();
        assert_eq!(state.leg1, Some((1000, 0.0)));
        assert!(state.leg2.is_none());

        state.leg2 = Some((101_000, 1000.0));
        store.save(&state).unwrap();
        let state = store.load();
        assert_eq!(state.leg2, Some((101_000, 1000.0)));

        store.clear();
        assert!(store.load().leg1.is_none());
    }
}
