//! Results aggregator (spec §4.J). `sample_count`/`peak_kg` are derived by
//! `scale_core::event::Event` itself at ingest time; this module covers the
//! two presentation-layer derivations that sit on top of a persisted event.
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Night,
}

/// `t0_epoch_ms` if the device supplied one, else the server's ingest time.
/// Advisory only (spec §9): some firmware sends uptime rather than
/// wall-clock time in this field.
pub fn time_of_event(t0_epoch_ms: Option<i64>, ingested_at: OffsetDateTime) -> OffsetDateTime {
    match t0_epoch_ms {
        Some(ms) => OffsetDateTime::from_unix_timestamp(ms / 1000).unwrap_or(ingested_at),
        None => ingested_at,
    }
}

/// `hour < 15 => Morning` (spec §4.J).
pub fn classify(at: OffsetDateTime) -> TimeOfDay {
    if at.hour() < 15 { TimeOfDay::Morning } else { TimeOfDay::Night }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn before_three_pm_is_morning() {
        let at = datetime!(2026-01-01 8:00:00 UTC);
        assert_eq!(classify(at), TimeOfDay::Morning);
    }

    #[test]
    fn three_pm_and_after_is_night() {
        let at = datetime!(2026-01-01 15:00:00 UTC);
        assert_eq!(classify(at), TimeOfDay::Night);
        let late = datetime!(2026-01-01 23:30:00 UTC);
        assert_eq!(classify(late), TimeOfDay::Night);
    }

    #[test]
    fn missing_t0_falls_back_to_ingest_time() {
        let ingested = datetime!(2026-03-01 10:00:00 UTC);
        assert_eq!(time_of_event(None, ingested), ingested);
    }

    #[test]
    fn epoch_ms_wins_over_ingest_time() {
        let ingested = datetime!(2026-03-01 10:00:00 UTC);
        let at = time_of_event(Some(0), ingested);
        assert_eq!(at.unix_timestamp(), 0);
    }
}
