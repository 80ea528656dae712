//! Worker loop (spec §4.I): claims a batch of pending jobs with a single
//! conditional update (spec §9 — never read-then-write), then runs the
//! plateau detector and consensus refiner over each claimed event.
use actix_web::{HttpRequest, HttpResponse, post, web};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::WorkerError;
use scale_core::{
    consensus::{self, ConsensusOutput},
    detector::{self, DetectorOutput, DetectorParams},
    event::Sample,
};

const DEFAULT_BAND_KG: f64 = 1.0;
const HISTORY_N: i64 = 10;
const DEFAULT_BATCH: i64 = 20;
const MAX_BATCH: i64 = 500;

#[derive(sqlx::FromRow)]
struct ClaimedJob {
    id: i64,
    event_id: i64,
}

#[derive(sqlx::FromRow)]
struct EventRow {
    scale_id: String,
    samples: Value,
}

#[derive(Debug, Serialize)]
pub struct WorkerSummary {
    pub ok: bool,
    pub picked: usize,
}

/// Claims up to `batch` pending jobs and processes each independently; a
/// per-job failure marks that job `failed` without aborting the rest of the
/// batch (spec §4.I point 3).
pub async fn run_batch(pool: &PgPool, batch: i64) -> Result<WorkerSummary, WorkerError> {
    let claimed = claim_jobs(pool, batch).await?;
    let picked = claimed.len();

    for job in claimed {
        if let Err(e) = process_job(pool, &job).await {
            let _ = sqlx::query("update jobs set status = 'failed', done_at = now(), error = $2 where id = $1")
                .bind(job.id)
                .bind(e.to_string())
                .execute(pool)
                .await;
        }
    }

    Ok(WorkerSummary { ok: true, picked })
}

/// `UPDATE ... WHERE id IN (SELECT ... FOR UPDATE SKIP LOCKED) RETURNING` is
/// the one allowed shape for the claim (spec §9): it is atomic against
/// concurrent workers racing on the same `pending` rows.
async fn claim_jobs(pool: &PgPool, batch: i64) -> Result<Vec<ClaimedJob>, WorkerError> {
    sqlx::query_as::<_, ClaimedJob>(
        r#"
        update jobs
        set status = 'processing', picked_at = now(), attempts = attempts + 1
        where id in (
            select id from jobs
            where status = 'pending'
            order by created_at asc
            limit $1
            for update skip locked
        )
        returning id, event_id
        "#,
    )
    .bind(batch)
    .fetch_all(pool)
    .await
    .map_err(WorkerError::Db)
}

async fn process_job(pool: &PgPool, job: &ClaimedJob) -> eyre::Result<()> {
    let event = sqlx::query_as::<_, EventRow>("select scale_id, samples from events where id = $1")
        .bind(job.event_id)
        .fetch_one(pool)
        .await?;

    let samples: Vec<Sample> = serde_json::from_value(event.samples)?;

    if samples.is_empty() {
        sqlx::query("update jobs set status = 'done', done_at = now(), error = $2 where id = $1")
            .bind(job.id)
            .bind("no samples")
            .execute(pool)
            .await?;
        return Ok(());
    }

    let params = DetectorParams::default();
    let raw = detector::detect(&samples, &params)?;

    let recent = recent_raw_weights(pool, &event.scale_id, HISTORY_N).await?;
    let consensus = consensus::refine(&samples, &raw, &recent, DEFAULT_BAND_KG);

    insert_result(pool, job.event_id, &raw, &consensus, recent.len()).await?;

    sqlx::query("update jobs set status = 'done', done_at = now() where id = $1")
        .bind(job.id)
        .execute(pool)
        .await?;

    Ok(())
}

async fn recent_raw_weights(pool: &PgPool, scale_id: &str, n: i64) -> Result<Vec<f64>, sqlx::Error> {
    sqlx::query_scalar::<_, f64>(
        r#"
        select (r.raw->>'weight_kg')::double precision
        from results r
        join events e on e.id = r.event_id
        where e.scale_id = $1
        order by r.computed_at desc
        limit $2
        "#,
    )
    .bind(scale_id)
    .bind(n)
    .fetch_all(pool)
    .await
}

fn round_to(v: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (v * f).round() / f
}

/// Rounds values per spec §4.I point 2: weight 10⁻⁵ kg, window bounds 10⁻³ s,
/// slope (mean derivative) 10⁻⁶.
async fn insert_result(
    pool: &PgPool,
    event_id: i64,
    raw: &DetectorOutput,
    consensus: &ConsensusOutput,
    recent_count: usize,
) -> Result<(), sqlx::Error> {
    let raw_json = serde_json::json!({
        "weight_kg": round_to(raw.weight_kg, 5),
        "uncertainty_kg": round_to(raw.uncertainty_kg, 5),
        "quality": raw.quality,
        "mode": raw.mode.as_str(),
        "start_s": round_to(raw.start_s, 3),
        "end_s": round_to(raw.end_s, 3),
        "duration_s": round_to(raw.duration_s, 3),
        "mean_abs_deriv": round_to(raw.mean_abs_deriv, 6),
        "mean_std": round_to(raw.mean_std, 6),
        "n_points": raw.n_points,
    });

    let consensus_json = consensus.result.as_ref().map(|r| {
        serde_json::json!({
            "weight_kg": round_to(r.weight_kg, 5),
            "uncertainty_kg": round_to(r.uncertainty_kg, 5),
            "mode": r.mode,
            "start_s": round_to(r.start_s, 3),
            "end_s": round_to(r.end_s, 3),
            "duration_s": round_to(r.duration_s, 3),
            "band_kg": r.band_kg,
        })
    });

    let meta_json = serde_json::json!({
        "consensus_kg": consensus.consensus_kg,
        "consensus_source_count": recent_count,
    });

    sqlx::query("insert into results (event_id, raw, consensus, meta, computed_at) values ($1, $2, $3, $4, now())")
        .bind(event_id)
        .bind(raw_json)
        .bind(consensus_json)
        .bind(meta_json)
        .execute(pool)
        .await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    pub batch: Option<i64>,
}

#[post("/")]
pub async fn invoke(
    req: HttpRequest,
    pool: web::Data<PgPool>,
    cfg: web::Data<Config>,
    query: web::Query<BatchQuery>,
) -> Result<HttpResponse, WorkerError> {
    let expected = cfg
        .function_secret_processor
        .as_deref()
        .ok_or_else(|| WorkerError::Config("FUNCTION_SECRET_PROCESSOR is not configured".into()))?;
    match req.headers().get("x-function-secret").and_then(|v| v.to_str().ok()) {
        Some(h) if h == expected => {}
        _ => return Err(WorkerError::Unauthorized),
    }

    let batch = query.batch.unwrap_or(DEFAULT_BATCH).clamp(1, MAX_BATCH);
    let summary = run_batch(&pool, batch).await?;
    Ok(HttpResponse::Ok().json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_keeps_spec_precision() {
        assert_eq!(round_to(1.234567, 5), 1.23457);
        assert_eq!(round_to(2.0001234, 3), 2.0);
        assert_eq!(round_to(0.0000012345, 6), 0.000001);
    }
}
