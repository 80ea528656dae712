//! Ingest endpoint (spec §4.F): validates an inbound event payload, resolves
//! or auto-registers its device, and enqueues a pending job. Both the event
//! and job writes happen inside one request so a `200` response implies
//! both persisted.
use actix_web::{HttpRequest, HttpResponse, post, web};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::config::Config;
use crate::error::IngestError;
use crate::registry;
use scale_core::event::{Event, Sample as CoreSample};

#[derive(Debug, Deserialize)]
pub struct IngestSample {
    pub t: i64,
    pub kg: f64,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub scale_id: String,
    pub t0_epoch_ms: Option<i64>,
    pub samples: Vec<IngestSample>,
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    ok: bool,
    sample_count: usize,
    peak_kg: f64,
}

fn check_secret(req: &HttpRequest, expected: Option<&str>) -> Result<(), IngestError> {
    let expected = expected.ok_or_else(|| IngestError::Config("FUNCTION_SECRET is not configured".into()))?;
    match req.headers().get("x-function-secret").and_then(|v| v.to_str().ok()) {
        Some(h) if h == expected => Ok(()),
        _ => Err(IngestError::Unauthorized),
    }
}

/// An event with zero samples is still a valid ingest (spec §3); only
/// malformed fields are rejected.
fn validate(payload: &IngestRequest) -> Result<(), IngestError> {
    if payload.scale_id.trim().is_empty() {
        return Err(IngestError::BadRequest("scale_id must not be empty".into()));
    }
    for s in &payload.samples {
        if s.t < 0 || !s.kg.is_finite() {
            return Err(IngestError::BadRequest(
                "each sample needs t >= 0 and a finite kg".into(),
            ));
        }
    }
    Ok(())
}

#[post("/ingest")]
pub async fn ingest(
    req: HttpRequest,
    pool: web::Data<PgPool>,
    cfg: web::Data<Config>,
    body: web::Json<IngestRequest>,
) -> Result<HttpResponse, IngestError> {
    check_secret(&req, cfg.function_secret.as_deref())?;
    let payload = body.into_inner();
    validate(&payload)?;

    let device = registry::resolve_or_register(
        &pool,
        &payload.scale_id,
        cfg.default_household_id.as_deref(),
        cfg.db_timeout,
    )
    .await?;

    let samples: Vec<CoreSample> = payload
        .samples
        .iter()
        .map(|s| CoreSample::new(s.t as u64, s.kg))
        .collect();
    let event = Event::new(device.device_id.clone(), payload.t0_epoch_ms, samples);
    let samples_json = serde_json::to_value(&event.samples).expect("Sample always serializes");

    // The event and job writes must land together: a successful response
    // implies both persisted (spec §4.F), so both inserts run inside one
    // transaction rather than as two independent pool-level statements.
    let mut tx = pool.begin().await.map_err(IngestError::Db)?;

    let event_id: i64 = sqlx::query_scalar(
        r#"
        insert into events (scale_id, t0_epoch_ms, samples, sample_count, peak_kg)
        values ($1, $2, $3, $4, $5)
        returning id
        "#,
    )
    .bind(&event.device_id)
    .bind(event.t0_epoch_ms)
    .bind(&samples_json)
    .bind(event.sample_count as i64)
    .bind(event.peak_kg)
    .fetch_one(&mut *tx)
    .await
    .map_err(IngestError::Db)?;

    sqlx::query("insert into jobs (event_id, status, created_at, attempts) values ($1, 'pending', now(), 0)")
        .bind(event_id)
        .execute(&mut *tx)
        .await
        .map_err(IngestError::Db)?;

    tx.commit().await.map_err(IngestError::Db)?;

    Ok(HttpResponse::Ok().json(IngestResponse {
        ok: true,
        sample_count: event.sample_count,
        peak_kg: event.peak_kg,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::empty_scale_id(IngestRequest { scale_id: "  ".into(), t0_epoch_ms: None, samples: vec![] })]
    #[case::negative_timestamp(IngestRequest {
        scale_id: "dev-1".into(),
        t0_epoch_ms: None,
        samples: vec![IngestSample { t: -1, kg: 1.0 }],
    })]
    #[case::non_finite_kg(IngestRequest {
        scale_id: "dev-1".into(),
        t0_epoch_ms: None,
        samples: vec![IngestSample { t: 0, kg: f64::NAN }],
    })]
    fn rejects_malformed_payload(#[case] payload: IngestRequest) {
        assert!(validate(&payload).is_err());
    }

    #[test]
    fn accepts_zero_samples() {
        let payload = IngestRequest { scale_id: "dev-1".into(), t0_epoch_ms: None, samples: vec![] };
        assert!(validate(&payload).is_ok());
    }
}
