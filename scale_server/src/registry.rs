//! Device registry (spec §4.K): idempotent upsert keyed on `device_id`,
//! time-bounded so a stalled database surfaces as a distinct timeout rather
//! than hanging the request indefinitely.
use actix_web::{HttpRequest, HttpResponse, post, web};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::time::Duration;

use crate::config::Config;
use crate::error::{IngestError, RegistryError};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Device {
    pub id: i64,
    pub device_id: String,
    pub household_id: String,
    pub display_name: String,
}

pub async fn upsert(
    pool: &PgPool,
    device_id: &str,
    household_id: &str,
    display_name: &str,
    timeout: Duration,
) -> Result<Device, RegistryError> {
    let fut = sqlx::query_as::<_, Device>(
        r#"
        insert into devices (device_id, household_id, display_name)
        values ($1, $2, $3)
        on conflict (device_id)
        do update set display_name = excluded.display_name
        returning id, device_id, household_id, display_name
        "#,
    )
    .bind(device_id)
    .bind(household_id)
    .bind(display_name)
    .fetch_one(pool);

    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| RegistryError::Timeout)?
        .map_err(RegistryError::Db)
}

pub async fn find(pool: &PgPool, device_id: &str, timeout: Duration) -> Result<Option<Device>, RegistryError> {
    let fut = sqlx::query_as::<_, Device>(
        "select id, device_id, household_id, display_name from devices where device_id = $1",
    )
    .bind(device_id)
    .fetch_optional(pool);

    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| RegistryError::Timeout)?
        .map_err(RegistryError::Db)
}

/// Resolves `device_id` for ingest: an existing row wins; otherwise
/// auto-registers under `default_household_id` when one is configured, else
/// the device is unknown (spec §4.F).
pub async fn resolve_or_register(
    pool: &PgPool,
    device_id: &str,
    default_household_id: Option<&str>,
    timeout: Duration,
) -> Result<Device, RegistryError> {
    if let Some(device) = find(pool, device_id, timeout).await? {
        return Ok(device);
    }
    match default_household_id {
        Some(household_id) => upsert(pool, device_id, household_id, device_id, timeout).await,
        None => Err(RegistryError::UnknownDevice),
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub device_id: String,
    pub display_name: Option<String>,
    pub household_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    ok: bool,
    scale: Device,
}

fn check_secret(req: &HttpRequest, expected: Option<&str>) -> Result<(), IngestError> {
    let expected = expected.ok_or_else(|| IngestError::Config("FUNCTION_SECRET is not configured".into()))?;
    match req.headers().get("x-function-secret").and_then(|v| v.to_str().ok()) {
        Some(h) if h == expected => Ok(()),
        _ => Err(IngestError::Unauthorized),
    }
}

#[post("/register")]
pub async fn register(
    req: HttpRequest,
    pool: web::Data<PgPool>,
    cfg: web::Data<Config>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, IngestError> {
    check_secret(&req, cfg.function_secret.as_deref())?;

    let payload = body.into_inner();
    if payload.device_id.trim().is_empty() {
        return Err(IngestError::BadRequest("device_id must not be empty".into()));
    }
    let household_id = payload
        .household_id
        .as_deref()
        .or(cfg.default_household_id.as_deref())
        .ok_or_else(|| IngestError::BadRequest("household_id is required".into()))?;
    let display_name = payload.display_name.as_deref().unwrap_or(&payload.device_id);

    let device = upsert(&pool, &payload.device_id, household_id, display_name, cfg.db_timeout).await?;

    Ok(HttpResponse::Ok().json(RegisterResponse { ok: true, scale: device }))
}
