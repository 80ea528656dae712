//! HTTP entrypoint: ingest endpoint, device registry, and worker-invocation
//! route behind a single Postgres-backed job queue.
mod aggregator;
mod config;
mod db;
mod error;
mod ingest;
mod registry;
mod worker;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use tracing_actix_web::TracingLogger;

use config::Config;

#[actix_web::main]
async fn main() -> eyre::Result<()> {
    let _ = color_eyre::install();
    init_tracing();

    let cfg = Config::from_env()?;
    tracing::info!(
        service_role_key_configured = cfg.service_role_key.is_some(),
        function_secret_configured = cfg.function_secret.is_some(),
        function_secret_processor_configured = cfg.function_secret_processor.is_some(),
        default_household_id = cfg.default_household_id.as_deref().unwrap_or("<unset>"),
        "scale_server starting"
    );

    let pool = db::connect(&cfg.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let bind_addr = cfg.bind_addr.clone();
    let pool_data = web::Data::new(pool);
    let cfg_data = web::Data::new(cfg);

    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            .app_data(pool_data.clone())
            .app_data(cfg_data.clone())
            .service(ingest::ingest)
            .service(registry::register)
            .service(worker::invoke)
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();
}
