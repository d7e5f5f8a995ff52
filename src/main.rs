use std::time::Duration;

use actix_cors::Cors;
use actix_files::Files;
use actix_web::{App, HttpServer, middleware, web};
use anyhow::Context;
use dotenvy::dotenv;
use tracing::{info, warn};

mod audit;
mod auth;
mod config;
mod crypto;
mod db;
mod error;
mod handlers;
mod logging;
mod models;
mod monitoring;
mod notifications;
mod reports;
mod response;
mod routes;
mod schema;
mod validation;

use config::Config;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    logging::init();

    let config = Config::load()?;
    error::expose_error_details(config.is_development());

    std::fs::create_dir_all(&config.upload_dir)
        .with_context(|| format!("creating upload directory {}", config.upload_dir))?;

    let pool = db::build_pool(&config.database_url, config.db_pool_size)?;
    if !db::check_connection(&pool).await {
        warn!("Starting without a verified database connection");
    }

    if config.reminders_enabled {
        notifications::spawn_reminders(
            pool.clone(),
            Duration::from_secs(config.reminder_interval_secs),
        );
    }

    let bind = (config.host.clone(), config.port);
    info!(host = %bind.0, port = bind.1, environment = %config.environment, "Server running");

    let config = web::Data::new(config);
    let pool = web::Data::new(pool);

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(middleware::NormalizePath::trim())
            .wrap(middleware::from_fn(logging::trace_requests))
            .app_data(config.clone())
            .app_data(pool.clone())
            .configure(routes::extractor_config)
            .configure(routes::configure)
            .service(Files::new("/uploads", &config.upload_dir))
            .default_service(web::to(handlers::not_found))
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}
