use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sqlx::sqlite::SqlitePoolOptions;

mod config;
mod db;
mod handlers;
mod middleware;
mod models;
mod services;

use config::Config;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| {
        log::error!("Failed to load configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
    })?;

    log::info!("Starting server at {}:{}", config.host, config.port);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            log::error!("Failed to create database pool: {}", e);
            std::io::Error::other(e)
        })?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        log::error!("Failed to run migrations: {}", e);
        std::io::Error::other(e)
    })?;

    log::info!("Database migrations completed");

    let app_state = web::Data::new(models::AppState {
        db: pool.clone(),
        store: db::SqliteStore::new(pool),
        config: config.clone(),
    });

    if config.cors_origins.is_empty() {
        log::warn!("CORS_ORIGINS is not set, allowing any origin");
    }

    HttpServer::new(move || {
        let allowed_origins = app_state.config.cors_origins.clone();
        let cors = if allowed_origins.is_empty() {
            Cors::default().allow_any_origin()
        } else {
            allowed_origins
                .iter()
                .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        }
        .allowed_methods(vec!["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
        .allowed_headers(vec!["Authorization", "Content-Type"])
        .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(Logger::default())
            .wrap(cors)
            .configure(handlers::configure_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
