use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

use crate::configuration::{PasswordSettings, Settings, StoreBackend, TokenSettings};
use crate::error::AppError;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{health_check, login, logout, me, refresh, signup};
use crate::session::SessionService;
use crate::store::{
    run_migrations, InMemoryRefreshTokenStore, InMemoryUserStore, PgRefreshTokenStore,
    PgUserStore,
};

/// Build the session service over the configured store backend.
///
/// The Postgres backend connects and applies pending migrations first.
pub async fn build_session_service(settings: &Settings) -> Result<SessionService, AppError> {
    match settings.application.store {
        StoreBackend::Postgres => {
            tracing::info!("Attempting to connect to database");
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&settings.database.connection_string())
                .await?;
            run_migrations(&pool).await?;
            tracing::info!("Database connection pool created successfully");

            SessionService::from_settings(
                Arc::new(PgUserStore::new(pool.clone())),
                Arc::new(PgRefreshTokenStore::new(pool)),
                &settings.tokens,
                &settings.password,
            )
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; sessions are lost on restart");
            in_memory_session_service(&settings.tokens, &settings.password)
        }
    }
}

pub fn in_memory_session_service(
    tokens: &TokenSettings,
    password: &PasswordSettings,
) -> Result<SessionService, AppError> {
    SessionService::from_settings(
        Arc::new(InMemoryUserStore::new()),
        Arc::new(InMemoryRefreshTokenStore::new()),
        tokens,
        password,
    )
}

pub fn run(listener: TcpListener, sessions: SessionService) -> Result<Server, std::io::Error> {
    let access_tokens = sessions.access_tokens();
    let sessions = web::Data::new(sessions);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)
            .app_data(sessions.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/users")
                    // Public routes
                    .route("/signup", web::post().to(signup))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    // Protected routes
                    .service(
                        web::scope("")
                            .wrap(JwtMiddleware::new(access_tokens.clone()))
                            .route("/me", web::get().to(me))
                            .route("/logout", web::post().to(logout)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
