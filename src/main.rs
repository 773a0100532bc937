//! Librarium Server - Library Management System
//!
//! A Rust REST API server for library management.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use librarium_server::{
    api,
    config::AppConfig,
    repository::Repository,
    services::Services,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().expect("Failed to load configuration");

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("librarium_server={},tower_http=debug", config.logging.level).into()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Librarium Server v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations completed");

    // Save server address before moving config
    let server_host = config.server.host.clone();
    let server_port = config.server.port;

    // Create repository and services
    let repository = Repository::new(pool);
    let services = Services::new(repository, config.auth.clone());

    // Create application state
    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(
        server_host.parse().expect("Invalid host address"),
        server_port,
    );

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Registration and authentication
        .route("/users/register", post(api::auth::register))
        .route("/users/login", post(api::auth::login))
        .route("/users/profile", get(api::auth::profile))
        // Users
        .route("/users", get(api::users::list_users))
        .route("/users/:id", get(api::users::get_user))
        .route("/users/:id", put(api::users::update_user))
        .route("/users/:id", delete(api::users::delete_user))
        .route("/users/:id/loans", get(api::loans::get_user_loans))
        // Authors
        .route("/authors", get(api::authors::list_authors))
        .route("/authors/:id", get(api::authors::get_author))
        .route("/authors/create", post(api::authors::create_author))
        .route("/authors/update/:id", put(api::authors::update_author))
        .route("/authors/delete/:id", delete(api::authors::delete_author))
        // Categories
        .route("/categories", get(api::categories::list_categories))
        .route("/categories/:id", get(api::categories::get_category))
        .route("/categories/create", post(api::categories::create_category))
        .route("/categories/update/:id", put(api::categories::update_category))
        .route("/categories/delete/:id", delete(api::categories::delete_category))
        .route("/categories/:id/books", get(api::categories::get_books_by_category))
        // Books
        .route("/books", get(api::books::list_books))
        .route("/books/:id", get(api::books::get_book))
        .route("/books/create", post(api::books::create_book))
        .route("/books/update/:id", put(api::books::update_book))
        .route("/books/delete/:id", delete(api::books::delete_book))
        // Loans
        .route("/loans/create", post(api::loans::create_loan))
        .route("/loans", get(api::loans::list_loans))
        .route("/loans/overdue", get(api::loans::list_overdue_loans))
        .route("/loans/:id", get(api::loans::get_loan))
        .route("/loans/update/:id", put(api::loans::update_loan_status))
        .route("/loans/:id/extend", put(api::loans::extend_loan))
        .route("/loans/:id/return", post(api::loans::return_loan))
        .with_state(state);

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .merge(routes)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
