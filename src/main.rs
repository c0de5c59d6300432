//! Fez Backend
//!
//! REST backend for shipboard Looking-For-Group activities, with SQLite
//! persistence and Tantivy full-text search.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod fez;
mod filter;
mod models;
mod search;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{Config, LogFormat};
use db::Repository;
use errors::AppError;
use fez::{ListingService, MembershipEngine};
use search::SearchIndex;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub engine: Arc<MembershipEngine>,
    pub listing: Arc<ListingService>,
    pub search: Arc<SearchIndex>,
    pub config: Arc<Config>,
}

/// Open the store and index, and load every fez into the engine.
pub async fn init_state(config: Config) -> Result<AppState, AppError> {
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    let engine = Arc::new(MembershipEngine::new(repo.clone(), repo.clone()));
    let loaded = engine.load().await?;
    tracing::info!("Loaded {} fezzes", loaded);

    let listing = Arc::new(ListingService::new(engine.clone(), repo.clone()));

    let search = Arc::new(SearchIndex::open(&config.index_path)?);
    tracing::info!("Building search index...");
    search.rebuild(&engine.all().await).await?;

    Ok(AppState {
        repo,
        engine,
        listing,
        search,
        config: Arc::new(config),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    tracing::info!("Starting Fez Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (FEZ_API_PSK). Authentication is disabled!");
    }

    let bind_addr = config.bind_addr;
    let state = init_state(config).await?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let psk = state.config.api_psk.clone();

    let api_routes = Router::new()
        .route("/revision", get(api::get_revision))
        // Users
        .route("/users", post(api::create_user))
        .route("/users/whoami", get(api::whoami))
        .route("/users/mutewords", put(api::set_mutewords))
        .route("/users/find/{username}", get(api::find_user))
        .route("/users/{user_id}/block", post(api::block_user))
        .route("/users/{user_id}/unblock", post(api::unblock_user))
        // Fez listings
        .route("/fez/types", get(api::list_types))
        .route("/fez/open", get(api::list_open))
        .route("/fez/joined", get(api::list_joined))
        .route("/fez/owner", get(api::list_owned))
        .route("/fez/search", get(api::search_fezzes))
        // Fez membership
        .route("/fez/create", post(api::create_fez))
        .route("/fez/{id}", get(api::get_fez))
        .route("/fez/{id}/join", post(api::join_fez))
        .route("/fez/{id}/unjoin", post(api::unjoin_fez))
        .route("/fez/{id}/user/{user_id}/add", post(api::add_member))
        .route("/fez/{id}/user/{user_id}/remove", post(api::remove_member))
        // Posts
        .route("/fez/{id}/post", post(api::create_post))
        .route("/fez/post/{post_id}/delete", post(api::delete_post))
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
