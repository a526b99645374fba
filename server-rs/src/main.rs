use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

mod audit;
mod auth;
mod config;
mod db;
mod error;
mod middleware;
mod models;
mod policy;
mod routes;
mod services;
mod store;
mod validation;


use auth::Authenticator;
use config::Config;
use services::iris::{IrisClient, PlanLookup};
use store::{OncallStore, PgStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OncallStore>,
    pub config: Arc<Config>,
    pub authenticator: Arc<Authenticator>,
    pub plans: Option<Arc<dyn PlanLookup>>,
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {o}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(middleware::auth::CSRF_HEADER),
        ])
        .allow_credentials(true)
}

fn build_router(state: AppState) -> Router {
    // --- Session routes ---
    let auth_routes = Router::new()
        .route("/login", post(routes::auth::login))
        .route(
            "/logout",
            post(routes::auth::logout).layer(axum_mw::from_fn_with_state(
                state.clone(),
                middleware::auth::authenticate,
            )),
        );

    // --- Reads resolve the viewer if a session is present; writes require one ---
    let team_routes = Router::new()
        .route(
            "/",
            get(routes::teams::list_teams).merge(post(routes::teams::create_team).layer(
                axum_mw::from_fn_with_state(state.clone(), middleware::auth::authenticate),
            )),
        )
        .route(
            "/:team",
            get(routes::teams::get_team)
                .layer(axum_mw::from_fn_with_state(
                    state.clone(),
                    middleware::auth::optional_auth,
                ))
                .merge(
                    axum::routing::put(routes::teams::update_team)
                        .delete(routes::teams::delete_team)
                        .layer(axum_mw::from_fn_with_state(
                            state.clone(),
                            middleware::auth::authenticate,
                        )),
                ),
        )
        .route(
            "/:team/rosters",
            get(routes::rosters::list_rosters)
                .layer(axum_mw::from_fn_with_state(
                    state.clone(),
                    middleware::auth::optional_auth,
                ))
                .merge(post(routes::rosters::create_roster).layer(
                    axum_mw::from_fn_with_state(state.clone(), middleware::auth::authenticate),
                )),
        );

    let user_routes = Router::new().route("/:user", get(routes::users::get_user));

    // --- Compose full API ---
    let api = Router::new()
        .merge(auth_routes)
        .nest("/teams", team_routes)
        .nest("/users", user_routes);

    Router::new()
        .nest("/api/v0", api)
        .route("/health", get(routes::health::health))
        // Global middleware
        .layer(CompressionLayer::new())
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .json()
        .init();

    let config = Config::from_env();

    let pool = match db::create_pool(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Database unavailable: {e}");
            std::process::exit(1);
        }
    };

    let plans: Option<Arc<dyn PlanLookup>> = match IrisClient::new(&config.iris) {
        Some(client) => Some(Arc::new(client)),
        None => {
            tracing::warn!("IRIS_API_HOST not set, escalation plans cannot be verified");
            None
        }
    };

    let state = AppState {
        store: Arc::new(PgStore::new(pool)),
        authenticator: Arc::new(Authenticator::new(config.auth.clone())),
        plans,
        config: Arc::new(config),
    };

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let router = build_router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!("Oncall API listening on {addr}");

    if let Err(e) = axum::serve(listener, router).await {
        tracing::error!("Server error: {e}");
    }
}
