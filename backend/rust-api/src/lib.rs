use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod errors;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod storage;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    response
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1/auth", auth_routes(app_state.clone()))
        .nest(
            "/api/v1/user",
            user_routes().route_layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .nest("/api/v1/curriculum", curriculum_routes(app_state.clone()))
        .nest("/api/v1/mentor", mentor_routes(app_state.clone()))
        .nest("/api/v1/admin", admin_routes(app_state.clone()))
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn auth_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let register_route = Router::new()
        .route("/register", post(handlers::auth::register))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::register_rate_limit_middleware,
        ));

    let login_route = Router::new()
        .route("/login", post(handlers::auth::login))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::rate_limit::login_rate_limit_middleware,
        ));

    register_route.merge(login_route)
}

fn user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(handlers::user::me))
        .route("/update", put(handlers::user::update))
        .route("/credits", get(handlers::user::credits))
}

fn curriculum_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Paid AI generation, rate limited per user
    let generation_routes = Router::new()
        .route("/create", post(handlers::curriculum::create))
        .route("/{id}/quiz/generate", post(handlers::quiz::generate))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::generation_rate_limit_middleware,
        ));

    let routes = Router::new()
        .route("/", get(handlers::curriculum::list))
        .route(
            "/{id}",
            get(handlers::curriculum::get)
                .put(handlers::curriculum::update)
                .delete(handlers::curriculum::delete),
        )
        .route("/{id}/quiz", get(handlers::quiz::get))
        .route("/{id}/quiz/submit", post(handlers::quiz::submit));

    generation_routes
        .merge(routes)
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}

fn mentor_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(handlers::mentor::chat))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::generation_rate_limit_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}

fn admin_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(handlers::admin::list_users))
        .route(
            "/users/{id}",
            get(handlers::admin::get_user).delete(handlers::admin::delete_user),
        )
        .route("/users/{id}/role", put(handlers::admin::update_user_role))
        .route(
            "/users/{id}/credits",
            put(handlers::admin::update_user_credits),
        )
        .route("/curriculum", get(handlers::admin::list_curricula))
        .route(
            "/curriculum/{id}",
            get(handlers::admin::get_curriculum).delete(handlers::admin::delete_curriculum),
        )
        .route("/stats", get(handlers::admin::stats))
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}
