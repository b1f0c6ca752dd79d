use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeader;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::middleware::{csrf_protect, login_required, render_errors, session_layer};
use crate::state::AppState;
use crate::{api, auth, site};

/// Largest story form accepted, image included.
const MAX_FORM_BYTES: usize = 10 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(site::index))
        .route("/login", get(auth::login_page))
        .route("/logout", get(auth::logout))
        .route("/stories/random", get(site::random_story))
        .route("/stories/{id}", get(site::story_detail));

    let oauth_routes = Router::new()
        .route("/login-google", post(auth::login_google))
        .route("/login-facebook", post(auth::login_facebook))
        .route_layer(middleware::from_fn(csrf_protect));

    let member_routes = Router::new()
        .route("/dashboard", get(site::dashboard))
        .route(
            "/stories/create",
            get(site::new_story).post(site::create_story),
        )
        .route(
            "/stories/{id}/edit",
            get(site::edit_story).post(site::update_story),
        )
        .route("/stories/{id}/delete", post(site::delete_story))
        .route_layer(middleware::from_fn(login_required))
        .layer(DefaultBodyLimit::max(MAX_FORM_BYTES));

    // The JSON API is read-only and public.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::OPTIONS]);

    let api_routes = Router::new()
        .route("/api/stories", get(api::list_stories))
        .route("/api/stories/{id}", get(api::get_story))
        .route("/api/categories", get(api::list_categories))
        .route("/api/categories/{id}", get(api::get_category))
        .layer(cors);

    // Uploaded files never run as documents of this origin.
    let uploads = SetResponseHeader::overriding(
        SetResponseHeader::overriding(
            ServeDir::new(state.uploads.dir()),
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("sandbox"),
        ),
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );

    Router::new()
        .merge(public_routes)
        .merge(oauth_routes)
        .merge(member_routes)
        .merge(api_routes)
        .nest_service(state.uploads.base_url(), uploads)
        .route("/health", get(health))
        .fallback(|| async { AppError::NotFound })
        .layer(middleware::from_fn_with_state(state.clone(), session_layer))
        .layer(middleware::from_fn(render_errors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
