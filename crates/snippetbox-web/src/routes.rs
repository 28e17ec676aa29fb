mod home;
mod snippet;
mod user;

use std::path::Path;

use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::Response;
use axum::routing::{get, post};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};

pub use self::snippet::SnippetCreateForm;
pub use self::user::{UserLoginForm, UserSignupForm};
use crate::SharedState;
use crate::csrf::verify_csrf;
use crate::error::status_response;
use crate::middleware::{log_request, recover_panic, require_authentication, secure_headers};
use crate::session::{SESSION_COOKIE_NAME, serialize_session_requests};

pub fn session_layer<Store>(
    store: Store,
    lifetime: time::Duration,
    secure: bool,
) -> SessionManagerLayer<Store>
where
    Store: SessionStore + Clone,
{
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(lifetime))
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(secure)
}

/// The whole application.
///
/// Outermost first: panic recovery, request log, security headers. Dynamic
/// routes then get the session lock, session load/save and CSRF check, and
/// the gated ones the authentication check on top. Static files skip the
/// session part.
pub fn make_router<Store>(
    state: SharedState,
    session_layer: SessionManagerLayer<Store>,
    static_dir: &Path,
) -> Router
where
    Store: SessionStore + Clone,
{
    let protected = Router::new()
        .route(
            "/snippet/create",
            get(snippet::get_create).post(snippet::post_create),
        )
        .route("/user/logout", post(user::post_logout))
        .route_layer(middleware::from_fn(require_authentication));

    let dynamic = Router::new()
        .route("/", get(home::get_home))
        .route("/snippet/view/{id}", get(snippet::get_view))
        .route(
            "/user/signup",
            get(user::get_signup).post(user::post_signup),
        )
        .route("/user/login", get(user::get_login).post(user::post_login))
        .merge(protected)
        // route layers only, so a wrong method is a 405 before any session work
        .route_layer(middleware::from_fn(verify_csrf))
        .route_layer(session_layer)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            serialize_session_requests,
        ));

    Router::new()
        .merge(dynamic)
        .nest_service("/static", ServeDir::new(static_dir))
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(secure_headers))
        .layer(middleware::from_fn(log_request))
        .layer(CatchPanicLayer::custom(recover_panic))
}

async fn not_found() -> Response {
    status_response(StatusCode::NOT_FOUND)
}
