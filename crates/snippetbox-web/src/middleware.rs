use std::any::Any;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request};
use axum::http::header::{
    CACHE_CONTROL, CONNECTION, CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS,
    X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse as _, Redirect, Response};
use tower_sessions::Session;
use tracing::{error, info};

use crate::LOG_TARGET;
use crate::error::{RequestResult, status_response};
use crate::session::SessionExt as _;

pub const LOGIN_PATH: &str = "/user/login";

const CSP: &str =
    "default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com";

pub fn apply_security_headers(headers: &mut HeaderMap) {
    headers.insert(CONTENT_SECURITY_POLICY, HeaderValue::from_static(CSP));
    headers.insert(
        REFERRER_POLICY,
        HeaderValue::from_static("origin-when-cross-origin"),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("deny"));
    headers.insert(X_XSS_PROTECTION, HeaderValue::from_static("0"));
}

/// Panic handler for `CatchPanicLayer::custom`.
///
/// The panic message goes to the log only; the client gets a bare 500 and
/// the connection is closed after it.
pub fn recover_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    error!(target: LOG_TARGET, %details, "Request handler panicked");

    let mut response = status_response(StatusCode::INTERNAL_SERVER_ERROR);
    let headers = response.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("close"));
    apply_security_headers(headers);
    response
}

pub async fn log_request(req: Request, next: Next) -> Response {
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_owned());

    info!(
        target: LOG_TARGET,
        %remote_addr,
        proto = ?req.version(),
        method = %req.method(),
        uri = %req.uri(),
        "Received request"
    );

    next.run(req).await
}

pub async fn secure_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    apply_security_headers(response.headers_mut());
    response
}

/// Gate for routes that need a signed-in user.
///
/// Anonymous requests are sent to the login page; signed-in responses are
/// marked uncacheable so shared caches never keep private pages.
pub async fn require_authentication(
    session: Session,
    req: Request,
    next: Next,
) -> RequestResult<Response> {
    if !session.is_authenticated().await? {
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    }

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}
