//! Anti-forgery tokens bound to the session.
//!
//! Every session gets one random token, created on its first safe request.
//! Pages embed it in forms as `csrf_token`; state-changing requests must
//! echo it back (form field, or `X-CSRF-Token` header for scripts).

use axum::body::{Body, to_bytes};
use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{HeaderName, Method};
use axum::middleware::Next;
use axum::response::Response;
use data_encoding::BASE64URL_NOPAD;
use snafu::{OptionExt as _, ResultExt as _};
use subtle::ConstantTimeEq as _;
use tower_sessions::Session;
use tracing::debug;

use crate::LOG_TARGET;
use crate::error::{BodySnafu, CsrfRejectedSnafu, RequestError, RequestResult};
use crate::form::FormValues;
use crate::session::CSRF_TOKEN_KEY;

pub const CSRF_FORM_FIELD: &str = "csrf_token";
pub static CSRF_HEADER: HeaderName = HeaderName::from_static("x-csrf-token");

const MAX_FORM_BODY_BYTES: usize = 1 << 20;

/// The current session's token, available to handlers for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken(pub String);

impl CsrfToken {
    pub fn generate() -> Self {
        Self(BASE64URL_NOPAD.encode(&rand::random::<[u8; 32]>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn matches(&self, submitted: &str) -> bool {
        self.0.as_bytes().ct_eq(submitted.as_bytes()).into()
    }
}

impl<S> FromRequestParts<S> for CsrfToken
where
    S: Send + Sync,
{
    type Rejection = RequestError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Missing only if the route is outside the csrf layer: a wiring bug.
        parts
            .extensions
            .get::<CsrfToken>()
            .cloned()
            .context(CsrfRejectedSnafu)
    }
}

fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

async fn session_token(session: &Session) -> RequestResult<Option<CsrfToken>> {
    Ok(session.get::<String>(CSRF_TOKEN_KEY).await?.map(CsrfToken))
}

/// Middleware: issue the token on safe requests, check it on the rest.
///
/// Rejections happen before the handler runs. The checked body is handed
/// on to the handler unchanged.
pub async fn verify_csrf(session: Session, req: Request, next: Next) -> RequestResult<Response> {
    let (mut parts, body) = req.into_parts();

    if is_safe(&parts.method) {
        let token = match session_token(&session).await? {
            Some(token) => token,
            None => {
                let token = CsrfToken::generate();
                session.insert(CSRF_TOKEN_KEY, token.as_str()).await?;
                token
            }
        };
        parts.extensions.insert(token);
        return Ok(next.run(Request::from_parts(parts, body)).await);
    }

    let Some(expected) = session_token(&session).await? else {
        debug!(target: LOG_TARGET, method = %parts.method, "No CSRF token in session");
        return CsrfRejectedSnafu.fail();
    };

    let bytes = to_bytes(body, MAX_FORM_BODY_BYTES)
        .await
        .context(BodySnafu)?;

    let header_token = parts
        .headers
        .get(&CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);
    let submitted = match header_token {
        Some(token) => Some(token),
        None => FormValues::parse(&bytes)
            .first(CSRF_FORM_FIELD)
            .map(ToOwned::to_owned),
    };

    if !submitted.is_some_and(|s| expected.matches(&s)) {
        debug!(target: LOG_TARGET, method = %parts.method, uri = %parts.uri, "CSRF token mismatch");
        return CsrfRejectedSnafu.fail();
    }

    parts.extensions.insert(expected);
    Ok(next
        .run(Request::from_parts(parts, Body::from(bytes)))
        .await)
}
