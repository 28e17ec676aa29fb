use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use snafu::{Report, Snafu};
use snippetbox_db::DbError;
use tracing::{debug, error};

use crate::LOG_TARGET;
use crate::form::FormDecodeError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RequestError {
    #[snafu(display("Not found"))]
    NotFound,
    #[snafu(display("Malformed form submission"))]
    Decode { source: FormDecodeError },
    #[snafu(display("Could not read request body"))]
    Body { source: axum::Error },
    #[snafu(display("CSRF token missing or mismatched"))]
    CsrfRejected,
    #[snafu(display("Template `{name}` does not exist"))]
    TemplateNotFound { name: String },
    #[snafu(display("Failed to render template `{name}`"))]
    TemplateRender {
        name: String,
        source: minijinja::Error,
    },
    #[snafu(transparent)]
    Session {
        source: tower_sessions::session::Error,
    },
    #[snafu(display("Storage error"))]
    Db { source: DbError },
}
pub type RequestResult<T> = std::result::Result<T, RequestError>;

/// `NoRecord` is the one storage outcome that is the client's doing.
impl From<DbError> for RequestError {
    fn from(source: DbError) -> Self {
        match source {
            DbError::NoRecord => RequestError::NotFound,
            source => RequestError::Db { source },
        }
    }
}

/// Plain-text response carrying only the standard reason phrase.
pub fn status_response(status: StatusCode) -> Response {
    (status, status.canonical_reason().unwrap_or_default()).into_response()
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let status = match self {
            RequestError::NotFound => StatusCode::NOT_FOUND,
            RequestError::Decode { .. }
            | RequestError::Body { .. }
            | RequestError::CsrfRejected => {
                debug!(
                    target: LOG_TARGET,
                    err = %Report::from_error(&self),
                    "Rejected client request"
                );
                StatusCode::BAD_REQUEST
            }
            _ => {
                error!(
                    target: LOG_TARGET,
                    err = %Report::from_error(&self),
                    "Server error"
                );
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        status_response(status)
    }
}
