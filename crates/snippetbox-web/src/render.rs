use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{Html, IntoResponse, Response};
use serde::Serialize;
use snafu::{OptionExt as _, ResultExt as _};
use snippetbox_db::Snippet;
use time::OffsetDateTime;
use tower_sessions::Session;

use crate::UiState;
use crate::csrf::CsrfToken;
use crate::error::{RequestResult, TemplateNotFoundSnafu, TemplateRenderSnafu};
use crate::session::SessionExt as _;

/// Everything a page template can refer to.
#[derive(Debug, Default, Serialize)]
pub struct TemplateData {
    pub current_year: i32,
    pub flash: Option<String>,
    pub is_authenticated: bool,
    pub csrf_token: String,
    pub snippet: Option<Snippet>,
    pub snippets: Vec<Snippet>,
    pub form: Option<minijinja::Value>,
}

impl TemplateData {
    pub fn with_form(mut self, form: &impl Serialize) -> Self {
        self.form = Some(minijinja::Value::from_serialize(form));
        self
    }

    pub fn with_snippet(mut self, snippet: Snippet) -> Self {
        self.snippet = Some(snippet);
        self
    }

    pub fn with_snippets(mut self, snippets: Vec<Snippet>) -> Self {
        self.snippets = snippets;
        self
    }
}

/// Per-request context for rendering a page: the session and its CSRF
/// token.
pub struct Page {
    session: Session,
    csrf_token: CsrfToken,
}

impl<S> FromRequestParts<S> for Page
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        let csrf_token = CsrfToken::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;

        Ok(Self {
            session,
            csrf_token,
        })
    }
}

impl Page {
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Defaults shared by every page. Consumes the pending flash message.
    pub async fn template_data(&self) -> RequestResult<TemplateData> {
        Ok(TemplateData {
            current_year: OffsetDateTime::now_utc().year(),
            flash: self.session.pop_flash().await?,
            is_authenticated: self.session.is_authenticated().await?,
            csrf_token: self.csrf_token.as_str().to_owned(),
            ..TemplateData::default()
        })
    }
}

impl UiState {
    /// Render `page` fully before committing to `status`, so a failing
    /// template turns into a clean 500 rather than a truncated page.
    pub fn render(
        &self,
        status: StatusCode,
        page: &str,
        data: &TemplateData,
    ) -> RequestResult<Response> {
        let template = self
            .templates
            .get(page)
            .context(TemplateNotFoundSnafu { name: page })?;

        let body = template
            .render(data)
            .context(TemplateRenderSnafu { name: page })?;

        Ok((status, Html(body)).into_response())
    }
}
