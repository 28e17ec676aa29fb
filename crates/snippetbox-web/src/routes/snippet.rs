use std::sync::LazyLock;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse as _, Redirect, Response};
use serde::Serialize;
use snafu::OptionExt as _;
use tracing::debug;

use crate::error::{NotFoundSnafu, RequestResult};
use crate::form::{DecodeForm, FormBinder, PostForm};
use crate::render::Page;
use crate::session::SessionExt as _;
use crate::validator::{Validates, Validator, max_chars, not_blank, permitted_value};
use crate::{LOG_TARGET, SharedState};

const PERMITTED_EXPIRES_DAYS: [i64; 3] = [1, 7, 365];

#[derive(Debug, Clone, Serialize)]
pub struct SnippetCreateForm {
    pub title: String,
    pub content: String,
    pub expires: i64,
    #[serde(flatten)]
    validator: Validator,
}

impl Default for SnippetCreateForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            content: String::new(),
            expires: 365,
            validator: Validator::default(),
        }
    }
}

impl Validates for SnippetCreateForm {
    fn validator(&self) -> &Validator {
        &self.validator
    }

    fn validator_mut(&mut self) -> &mut Validator {
        &mut self.validator
    }
}

static SNIPPET_CREATE_BINDER: LazyLock<FormBinder<SnippetCreateForm>> = LazyLock::new(|| {
    FormBinder::<SnippetCreateForm>::new()
        .text("title", |f| &mut f.title)
        .text("content", |f| &mut f.content)
        .int("expires", |f| &mut f.expires)
});

impl DecodeForm for SnippetCreateForm {
    fn binder() -> &'static FormBinder<Self> {
        &SNIPPET_CREATE_BINDER
    }
}

impl SnippetCreateForm {
    pub fn validate(&mut self) {
        self.check_field(
            not_blank(&self.title),
            "title",
            "This field cannot be blank",
        );
        self.check_field(
            max_chars(&self.title, 100),
            "title",
            "This field cannot be more than 100 characters long",
        );
        self.check_field(
            not_blank(&self.content),
            "content",
            "This field cannot be blank",
        );
        self.check_field(
            permitted_value(&self.expires, &PERMITTED_EXPIRES_DAYS),
            "expires",
            "This field must equal 1, 7 or 365",
        );
    }
}

pub async fn get_view(
    state: State<SharedState>,
    Path(id): Path<String>,
    page: Page,
) -> RequestResult<Response> {
    let id = id
        .parse::<u64>()
        .ok()
        .filter(|id| 1 <= *id)
        .context(NotFoundSnafu)?;

    let snippet = state.snippets.get_snippet(id).await?;

    let data = page.template_data().await?.with_snippet(snippet);
    state.render(StatusCode::OK, "view.html", &data)
}

pub async fn get_create(state: State<SharedState>, page: Page) -> RequestResult<Response> {
    let data = page
        .template_data()
        .await?
        .with_form(&SnippetCreateForm::default());
    state.render(StatusCode::OK, "create.html", &data)
}

pub async fn post_create(
    state: State<SharedState>,
    page: Page,
    PostForm(mut form): PostForm<SnippetCreateForm>,
) -> RequestResult<Response> {
    form.validate();
    if !form.valid() {
        let data = page.template_data().await?.with_form(&form);
        return state.render(StatusCode::UNPROCESSABLE_ENTITY, "create.html", &data);
    }

    let expires_days = u32::try_from(form.expires).expect("Validated against permitted values");
    let id = state
        .snippets
        .insert_snippet(&form.title, &form.content, expires_days)
        .await?;
    debug!(target: LOG_TARGET, %id, "Snippet created");

    page.session()
        .set_flash("Snippet successfully created!")
        .await?;

    Ok(Redirect::to(&format!("/snippet/view/{id}")).into_response())
}
