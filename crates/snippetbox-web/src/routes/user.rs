use std::sync::LazyLock;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse as _, Redirect, Response};
use serde::Serialize;
use snippetbox_db::DbError;
use tracing::{debug, info};

use crate::error::RequestResult;
use crate::form::{DecodeForm, FormBinder, PostForm};
use crate::middleware::LOGIN_PATH;
use crate::render::Page;
use crate::session::SessionExt as _;
use crate::validator::{EMAIL_RX, Validates, Validator, matches, min_chars, not_blank};
use crate::{LOG_TARGET, SharedState};

const BLANK: &str = "This field cannot be blank";
const BAD_EMAIL: &str = "This field must be a valid email address";

#[derive(Debug, Default, Clone, Serialize)]
pub struct UserSignupForm {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(flatten)]
    validator: Validator,
}

impl Validates for UserSignupForm {
    fn validator(&self) -> &Validator {
        &self.validator
    }

    fn validator_mut(&mut self) -> &mut Validator {
        &mut self.validator
    }
}

static USER_SIGNUP_BINDER: LazyLock<FormBinder<UserSignupForm>> = LazyLock::new(|| {
    FormBinder::<UserSignupForm>::new()
        .text("name", |f| &mut f.name)
        .text("email", |f| &mut f.email)
        .text("password", |f| &mut f.password)
});

impl DecodeForm for UserSignupForm {
    fn binder() -> &'static FormBinder<Self> {
        &USER_SIGNUP_BINDER
    }
}

impl UserSignupForm {
    pub fn validate(&mut self) {
        self.check_field(not_blank(&self.name), "name", BLANK);
        self.check_field(not_blank(&self.email), "email", BLANK);
        self.check_field(matches(&self.email, &EMAIL_RX), "email", BAD_EMAIL);
        self.check_field(not_blank(&self.password), "password", BLANK);
        self.check_field(
            min_chars(&self.password, 8),
            "password",
            "This field must be at least 8 characters long",
        );
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct UserLoginForm {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(flatten)]
    validator: Validator,
}

impl Validates for UserLoginForm {
    fn validator(&self) -> &Validator {
        &self.validator
    }

    fn validator_mut(&mut self) -> &mut Validator {
        &mut self.validator
    }
}

static USER_LOGIN_BINDER: LazyLock<FormBinder<UserLoginForm>> = LazyLock::new(|| {
    FormBinder::<UserLoginForm>::new()
        .text("email", |f| &mut f.email)
        .text("password", |f| &mut f.password)
});

impl DecodeForm for UserLoginForm {
    fn binder() -> &'static FormBinder<Self> {
        &USER_LOGIN_BINDER
    }
}

impl UserLoginForm {
    pub fn validate(&mut self) {
        self.check_field(not_blank(&self.email), "email", BLANK);
        self.check_field(matches(&self.email, &EMAIL_RX), "email", BAD_EMAIL);
        self.check_field(not_blank(&self.password), "password", BLANK);
    }
}

pub async fn get_signup(state: State<SharedState>, page: Page) -> RequestResult<Response> {
    let data = page
        .template_data()
        .await?
        .with_form(&UserSignupForm::default());
    state.render(StatusCode::OK, "signup.html", &data)
}

pub async fn post_signup(
    state: State<SharedState>,
    page: Page,
    PostForm(mut form): PostForm<UserSignupForm>,
) -> RequestResult<Response> {
    form.validate();

    if form.valid() {
        let inserted = state
            .users
            .insert_user(&form.name, &form.email, &form.password)
            .await;
        match inserted {
            Ok(id) => {
                info!(target: LOG_TARGET, %id, "User signed up");
                page.session()
                    .set_flash("Your signup was successful. Please log in.")
                    .await?;
                return Ok(Redirect::to(LOGIN_PATH).into_response());
            }
            Err(DbError::DuplicateEmail) => {
                form.add_field_error("email", "Email address is already in use");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let data = page.template_data().await?.with_form(&form);
    state.render(StatusCode::UNPROCESSABLE_ENTITY, "signup.html", &data)
}

pub async fn get_login(state: State<SharedState>, page: Page) -> RequestResult<Response> {
    let data = page
        .template_data()
        .await?
        .with_form(&UserLoginForm::default());
    state.render(StatusCode::OK, "login.html", &data)
}

pub async fn post_login(
    state: State<SharedState>,
    page: Page,
    PostForm(mut form): PostForm<UserLoginForm>,
) -> RequestResult<Response> {
    form.validate();

    if form.valid() {
        let authenticated = state
            .users
            .authenticate_user(&form.email, &form.password)
            .await;
        match authenticated {
            Ok(id) => {
                page.session().log_in(id).await?;
                debug!(target: LOG_TARGET, %id, "User logged in");
                return Ok(Redirect::to("/snippet/create").into_response());
            }
            Err(DbError::InvalidCredentials) => {
                form.add_non_field_error("Email or password is incorrect");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let data = page.template_data().await?.with_form(&form);
    state.render(StatusCode::UNPROCESSABLE_ENTITY, "login.html", &data)
}

pub async fn post_logout(page: Page) -> RequestResult<Response> {
    page.session()
        .log_out("You've been logged out successfully!")
        .await?;

    Ok(Redirect::to("/").into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FormValues;

    fn signup(body: &str) -> UserSignupForm {
        let mut form = UserSignupForm::binder()
            .decode(&FormValues::parse(body.as_bytes()))
            .unwrap();
        form.validate();
        form
    }

    #[test]
    fn signup_rules() {
        let form = signup("name=Alice&email=alice%40example.com&password=pa55word");
        assert!(form.valid());

        let form = signup("name=&email=alice&password=short");
        assert_eq!(form.validator().field_error("name"), Some(BLANK));
        assert_eq!(form.validator().field_error("email"), Some(BAD_EMAIL));
        assert_eq!(
            form.validator().field_error("password"),
            Some("This field must be at least 8 characters long")
        );
    }

    #[test]
    fn password_is_never_serialized() {
        let form = signup("name=Alice&email=alice%40example.com&password=hunter22hunter");
        let value = minijinja::Value::from_serialize(&form);

        assert_eq!(
            value.get_attr("email").unwrap().as_str(),
            Some("alice@example.com")
        );
        assert!(value.get_attr("password").unwrap().is_undefined());
    }

    #[test]
    fn login_requires_both_fields() {
        let mut form = UserLoginForm::binder()
            .decode(&FormValues::parse(b"email=&password="))
            .unwrap();
        form.validate();

        assert_eq!(form.validator().field_error("email"), Some(BLANK));
        assert_eq!(form.validator().field_error("password"), Some(BLANK));
    }
}
