use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;

use crate::SharedState;
use crate::error::RequestResult;
use crate::render::Page;

pub async fn get_home(state: State<SharedState>, page: Page) -> RequestResult<Response> {
    let snippets = state.snippets.latest_snippets().await?;

    let data = page.template_data().await?.with_snippets(snippets);
    state.render(StatusCode::OK, "home.html", &data)
}
