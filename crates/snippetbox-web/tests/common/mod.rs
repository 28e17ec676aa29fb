#![allow(dead_code)]

use std::sync::LazyLock;

use regex::Regex;
use snippetbox_web::{Opts, Server};
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

static CSRF_RX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name="csrf_token" value="([^"]+)""#).unwrap());

/// A server on a random port with its own temporary database.
pub struct TestServer {
    base_url: String,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
    _temp_dir: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let opts = Opts::new("127.0.0.1:0".into(), temp_dir.path().to_path_buf(), None);
        let server = Server::init(opts)
            .await
            .expect("Failed to start test server");
        let base_url = format!("http://{}", server.addr().expect("Bound address"));

        let (shutdown, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = rx.await;
                })
                .await
                .expect("Server failed");
        });

        Self {
            base_url,
            shutdown,
            handle,
            _temp_dir: temp_dir,
        }
    }

    /// A new driver with its own cookie jar (an independent browser).
    pub fn driver(&self) -> UiDriver {
        UiDriver::new(self.base_url.clone())
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        self.handle.await.expect("Server task panicked");
    }
}

pub struct UiDriver {
    client: reqwest::Client,
    base_url: String,
}

impl UiDriver {
    fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            // tests assert on redirect targets themselves
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to build HTTP client");

        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    pub async fn get_text(&self, path: &str) -> String {
        self.get(path).await.text().await.expect("Response body")
    }

    /// POST exactly `form`, without adding a CSRF token.
    pub async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .form(form)
            .send()
            .await
            .expect("POST request failed")
    }

    /// The token embedded in the page at `path`.
    pub async fn csrf_token(&self, path: &str) -> String {
        let body = self.get_text(path).await;
        CSRF_RX
            .captures(&body)
            .unwrap_or_else(|| panic!("No csrf token on {path}"))[1]
            .to_owned()
    }

    /// Load the form page at `path`, then submit `form` to it like a browser
    /// would.
    pub async fn submit(&self, path: &str, form: &[(&str, &str)]) -> reqwest::Response {
        let token = self.csrf_token(path).await;
        let mut form = form.to_vec();
        form.push(("csrf_token", &token));
        self.post_form(path, &form).await
    }

    pub async fn signup(&self, name: &str, email: &str, password: &str) {
        let resp = self
            .submit(
                "/user/signup",
                &[("name", name), ("email", email), ("password", password)],
            )
            .await;
        assert_eq!(resp.status(), reqwest::StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/user/login");
    }

    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.submit("/user/login", &[("email", email), ("password", password)])
            .await
    }

    pub async fn signup_and_login(&self) {
        self.signup("Alice", "alice@example.com", "pa55word-long")
            .await;
        let resp = self.login("alice@example.com", "pa55word-long").await;
        assert_eq!(resp.status(), reqwest::StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/snippet/create");
    }
}

pub fn location(resp: &reqwest::Response) -> &str {
    resp.headers()
        .get("location")
        .expect("Missing Location header")
        .to_str()
        .expect("Invalid Location header")
}

/// Value of the `session` cookie set by this response, if any.
pub fn set_session_cookie(resp: &reqwest::Response) -> Option<String> {
    resp.cookies()
        .find(|c| c.name() == "session")
        .map(|c| c.value().to_owned())
}
