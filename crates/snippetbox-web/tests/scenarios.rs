mod common;

use common::{TestServer, location, set_session_cookie};

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn snippet_create_validation_then_success() {
    let server = TestServer::start().await;
    let driver = server.driver();
    driver.signup_and_login().await;

    let resp = driver
        .submit(
            "/snippet/create",
            &[("title", ""), ("content", "Climb Mount Fuji"), ("expires", "7")],
        )
        .await;
    assert_eq!(resp.status(), 422);
    let body = resp.text().await.unwrap();
    assert!(body.contains("This field cannot be blank"));
    assert!(body.contains("Climb Mount Fuji"), "input is preserved");

    let long_title = "x".repeat(101);
    let resp = driver
        .submit(
            "/snippet/create",
            &[("title", &long_title), ("content", "c"), ("expires", "7")],
        )
        .await;
    assert_eq!(resp.status(), 422);
    assert!(
        resp.text()
            .await
            .unwrap()
            .contains("This field cannot be more than 100 characters long")
    );

    let resp = driver
        .submit(
            "/snippet/create",
            &[("title", "O snail"), ("content", "But slowly, slowly!"), ("expires", "7")],
        )
        .await;
    assert_eq!(resp.status(), 303);
    assert_eq!(location(&resp), "/snippet/view/1", "no record from failed attempts");

    let page = driver.get_text("/snippet/view/1").await;
    assert!(page.contains("Snippet successfully created!"));
    assert!(page.contains("But slowly, slowly!"));

    let page = driver.get_text("/snippet/view/1").await;
    assert!(!page.contains("Snippet successfully created!"), "flash shows once");

    let home = driver.get_text("/").await;
    assert!(home.contains(r#"<a href="/snippet/view/1">O snail</a>"#));

    server.shutdown().await;
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn login_and_logout_rotate_the_session() {
    let server = TestServer::start().await;
    let driver = server.driver();

    let resp = driver
        .submit(
            "/user/signup",
            &[
                ("name", "Alice"),
                ("email", "alice@example.com"),
                ("password", "pa55word-long"),
            ],
        )
        .await;
    assert_eq!(resp.status(), 303);
    let anonymous = set_session_cookie(&resp).expect("flash is stored in the session");

    let login_page = driver.get_text("/user/login").await;
    assert!(login_page.contains("Your signup was successful. Please log in."));

    let token = driver.csrf_token("/user/login").await;
    let resp = driver
        .post_form(
            "/user/login",
            &[
                ("email", "alice@example.com"),
                ("password", "pa55word-long"),
                ("csrf_token", &token),
            ],
        )
        .await;
    assert_eq!(resp.status(), 303);
    assert_eq!(location(&resp), "/snippet/create");
    let after_login = set_session_cookie(&resp).expect("login issues a new session id");
    assert_ne!(anonymous, after_login);

    assert_eq!(driver.get("/snippet/create").await.status(), 200);

    let resp = driver.submit("/snippet/create", &[]).await;
    assert_eq!(resp.status(), 422, "signed in, form is just empty");

    let token = driver.csrf_token("/").await;
    let resp = driver
        .post_form("/user/logout", &[("csrf_token", &token)])
        .await;
    assert_eq!(resp.status(), 303);
    assert_eq!(location(&resp), "/");
    let after_logout = set_session_cookie(&resp).expect("logout issues a new session id");
    assert_ne!(after_login, after_logout);

    let home = driver.get_text("/").await;
    assert!(home.contains("You&#x27;ve been logged out successfully!"));
    let home = driver.get_text("/").await;
    assert!(!home.contains("logged out successfully"), "flash shows once");

    let resp = driver.get("/snippet/create").await;
    assert_eq!(resp.status(), 303);
    assert_eq!(location(&resp), "/user/login");

    server.shutdown().await;
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn bad_credentials_and_duplicate_signup() {
    let server = TestServer::start().await;
    let driver = server.driver();
    driver
        .signup("Alice", "alice@example.com", "pa55word-long")
        .await;

    let resp = driver.login("alice@example.com", "not-the-password").await;
    assert_eq!(resp.status(), 422);
    assert!(
        resp.text()
            .await
            .unwrap()
            .contains("Email or password is incorrect")
    );

    let resp = driver
        .submit(
            "/user/signup",
            &[
                ("name", "Other Alice"),
                ("email", "alice@example.com"),
                ("password", "another-password"),
            ],
        )
        .await;
    assert_eq!(resp.status(), 422);
    assert!(
        resp.text()
            .await
            .unwrap()
            .contains("Email address is already in use")
    );

    server.shutdown().await;
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn concurrent_submissions_in_one_session_all_succeed() {
    let server = TestServer::start().await;
    let driver = server.driver();
    driver.signup_and_login().await;

    let titles: Vec<_> = (0..8).map(|i| format!("snippet {i}")).collect();
    let statuses = futures::future::join_all(titles.iter().map(|title| {
        let driver = &driver;
        async move {
            driver
                .submit(
                    "/snippet/create",
                    &[("title", title.as_str()), ("content", "c"), ("expires", "1")],
                )
                .await
                .status()
        }
    }))
    .await;
    assert!(statuses.iter().all(|s| *s == 303), "{statuses:?}");

    let home = driver.get_text("/").await;
    for title in &titles {
        assert!(home.contains(title.as_str()), "{title} missing");
    }
    assert_eq!(driver.get("/snippet/create").await.status(), 200);

    server.shutdown().await;
}
