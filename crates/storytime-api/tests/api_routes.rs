use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    middleware,
    routing::post,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use storytime_api::middleware::session_layer;
use storytime_api::oauth::OAuthClients;
use storytime_api::session::{SESSION_COOKIE, Session, SessionSigner, UserLogin};
use storytime_api::storage::UploadSet;
use storytime_api::{AppState, AppStateInner, router};
use storytime_db::Database;
use storytime_db::seed::seed_sample_data;
use storytime_types::models::AuthProvider;

const SECRET: &str = "integration-test-secret";
const HOST: &str = "localhost:8000";
const ORIGIN: &str = "http://localhost:8000";
const BOUNDARY: &str = "storytime-form-boundary";

struct TestApp {
    state: AppState,
    _uploads: tempfile::TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        seed_sample_data(&db).unwrap();
        let uploads = UploadSet::photos(dir.path().to_path_buf(), "/uploads/photos")
            .await
            .unwrap();
        let oauth = OAuthClients::new(String::new(), String::new(), String::new(), String::new());
        let state = AppStateInner::new(db, uploads, SessionSigner::new(SECRET), oauth);
        Self {
            state,
            _uploads: dir,
        }
    }

    fn router(&self) -> Router {
        router(self.state.clone())
    }

    async fn get(&self, uri: &str) -> (StatusCode, String) {
        let response = self
            .router()
            .oneshot(
                Request::get(uri)
                    .header(header::HOST, HOST)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        (status, body_text(response.into_body()).await)
    }

    async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self.get(uri).await;
        (status, serde_json::from_str(&body).unwrap())
    }

    fn category_id(&self, label: &str) -> i64 {
        self.state.db.get_category_by_label(label).unwrap().unwrap().id
    }

    /// Store a logged-in session for Jane Doe and return its cookie header.
    fn login_as_jane(&self, csrf_token: &str) -> (i64, String) {
        let user_id = self
            .state
            .db
            .get_user_id_by_email("janedoe@email.com")
            .unwrap()
            .unwrap();
        let payload = serde_json::json!({
            "user_id": user_id,
            "username": "Jane Doe",
            "email": "janedoe@email.com",
            "provider": "google",
            "google_credentials_json": "{\"access_token\":\"x\"}",
            "google_id": "g-1",
            "state": csrf_token,
        });
        self.state
            .db
            .save_session("jane-session", &payload.to_string())
            .unwrap();
        let cookie = format!("{}={}", SESSION_COOKIE, self.state.signer.sign("jane-session"));
        (user_id, cookie)
    }
}

async fn body_text(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn titles(envelope: &Value) -> Vec<String> {
    let mut titles: Vec<String> = envelope["Stories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["title"].as_str().unwrap().to_string())
        .collect();
    titles.sort();
    titles
}

#[tokio::test]
async fn api_lists_published_stories() {
    let app = TestApp::new().await;
    let (status, body) = app.get_json("/api/stories").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Stories"].as_array().unwrap().len(), 5);

    let first = &body["Stories"][0];
    assert!(first["categories"].is_array());
    assert!(first["date_created"].as_str().unwrap().contains('T'));
}

#[tokio::test]
async fn api_filters_by_category() {
    let app = TestApp::new().await;

    let funny = app.category_id("Funny");
    let (status, body) = app.get_json(&format!("/api/stories?category={}", funny)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&body), vec!["Animal Escape", "Fresh Prince"]);

    for (label, count) in [("Animals", 1), ("Scary", 1), ("History", 2), ("Musical", 1)] {
        let id = app.category_id(label);
        let (_, body) = app.get_json(&format!("/api/stories?category={}", id)).await;
        assert_eq!(body["Stories"].as_array().unwrap().len(), count, "{}", label);
    }
}

#[tokio::test]
async fn api_missing_story_is_a_json_404() {
    let app = TestApp::new().await;
    let (status, body) = app.get_json("/api/stories/9999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
    assert_eq!(body["url"], "http://localhost:8000/api/stories/9999");
    assert!(body["message"].as_str().unwrap().contains("can't be found"));

    let (status, body) = app.get_json("/api/stories/not-a-number").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn api_hides_unpublished_stories() {
    let app = TestApp::new().await;
    let (status, body) = app.get_json("/api/stories").await;
    assert_eq!(status, StatusCode::OK);
    let id = body["Stories"][0]["id"].as_i64().unwrap();

    app.state
        .db
        .with_conn(|conn| {
            conn.execute("UPDATE story SET published = 0 WHERE id = ?1", [id])?;
            Ok(())
        })
        .unwrap();

    let (status, _) = app.get_json(&format!("/api/stories/{}", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = app.get_json("/api/stories").await;
    assert_eq!(body["Stories"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn api_categories_are_sorted_by_label() {
    let app = TestApp::new().await;
    let (status, body) = app.get_json("/api/categories").await;
    assert_eq!(status, StatusCode::OK);
    let labels: Vec<&str> = body["Categories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["Animals", "Funny", "History", "Musical", "Scary"]);

    let scary = app.category_id("Scary");
    let (status, body) = app.get_json(&format!("/api/categories/{}", scary)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Category"]["label"], "Scary");
    assert_eq!(body["Category"]["description"], "Scary stories!");
}

#[tokio::test]
async fn website_pages_render() {
    let app = TestApp::new().await;

    let (status, html) = app.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("Animal Escape"));

    let scary = app.category_id("Scary");
    let (status, html) = app.get(&format!("/?category={}", scary)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("The Big Bad Wolf"));
    assert!(!html.contains("Fresh Prince"));

    let (status, _) = app.get("/stories/random").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get("/health").await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "ok"));

    let (status, html) = app.get("/no/such/page").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(html.contains("<h1>404 Not Found</h1>"));
}

#[tokio::test]
async fn member_pages_require_login() {
    let app = TestApp::new().await;
    let (status, html) = app.get("/dashboard").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(html.contains("logged in"));

    let (status, _) = app.get("/stories/create").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

/// Pull the anti-forgery token out of the login page script.
fn login_page_token(html: &str) -> String {
    let start = html.find("encodeURIComponent(\"").unwrap() + "encodeURIComponent(\"".len();
    let end = start + html[start..].find('"').unwrap();
    html[start..end].to_string()
}

#[tokio::test]
async fn oauth_callbacks_are_csrf_protected() {
    let app = TestApp::new().await;

    let response = app
        .router()
        .oneshot(
            Request::get("/login")
                .header(header::HOST, HOST)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    let token = login_page_token(&body_text(response.into_body()).await);

    let post = |uri: String, requested_with: bool| {
        let mut builder = Request::post(uri)
            .header(header::HOST, HOST)
            .header(header::ORIGIN, ORIGIN)
            .header(header::COOKIE, cookie.clone());
        if requested_with {
            builder = builder.header("x-requested-with", "XMLHttpRequest");
        }
        builder.body(Body::from("one-time-code")).unwrap()
    };

    let forged = app
        .router()
        .oneshot(post("/login-google?state=forged".into(), true))
        .await
        .unwrap();
    assert_eq!(forged.status(), StatusCode::FORBIDDEN);

    let no_header = app
        .router()
        .oneshot(post(format!("/login-google?state={}", token), false))
        .await
        .unwrap();
    assert_eq!(no_header.status(), StatusCode::FORBIDDEN);

    // The guard passes; the unconfigured provider then refuses the login.
    let accepted = app
        .router()
        .oneshot(post(format!("/login-google?state={}", token), true))
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn owner_can_view_dashboard_and_delete_story() {
    let app = TestApp::new().await;
    let (user_id, cookie) = app.login_as_jane("tok");

    let response = app
        .router()
        .oneshot(
            Request::get("/dashboard")
                .header(header::HOST, HOST)
                .header(header::COOKIE, cookie.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response.into_body()).await.contains("Fresh Prince"));

    let own = app.state.db.get_stories_by_user_id(user_id).unwrap();
    let own_id = own[0].id;
    let someone_elses = app
        .state
        .db
        .get_published_stories(None)
        .unwrap()
        .into_iter()
        .find(|s| s.user_id != user_id)
        .unwrap()
        .id;

    let delete = |id: i64, token: &str| {
        Request::post(format!("/stories/{}/delete", id))
            .header(header::HOST, HOST)
            .header(header::ORIGIN, ORIGIN)
            .header(header::COOKIE, cookie.clone())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("csrf_token={}", token)))
            .unwrap()
    };

    let response = app.router().oneshot(delete(someone_elses, "tok")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.router().oneshot(delete(own_id, "wrong")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.state.db.get_story_by_id(own_id).unwrap().is_some());

    let response = app.router().oneshot(delete(own_id, "tok")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/dashboard");
    assert!(app.state.db.get_story_by_id(own_id).unwrap().is_none());
}

#[tokio::test]
async fn unknown_category_lists_no_stories() {
    let app = TestApp::new().await;

    let (status, body) = app.get_json("/api/stories?category=424242").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Stories"].as_array().unwrap().len(), 0);

    let (status, html) = app.get("/?category=424242").await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("No stories yet."));
}

#[tokio::test]
async fn uploads_are_served_sandboxed() {
    let app = TestApp::new().await;
    let saved = app.state.uploads.save("kitten.png", b"\x89PNG fake").await.unwrap();

    let response = app
        .router()
        .oneshot(
            Request::get(saved.url.as_str())
                .header(header::HOST, HOST)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_SECURITY_POLICY], "sandbox");
    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
}

fn signed_cookie_id(app: &TestApp, set_cookie: &str) -> String {
    let pair = set_cookie.split(';').next().unwrap();
    let value = pair.strip_prefix(&format!("{}=", SESSION_COOKIE)).unwrap();
    app.state.signer.verify(value).unwrap()
}

#[tokio::test]
async fn login_moves_the_session_to_a_new_cookie() {
    let app = TestApp::new().await;
    let user_id = app
        .state
        .db
        .get_user_id_by_email("janedoe@email.com")
        .unwrap()
        .unwrap();
    app.state.db.save_session("planted", r#"{"state":"tok"}"#).unwrap();
    let planted_cookie = format!("{}={}", SESSION_COOKIE, app.state.signer.sign("planted"));

    let login = move |session: Session| async move {
        session
            .store_user_session(UserLogin {
                user_id,
                username: "Jane Doe".into(),
                email: "janedoe@email.com".into(),
                picture: None,
                provider: AuthProvider::Facebook,
                google_credentials_json: None,
                google_id: None,
                facebook_id: Some("fb-1".into()),
            })
            .map(|()| "welcome")
    };
    let router = Router::new()
        .route("/login-facebook", post(login))
        .layer(middleware::from_fn_with_state(app.state.clone(), session_layer))
        .with_state(app.state.clone());

    let response = router
        .oneshot(
            Request::post("/login-facebook")
                .header(header::HOST, HOST)
                .header(header::COOKIE, planted_cookie.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    let new_id = signed_cookie_id(&app, set_cookie);
    assert_ne!(new_id, "planted");
    assert!(app.state.db.load_session("planted").unwrap().is_none());
    let payload = app.state.db.load_session(&new_id).unwrap().unwrap();
    assert!(payload.contains("fb-1"));

    // The old cookie no longer names a logged-in session.
    let response = app
        .router()
        .oneshot(
            Request::get("/dashboard")
                .header(header::HOST, HOST)
                .header(header::COOKIE, planted_cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn failed_session_load_is_rendered() {
    let app = TestApp::new().await;
    app.state
        .db
        .with_conn(|conn| {
            conn.execute_batch("DROP TABLE session")?;
            Ok(())
        })
        .unwrap();
    let cookie = format!("{}={}", SESSION_COOKIE, app.state.signer.sign("any-session"));

    let request = |uri: &str| {
        Request::get(uri)
            .header(header::HOST, HOST)
            .header(header::COOKIE, cookie.clone())
            .body(Body::empty())
            .unwrap()
    };

    let response = app.router().oneshot(request("/api/stories")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_str(&body_text(response.into_body()).await).unwrap();
    assert_eq!(body["status"], 500);
    assert_eq!(body["url"], "http://localhost:8000/api/stories");

    let response = app.router().oneshot(request("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(response.into_body()).await.contains("<h1>500"));
}

// ── Story forms ─────────────────────────────────────────────────────────

/// A `multipart/form-data` body with text fields followed by the `image`
/// file part.
fn story_form(fields: &[(&str, &str)], image: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((filename, data)) = image {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn form_post(uri: &str, cookie: &str, body: Vec<u8>) -> Request<Body> {
    Request::post(uri)
        .header(header::HOST, HOST)
        .header(header::ORIGIN, ORIGIN)
        .header(header::COOKIE, cookie)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn create_story_form_with_image_and_categories() {
    let app = TestApp::new().await;
    let (user_id, cookie) = app.login_as_jane("tok");
    let animals = app.category_id("Animals").to_string();
    let funny = app.category_id("Funny").to_string();

    let body = story_form(
        &[
            ("csrf_token", "tok"),
            ("title", "The Lost Kitten"),
            ("description", "A kitten finds its way home"),
            ("story_text", "Once upon a time..."),
            ("categories", animals.as_str()),
            ("categories", funny.as_str()),
            ("published", "on"),
        ],
        Some(("kitten.png", b"\x89PNG fake")),
    );
    let response = app
        .router()
        .oneshot(form_post("/stories/create", &cookie, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/dashboard");

    let story = app
        .state
        .db
        .get_stories_by_user_id(user_id)
        .unwrap()
        .into_iter()
        .find(|s| s.title == "The Lost Kitten")
        .unwrap();
    assert!(story.published);
    let mut labels: Vec<&str> = story.categories.iter().map(|c| c.label.as_str()).collect();
    labels.sort();
    assert_eq!(labels, vec!["Animals", "Funny"]);
    let image = story.image.unwrap();
    assert!(image.filename.ends_with(".png"));
    assert!(app.state.uploads.exists(&image.filename).await);
}

#[tokio::test]
async fn create_story_form_ignores_empty_file_input() {
    let app = TestApp::new().await;
    let (user_id, cookie) = app.login_as_jane("tok");

    let body = story_form(
        &[
            ("csrf_token", "tok"),
            ("title", "No Picture"),
            ("description", "Words only"),
            ("story_text", "Just text."),
        ],
        Some(("", b"")),
    );
    let response = app
        .router()
        .oneshot(form_post("/stories/create", &cookie, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let story = app
        .state
        .db
        .get_stories_by_user_id(user_id)
        .unwrap()
        .into_iter()
        .find(|s| s.title == "No Picture")
        .unwrap();
    assert!(story.image.is_none());
    assert!(!story.published);
    assert!(story.categories.is_empty());
}

#[tokio::test]
async fn edit_story_form_checks_token_owner_and_removes_image() {
    let app = TestApp::new().await;
    let (user_id, cookie) = app.login_as_jane("tok");

    let create = story_form(
        &[
            ("csrf_token", "tok"),
            ("title", "Picture Book"),
            ("description", "With a picture"),
            ("story_text", "Look at this."),
            ("published", "1"),
        ],
        Some(("page.jpg", b"jpeg bytes")),
    );
    let response = app
        .router()
        .oneshot(form_post("/stories/create", &cookie, create))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let story = app
        .state
        .db
        .get_stories_by_user_id(user_id)
        .unwrap()
        .into_iter()
        .find(|s| s.title == "Picture Book")
        .unwrap();
    let filename = story.image.as_ref().unwrap().filename.clone();
    let edit_uri = format!("/stories/{}/edit", story.id);

    let edit = |token: &str| {
        story_form(
            &[
                ("csrf_token", token),
                ("title", "Picture Book"),
                ("description", "Now without a picture"),
                ("story_text", "Look at this."),
                ("published", "1"),
                ("remove_image", "1"),
            ],
            None,
        )
    };

    let response = app
        .router()
        .oneshot(form_post(&edit_uri, &cookie, edit("forged")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.state.uploads.exists(&filename).await);

    let someone_elses = app
        .state
        .db
        .get_published_stories(None)
        .unwrap()
        .into_iter()
        .find(|s| s.user_id != user_id)
        .unwrap()
        .id;
    let response = app
        .router()
        .oneshot(form_post(
            &format!("/stories/{}/edit", someone_elses),
            &cookie,
            edit("tok"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .router()
        .oneshot(form_post(&edit_uri, &cookie, edit("tok")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let story = app.state.db.get_story_by_id(story.id).unwrap().unwrap();
    assert_eq!(story.description, "Now without a picture");
    assert!(story.image.is_none());
    assert!(!app.state.uploads.exists(&filename).await);
}
