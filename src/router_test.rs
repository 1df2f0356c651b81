use super::*;
use crate::auth::create_session;
use crate::config::AppConfig;
use crate::models::{Document, Session};
use crate::store::Collection;
use axum::body::Body;
use axum::http::{
    header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
    Request as HttpRequest, StatusCode,
};
use chrono::{Duration, Utc};
use tower::ServiceExt;

const PAGE: &str = "<html><head><title>%title%</title></head><body>%nav%<aside>%form%</aside><main>%content%</main>%script%</body></html>";

struct Fixture {
    _dir: tempfile::TempDir,
    state: Arc<AppState>,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let templates = dir.path().join("templates");
    std::fs::create_dir_all(&templates).unwrap();
    for name in ["default.maru", "main.maru", "index.maru"] {
        std::fs::write(templates.join(name), PAGE).unwrap();
    }
    let js = dir.path().join("public/js");
    std::fs::create_dir_all(&js).unwrap();
    std::fs::write(js.join("app.js"), "console.log('hi');").unwrap();

    let state = Arc::new(AppState::new(AppConfig::rooted_at(dir.path(), "test-pepper")));
    Fixture { _dir: dir, state }
}

impl Fixture {
    async fn send(&self, request: HttpRequest<Body>) -> Response {
        app(self.state.clone()).oneshot(request).await.unwrap()
    }

    /// Cookie header for a fresh session belonging to `account`.
    async fn login_as(&self, account: &str) -> String {
        let session = create_session(&self.state.store, account, Duration::days(1))
            .await
            .unwrap();
        format!("session={}; account={}", session.id, account)
    }

    async fn notes_of(&self, account: &str) -> Vec<Document> {
        self.state
            .store
            .find(Collection::Notes, |d: &Document| d.is_owned_by(account))
            .await
            .unwrap()
    }

    async fn seed(&self, collection: Collection, owner: &str, title: &str, body: &str) -> Document {
        let doc = Document::new(
            owner,
            crate::Sanitized::new(title),
            crate::Sanitized::new(body),
            Utc::now(),
        );
        self.state.store.insert(collection, &doc.id, &doc).await.unwrap();
        doc
    }
}

fn get(uri: &str, cookie: Option<&str>) -> HttpRequest<Body> {
    let mut builder = HttpRequest::builder().method("GET").uri(uri);
    if let Some(c) = cookie {
        builder = builder.header(COOKIE, c);
    }
    builder.body(Body::empty()).unwrap()
}

fn form(method: &str, uri: &str, cookie: Option<&str>, body: &str) -> HttpRequest<Body> {
    let mut builder = HttpRequest::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(c) = cookie {
        builder = builder.header(COOKIE, c);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn json(method: &str, uri: &str, cookie: &str, body: &str) -> HttpRequest<Body> {
    HttpRequest::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .header(COOKIE, cookie)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response) -> &str {
    response.headers()[LOCATION].to_str().unwrap()
}

// ============================================================================
// Notes
// ============================================================================

#[tokio::test]
async fn test_create_note_from_form() {
    let fx = fixture();
    let cookie = fx.login_as("acct-1").await;

    let response = fx
        .send(form("POST", "/notes", Some(&cookie), "title=Hello&content=World"))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(text(response).await, "Note created successfully");

    let notes = fx.notes_of("acct-1").await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title.as_html(), "Hello");
    assert_eq!(notes[0].body.as_html(), "World");
    assert!(!notes[0].id.is_empty());
    assert_eq!(notes[0].owner_account_id, "acct-1");
}

#[tokio::test]
async fn test_created_text_is_stored_sanitized() {
    let fx = fixture();
    let cookie = fx.login_as("acct-1").await;

    let response = fx
        .send(form(
            "POST",
            "/notes",
            Some(&cookie),
            "title=%3Cb%3Ebold%3C%2Fb%3E&content=Tom+%26+Jerry",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let notes = fx.notes_of("acct-1").await;
    assert_eq!(notes[0].title.as_html(), "&lt;b&gt;bold&lt;/b&gt;");
    assert_eq!(notes[0].body.as_html(), "Tom &amp; Jerry");
}

#[tokio::test]
async fn test_create_with_missing_fields_redirects() {
    let fx = fixture();
    let cookie = fx.login_as("acct-1").await;

    let response = fx
        .send(form("POST", "/notes", Some(&cookie), "title=Hello&content=+++"))
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/notes?error=missing-fields");
    assert!(fx.notes_of("acct-1").await.is_empty());
}

#[tokio::test]
async fn test_create_without_session_is_unauthorized() {
    let fx = fixture();
    let response = fx
        .send(form("POST", "/notes", None, "title=Hello&content=World"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(text(response).await.starts_with("401 Unauthorized"));
}

#[tokio::test]
async fn test_list_shows_only_own_notes() {
    let fx = fixture();
    let cookie = fx.login_as("acct-1").await;
    fx.seed(Collection::Notes, "acct-1", "Mine", "body").await;
    fx.seed(Collection::Notes, "acct-2", "Theirs", "body").await;

    let response = fx.send(get("/notes?error=missing-fields", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = text(response).await;
    assert!(html.contains("<title>Drealism: Notes</title>"));
    assert!(html.contains("Mine"));
    assert!(!html.contains("Theirs"));
    assert!(html.contains("Required fields are missing."));
    assert!(html.contains(r#"<form id="POST" class="box" action="/notes" method="post">"#));
}

#[tokio::test]
async fn test_show_unknown_note_renders_not_found() {
    let fx = fixture();
    let cookie = fx.login_as("acct-1").await;
    let theirs = fx.seed(Collection::Notes, "acct-2", "Theirs", "body").await;

    for uri in ["/notes/does-not-exist".to_string(), format!("/notes/{}", theirs.id)] {
        let response = fx.send(get(&uri, Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = text(response).await;
        assert!(html.contains("<main><p>Note not found</p></main>"), "{}", uri);
    }
}

#[tokio::test]
async fn test_show_note_prefills_forms() {
    let fx = fixture();
    let cookie = fx.login_as("acct-1").await;
    let note = fx.seed(Collection::Notes, "acct-1", "A & B", "Body text").await;

    let response = fx.send(get(&format!("/notes/{}", note.id), Some(&cookie))).await;
    let html = text(response).await;
    assert!(html.contains(r#"value="A &amp; B""#));
    assert!(html.contains(">Body text</textarea>"));
    assert!(html.contains(r#"<form id="DELETE""#));
    assert!(html.contains("/static/js/put-or-delete.js"));
}

#[tokio::test]
async fn test_update_note_with_form_and_json() {
    let fx = fixture();
    let cookie = fx.login_as("acct-1").await;
    let note = fx.seed(Collection::Notes, "acct-1", "Old", "old body").await;
    let uri = format!("/notes/{}", note.id);

    let response = fx
        .send(form("PUT", &uri, Some(&cookie), "title=Form&content=via+form"))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), uri);
    assert_eq!(fx.notes_of("acct-1").await[0].title.as_html(), "Form");

    let response = fx
        .send(json("PUT", &uri, &cookie, r#"{"title":"Json <1>","content":"via json"}"#))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let notes = fx.notes_of("acct-1").await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title.as_html(), "Json &lt;1&gt;");
    assert_eq!(notes[0].body.as_html(), "via json");
    assert_eq!(notes[0].created_date, note.created_date);
}

#[tokio::test]
async fn test_update_rejects_missing_fields_and_foreign_notes() {
    let fx = fixture();
    let cookie = fx.login_as("acct-1").await;
    let mine = fx.seed(Collection::Notes, "acct-1", "Mine", "x").await;
    let theirs = fx.seed(Collection::Notes, "acct-2", "Theirs", "x").await;

    let response = fx
        .send(json("PUT", &format!("/notes/{}", mine.id), &cookie, r#"{"title":"only"}"#))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = fx
        .send(json("PUT", &format!("/notes/{}", theirs.id), &cookie, r#"{"title":"t","content":"c"}"#))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(fx.notes_of("acct-2").await[0].title.as_html(), "Theirs");

    let response = fx
        .send(json("PUT", "/notes/missing", &cookie, r#"{"title":"t","content":"c"}"#))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_note_redirects_to_list() {
    let fx = fixture();
    let cookie = fx.login_as("acct-1").await;
    let note = fx.seed(Collection::Notes, "acct-1", "Bye", "x").await;

    let request = HttpRequest::builder()
        .method("DELETE")
        .uri(format!("/notes/{}", note.id))
        .header(COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let response = fx.send(request).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/notes");
    assert!(fx.notes_of("acct-1").await.is_empty());
}

/// The method a browser's `fetch` uses when it follows `status`: 303 turns
/// into GET, 301/302 keep the method except for POST.
fn followed_method(status: StatusCode, method: &str) -> &str {
    match status {
        StatusCode::SEE_OTHER => "GET",
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND if method == "POST" => "GET",
        _ => method,
    }
}

#[tokio::test]
async fn test_update_redirect_is_followed_with_get() {
    let fx = fixture();
    let cookie = fx.login_as("acct-1").await;
    let note = fx.seed(Collection::Notes, "acct-1", "Old", "old body").await;
    let uri = format!("/notes/{}", note.id);

    let response = fx
        .send(json("PUT", &uri, &cookie, r#"{"title":"New","content":"new body"}"#))
        .await;
    let method = followed_method(response.status(), "PUT");
    assert_eq!(method, "GET");

    let target = location(&response).to_string();
    let request = HttpRequest::builder()
        .method(method)
        .uri(&target)
        .header(COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let response = fx.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(text(response).await.contains(r#"value="New""#));
}

#[tokio::test]
async fn test_delete_redirect_must_not_be_replayed() {
    let fx = fixture();
    let cookie = fx.login_as("acct-1").await;
    let note = fx.seed(Collection::Notes, "acct-1", "Bye", "x").await;

    let request = HttpRequest::builder()
        .method("DELETE")
        .uri(format!("/notes/{}", note.id))
        .header(COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let response = fx.send(request).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let target = location(&response).to_string();

    // Followed automatically, the 302 would replay DELETE on the list URL.
    assert_eq!(followed_method(response.status(), "DELETE"), "DELETE");
    let replay = HttpRequest::builder()
        .method("DELETE")
        .uri(&target)
        .header(COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    assert_eq!(fx.send(replay).await.status(), StatusCode::NOT_FOUND);

    // The page script navigates there with GET instead.
    let response = fx.send(get(&target, Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!text(response).await.contains("Bye"));

    let script = std::fs::read_to_string(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("public/js/put-or-delete.js"),
    )
    .unwrap();
    assert!(script.contains("redirect: 'manual'"));
}

#[tokio::test]
async fn test_delete_foreign_note_is_forbidden() {
    let fx = fixture();
    let cookie = fx.login_as("acct-1").await;
    let theirs = fx.seed(Collection::Notes, "acct-2", "Theirs", "x").await;

    let request = HttpRequest::builder()
        .method("DELETE")
        .uri(format!("/notes/{}", theirs.id))
        .header(COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let response = fx.send(request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(fx.notes_of("acct-2").await.len(), 1);
}

#[tokio::test]
async fn test_note_category_must_belong_to_account() {
    let fx = fixture();
    let cookie = fx.login_as("acct-1").await;
    let mine = fx.seed(Collection::Categories, "acct-1", "Work", "").await;
    let theirs = fx.seed(Collection::Categories, "acct-2", "Home", "").await;

    let body = format!("title=T&content=C&category={}", mine.id);
    let response = fx.send(form("POST", "/notes", Some(&cookie), &body)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(fx.notes_of("acct-1").await[0].category_id.as_deref(), Some(mine.id.as_str()));

    let body = format!("title=T&content=C&category={}", theirs.id);
    let response = fx.send(form("POST", "/notes", Some(&cookie), &body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_categories_need_only_a_title() {
    let fx = fixture();
    let cookie = fx.login_as("acct-1").await;

    let response = fx.send(form("POST", "/categories", Some(&cookie), "title=Work")).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(text(response).await, "Category created successfully");

    let response = fx.send(get("/categories", Some(&cookie))).await;
    assert!(text(response).await.contains("Work"));
}

// ============================================================================
// Auth Gate
// ============================================================================

#[tokio::test]
async fn test_expired_session_is_forbidden_and_cleared() {
    let fx = fixture();
    let session = Session {
        id: "stale".into(),
        account_id: "acct-1".into(),
        expires_at: Utc::now() - Duration::hours(1),
    };
    fx.state
        .store
        .insert(Collection::Sessions, &session.id, &session)
        .await
        .unwrap();

    let response = fx.send(get("/notes", Some("session=stale; account=acct-1"))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let cleared: Vec<&str> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(cleared.len(), 2);
    assert!(cleared.iter().all(|c| c.contains("Max-Age=0")));

    let row: Option<Session> = fx.state.store.get(Collection::Sessions, "stale").await.unwrap();
    assert!(row.is_none());
}

#[tokio::test]
async fn test_account_cookie_is_not_trusted() {
    let fx = fixture();
    fx.seed(Collection::Notes, "acct-2", "Secret", "x").await;
    let session = create_session(&fx.state.store, "acct-1", Duration::days(1))
        .await
        .unwrap();

    let cookie = format!("session={}; account=acct-2", session.id);
    let html = text(fx.send(get("/notes", Some(&cookie))).await).await;
    assert!(!html.contains("Secret"));
}

// ============================================================================
// Accounts
// ============================================================================

#[tokio::test]
async fn test_register_login_account_logout() {
    let fx = fixture();

    let response = fx
        .send(form("POST", "/register", None, "name=Ann+Lee&username=ann&password=pw"))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let response = fx
        .send(form("POST", "/register", None, "name=Other&username=ann&password=x"))
        .await;
    assert_eq!(location(&response), "/register?error=username-taken");

    let response = fx
        .send(form("POST", "/login", None, "username=ann&password=wrong"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(text(response).await.contains("Invalid username or password."));

    let response = fx
        .send(form("POST", "/login", None, "username=ann&password=pw"))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/user");
    let session_cookie = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .find(|c| c.starts_with("session="))
        .unwrap();
    let cookie = session_cookie.split(';').next().unwrap().to_string();

    let response = fx.send(get("/user", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(text(response).await.contains("Welcome Ann Lee"));

    let response = fx.send(get("/logout", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let response = fx.send(get("/user", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_requires_all_fields() {
    let fx = fixture();
    let response = fx
        .send(form("POST", "/register", None, "name=Ann&username=ann"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_page_with_live_session_logs_out() {
    let fx = fixture();
    let cookie = fx.login_as("acct-1").await;

    let response = fx.send(get("/login", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let response = fx.send(get("/login", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(text(response).await.contains(r#"type="password""#));
}

#[tokio::test]
async fn test_account_page_for_missing_account_is_not_found() {
    let fx = fixture();
    let cookie = fx.login_as("ghost").await;
    let response = fx.send(get("/user", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn test_search_groups_matches_by_collection() {
    let fx = fixture();
    let cookie = fx.login_as("acct-1").await;
    fx.seed(Collection::Notes, "acct-1", "Shopping list", "milk").await;
    fx.seed(Collection::Tasks, "acct-1", "Go shopping", "today").await;
    fx.seed(Collection::Categories, "acct-1", "Work", "").await;
    fx.seed(Collection::Notes, "acct-2", "Shopping elsewhere", "").await;

    let response = fx.send(get("/search?query=SHOP", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = text(response).await;
    assert!(html.contains("<p>2 results</p>"));
    assert!(html.contains("<h2>Notes</h2>"));
    assert!(html.contains("<h2>Tasks</h2>"));
    assert!(!html.contains("<h2>Categories</h2>"));
    assert!(!html.contains("elsewhere"));

    let html = text(fx.send(get("/search", Some(&cookie))).await).await;
    assert!(html.contains("Enter a search term."));
}

#[tokio::test]
async fn test_search_matches_what_was_written_not_its_escaping() {
    let fx = fixture();
    let cookie = fx.login_as("acct-1").await;
    fx.seed(Collection::Notes, "acct-1", "Tom & Jerry", "it's fine").await;

    for query in ["amp", "39", "%3B"] {
        let html = text(fx.send(get(&format!("/search?query={}", query), Some(&cookie))).await).await;
        assert!(html.contains("<p>No results for"), "{}", query);
    }

    let html = text(fx.send(get("/search?query=tom+%26+jerry", Some(&cookie))).await).await;
    assert!(html.contains("<p>1 results</p>"));
}

// ============================================================================
// Static Files & Fallthrough
// ============================================================================

#[tokio::test]
async fn test_static_files() {
    let fx = fixture();

    let response = fx.send(get("/static/js/app.js", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/javascript");

    let response = fx.send(get("/static/app.exe", None)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(text(response).await, "Internal Server Error");

    let response = fx.send(get("/static/js/missing.js", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = fx.send(get("/static/%2e%2e/templates/main.js", None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unmatched_routes_are_not_found() {
    let fx = fixture();
    for (method, uri) in [
        ("GET", "/nope"),
        ("POST", "/"),
        ("PATCH", "/notes"),
        ("HEAD", "/notes"),
        ("GET", "/notes/a/b"),
        ("DELETE", "/tasks"),
    ] {
        let request = HttpRequest::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = fx.send(request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{} {}", method, uri);
    }
}

#[tokio::test]
async fn test_home_page() {
    let fx = fixture();
    let response = fx.send(get("/", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = text(response).await;
    assert!(html.contains("<title>Drealism: Home page</title>"));
    assert!(html.contains(r#"<a href="/notes">Notes</a>"#));
}

#[tokio::test]
async fn test_missing_template_is_internal_error() {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(AppState::new(AppConfig::rooted_at(dir.path(), "p")));
    let response = app(state).oneshot(get("/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(text(response).await, "Internal Server Error");
}
