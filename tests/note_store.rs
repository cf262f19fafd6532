use std::sync::Arc;

use assert_matches::assert_matches;
use purple_notes::api::{ApiClient, ApiError, HttpNoteStore, NoteStore, UpdateNote};
use purple_notes::editing::{EditSession, LoadError, SaveOutcome, SaveStatus};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "tok-123";

fn note_json(title: &str) -> serde_json::Value {
    json!({
        "_id": "n1",
        "title": title,
        "body": "<p>x</p>",
        "privacy": true,
        "createdAt": "2024-03-01T10:00:00Z",
        "updatedAt": "2024-03-01T10:00:00Z"
    })
}

fn store(server: &MockServer) -> HttpNoteStore {
    HttpNoteStore::new(ApiClient::from_base_url(&server.uri()).with_token(Some(TOKEN)))
}

#[tokio::test]
async fn owner_read_sends_misspelled_scheme() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/note/my/n1"))
        .and(header("authorization", "Baerer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(note_json("A")))
        .expect(1)
        .mount(&server)
        .await;

    let note = store(&server).get_my_note("n1").await.unwrap();
    assert_eq!(note.id, "n1");
    assert_eq!(note.title, "A");
    assert!(!note.was_edited());
}

#[tokio::test]
async fn read_without_token_uses_public_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/note/n1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(note_json("Open")))
        .expect(1)
        .mount(&server)
        .await;

    let anonymous = HttpNoteStore::new(ApiClient::from_base_url(&server.uri()));
    let note = anonymous.read_note("n1").await.unwrap();
    assert_eq!(note.title, "Open");
}

#[tokio::test]
async fn owner_endpoints_need_a_token() {
    let server = MockServer::start().await;
    let anonymous = HttpNoteStore::new(ApiClient::from_base_url(&server.uri()));
    assert_matches!(anonymous.list_my_notes().await, Err(ApiError::MissingToken));
}

#[tokio::test]
async fn error_statuses_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/note/my/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/note/my/foreign"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/note/my/all"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "message": "database down" })),
        )
        .mount(&server)
        .await;

    let store = store(&server);
    assert_matches!(store.get_my_note("missing").await, Err(ApiError::NotFound));
    assert_matches!(store.get_my_note("foreign").await, Err(ApiError::Forbidden));
    assert_matches!(
        store.list_my_notes().await,
        Err(ApiError::Status { status: 500, message }) if message == "database down"
    );
}

#[tokio::test]
async fn create_posts_placeholder_and_expects_created() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/note/"))
        .and(body_json(json!({
            "title": "New note",
            "body": "<p>New note</p>",
            "privacy": true
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "_id": "n2",
            "title": "New note",
            "body": "<p>New note</p>",
            "privacy": true,
            "createdAt": "2024-03-01T10:00:00Z",
            "updatedAt": "2024-03-01T10:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let note = store(&server).create_note().await.unwrap();
    assert_eq!(note.id, "n2");
    assert_eq!(note.contents(), UpdateNote::placeholder());
}

#[tokio::test]
async fn delete_sends_password_and_expects_created() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/note/n1"))
        .and(body_json(json!({ "password": "hunter22" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    store(&server).delete_note("n1", "hunter22").await.unwrap();
}

#[tokio::test]
async fn edit_session_saves_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/note/my/n1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(note_json("A")))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/note/n1"))
        .and(body_json(json!({ "title": "B", "body": "<p>x</p>", "privacy": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(note_json("B")))
        .expect(1)
        .mount(&server)
        .await;

    let store: Arc<dyn NoteStore> = Arc::new(store(&server));
    let mut session = EditSession::load(store, "n1").await.unwrap();
    session.set_title("B");
    assert!(session.is_dirty());

    assert_eq!(session.save().await, SaveOutcome::Saved);
    assert_eq!(session.status(), SaveStatus::Saved);
    assert_eq!(session.confirmed().title, "B");
    assert!(!session.is_dirty());
}

#[tokio::test]
async fn rejected_save_keeps_draft_dirty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/note/my/n1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(note_json("A")))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/note/n1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store: Arc<dyn NoteStore> = Arc::new(store(&server));
    let mut session = EditSession::load(store, "n1").await.unwrap();
    session.set_body("<p>y</p>");

    assert_eq!(session.save().await, SaveOutcome::Failed);
    assert_eq!(session.status(), SaveStatus::Error);
    assert_eq!(session.status().message(), "Can't save, something wrong");
    assert_eq!(session.confirmed().body, "<p>x</p>");
    assert!(session.is_dirty());
}

#[tokio::test]
async fn missing_note_load_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/note/my/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store: Arc<dyn NoteStore> = Arc::new(store(&server));
    assert_matches!(
        EditSession::load(store, "gone").await,
        Err(LoadError::NotFound)
    );
}

#[tokio::test]
async fn server_error_on_load_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/note/my/n1"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let store: Arc<dyn NoteStore> = Arc::new(store(&server));
    assert_matches!(
        EditSession::load(store, "n1").await,
        Err(LoadError::Unavailable(ApiError::Status { status: 502, .. }))
    );
}

#[tokio::test]
async fn forbidden_load_is_permission_denied() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/note/my/n1"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let store: Arc<dyn NoteStore> = Arc::new(store(&server));
    assert_matches!(
        EditSession::load(store, "n1").await,
        Err(LoadError::PermissionDenied)
    );
}
