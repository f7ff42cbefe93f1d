//! End-to-end session and task flows against a mock backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fieldsync::credentials::{KeyValueBackend, MemoryBackend, TOKEN_KEY};
use fieldsync::types::{Session, UserProfile};
use fieldsync::{ClientConfig, CredentialStore, ErrorKind, SessionManager, SessionState};
use chrono::NaiveDate;
use fieldsync_tasks::{
    FetchOutcome, MediaUpload, Priority, TaskDraft, TaskPatch, TaskStatus, TaskStore,
};
use mockito::{Matcher, Server};
use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;

/// Memory backend that counts how often the token entry is removed.
#[derive(Default)]
struct CountingBackend {
    inner: MemoryBackend,
    token_removals: AtomicUsize,
}

#[async_trait]
impl KeyValueBackend for CountingBackend {
    async fn get(&self, key: &str) -> fieldsync::Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> fieldsync::Result<()> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> fieldsync::Result<()> {
        if key == TOKEN_KEY {
            self.token_removals.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.remove(key).await
    }
}

struct Harness {
    server: mockito::ServerGuard,
    backend: Arc<CountingBackend>,
    credentials: CredentialStore,
    sessions: SessionManager,
    tasks: Arc<TaskStore>,
}

async fn harness() -> Harness {
    let server = Server::new_async().await;
    let config = ClientConfig::new(
        Url::parse(&format!("{}/api", server.url())).unwrap(),
        Url::parse(&server.url()).unwrap(),
    );
    let backend = Arc::new(CountingBackend::default());
    let credentials = CredentialStore::new(backend.clone());
    let sessions = SessionManager::with_store(&config, credentials.clone()).unwrap();
    let tasks = TaskStore::attach(&sessions);
    Harness {
        server,
        backend,
        credentials,
        sessions,
        tasks,
    }
}

fn jane() -> UserProfile {
    UserProfile {
        id: "u1".into(),
        full_name: "Jane".into(),
        email: String::new(),
        image_url: None,
    }
}

fn task_json(id: &str) -> serde_json::Value {
    json!({
        "_id": id,
        "assignees": [{"_id": "u1", "name": "Jane"}],
        "description": "Crack in slab",
        "priority": "High",
        "status": "Pending",
        "tags": ["slab"],
    })
}

#[tokio::test]
async fn login_persists_session_and_signs_requests() {
    let mut h = harness().await;
    h.sessions.restore().await.unwrap();

    let login = h
        .server
        .mock("POST", "/api/auth/login")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::Json(json!({"email": "user@x.com", "password": "secret123"})))
        .with_status(200)
        .with_body(json!({"token": "abc", "user": {"id": "u1", "fullName": "Jane"}}).to_string())
        .create_async()
        .await;
    let tasks = h
        .server
        .mock("GET", "/api/New/GetTask/u1")
        .match_header("authorization", "Bearer abc")
        .with_status(200)
        .with_body(json!({"data": [task_json("t1")]}).to_string())
        .create_async()
        .await;

    let user = h.sessions.login("user@x.com", "secret123").await.unwrap();
    assert_eq!(user.full_name, "Jane");
    assert!(h.sessions.state().is_authenticated());
    assert_eq!(
        h.credentials.load().await.unwrap(),
        Some(Session::new("abc", jane()))
    );

    assert_eq!(h.tasks.fetch_all("u1").await.unwrap(), FetchOutcome::Applied(1));
    login.assert_async().await;
    tasks.assert_async().await;
}

#[tokio::test]
async fn failed_login_keeps_previous_state() {
    let mut h = harness().await;
    h.sessions.restore().await.unwrap();

    let login = h
        .server
        .mock("POST", "/api/auth/login")
        .with_status(401)
        .with_body(json!({"message": "Invalid credentials"}).to_string())
        .create_async()
        .await;

    let err = h.sessions.login("user@x.com", "wrongpass").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(err.user_message(), "Invalid credentials");
    assert_eq!(h.sessions.state(), SessionState::Anonymous);
    assert_eq!(h.credentials.load().await.unwrap(), None);
    // A rejected login is not a forced logout.
    assert_eq!(h.backend.token_removals.load(Ordering::SeqCst), 0);
    login.assert_async().await;
}

#[tokio::test]
async fn unauthorized_response_forces_logout_exactly_once() {
    let mut h = harness().await;
    h.credentials.save(&Session::new("abc", jane())).await.unwrap();
    h.sessions.restore().await.unwrap();

    let assigned = h
        .server
        .mock("GET", "/api/New/GetTask")
        .with_status(200)
        .with_body(json!({"data": [task_json("t1"), task_json("t2")]}).to_string())
        .create_async()
        .await;
    let rejected = h
        .server
        .mock("GET", "/api/New/GetTask/u1")
        .with_status(401)
        .with_body(json!({"error": "jwt expired"}).to_string())
        .expect_at_least(1)
        .create_async()
        .await;

    h.tasks.fetch_assigned_to_current_user().await.unwrap();
    assert_eq!(h.tasks.len(), 2);

    let (first, second) = tokio::join!(h.tasks.fetch_all("u1"), h.tasks.fetch_all("u1"));
    for result in [first, second] {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Authentication);
    }

    assert_eq!(h.sessions.state(), SessionState::Anonymous);
    assert_eq!(h.credentials.load().await.unwrap(), None);
    assert!(h.tasks.is_empty());
    assert_eq!(h.backend.token_removals.load(Ordering::SeqCst), 1);

    assigned.assert_async().await;
    rejected.assert_async().await;
}

#[tokio::test]
async fn logout_clears_credentials_and_tasks() {
    let mut h = harness().await;
    h.credentials.save(&Session::new("abc", jane())).await.unwrap();
    h.sessions.restore().await.unwrap();

    let _assigned = h
        .server
        .mock("GET", "/api/New/GetTask")
        .with_status(200)
        .with_body(json!({"data": [task_json("t1")]}).to_string())
        .create_async()
        .await;
    h.tasks.fetch_assigned_to_current_user().await.unwrap();
    assert!(!h.tasks.is_empty());

    h.sessions.logout().await.unwrap();
    assert_eq!(h.credentials.load().await.unwrap(), None);
    assert!(h.tasks.is_empty());

    // Already anonymous: no-op.
    h.sessions.logout().await.unwrap();
    assert_eq!(h.backend.token_removals.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn requests_after_logout_are_unsigned() {
    let mut h = harness().await;
    h.credentials.save(&Session::new("abc", jane())).await.unwrap();
    h.sessions.restore().await.unwrap();
    h.sessions.logout().await.unwrap();

    let unsigned = h
        .server
        .mock("GET", "/api/New/GetTask/u1")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body(json!({"data": []}).to_string())
        .create_async()
        .await;

    h.tasks.fetch_all("u1").await.unwrap();
    unsigned.assert_async().await;
}

// ─── Task endpoints on the wire ─────────────────────────────────────────────

async fn signed_in() -> Harness {
    let h = harness().await;
    h.credentials.save(&Session::new("abc", jane())).await.unwrap();
    h.sessions.restore().await.unwrap();
    h
}

/// A record as the backend stores it, with fields `Task` does not model.
fn stored_task() -> serde_json::Value {
    json!({
        "_id": "t1",
        "userId": "u1",
        "username": "Jane",
        "assignees": [{"_id": "u1", "name": "Jane"}],
        "description": "Crack in slab",
        "priority": "High",
        "status": "Pending",
        "room": "B-12",
        "floor": "3",
        "tags": ["slab"],
        "emailAlerts": ["ops@x.com"],
        "watchers": [{"_id": "u2"}],
    })
}

async fn load_stored_task(h: &mut Harness) {
    let _owned = h
        .server
        .mock("GET", "/api/New/GetTask/u1")
        .with_status(200)
        .with_body(json!({"data": [stored_task()]}).to_string())
        .create_async()
        .await;
    h.tasks.fetch_all("u1").await.unwrap();
}

#[tokio::test]
async fn create_posts_the_draft_with_both_creator_keys() {
    let mut h = signed_in().await;
    let create = h
        .server
        .mock("POST", "/api/New/CreateTask")
        .match_header("authorization", "Bearer abc")
        .match_body(Matcher::PartialJson(json!({
            "userId": "u1",
            "creatorId": "u1",
            "description": "Crack in slab",
            "priority": "High",
            "status": "Pending",
            "room": "B-12",
            "floor": "3",
            "tags": ["slab"],
            "dueDate": "2024-05-01",
            "groundFloorImages": [{"name": "g.jpg", "base64": "data:image/jpeg;base64,Zw=="}],
            "lastFloorImages": [{"name": "l.jpg", "base64": "data:image/jpeg;base64,bA=="}],
        })))
        .with_status(201)
        .with_body(json!({"success": true}).to_string())
        .create_async()
        .await;

    let draft = TaskDraft {
        description: "Crack in slab".into(),
        priority: Some(Priority::High),
        status: Some(TaskStatus::Pending),
        room: "B-12".into(),
        floor: "3".into(),
        tags: ["slab"].into_iter().collect(),
        due_date: NaiveDate::from_ymd_opt(2024, 5, 1),
        ground_floor_images: vec![MediaUpload::from_bytes("g.jpg", "image/jpeg", b"g")],
        last_floor_images: vec![MediaUpload::from_bytes("l.jpg", "image/jpeg", b"l")],
        ..Default::default()
    };
    h.tasks.create(draft).await.unwrap();

    create.assert_async().await;
    assert!(h.tasks.is_empty());
}

#[tokio::test]
async fn update_puts_the_full_record_back() {
    let mut h = signed_in().await;
    load_stored_task(&mut h).await;

    let update = h
        .server
        .mock("PUT", "/api/New/UpdateTask/t1")
        .match_header("authorization", "Bearer abc")
        .match_body(Matcher::PartialJson(json!({
            "_id": "t1",
            "userId": "u1",
            "creatorId": "u1",
            "username": "Jane",
            "description": "Crack in slab",
            "status": "Completed",
            "priority": "High",
            "tags": ["slab"],
            "emailAlerts": ["ops@x.com"],
            "watchers": [{"_id": "u2"}],
        })))
        .with_status(200)
        .with_body(json!({"success": true}).to_string())
        .create_async()
        .await;

    let patch = TaskPatch {
        status: Some(TaskStatus::Completed),
        ..TaskPatch::default()
    };
    let saved = h.tasks.update("t1", &patch).await.unwrap();
    update.assert_async().await;

    assert_eq!(saved.status, Some(TaskStatus::Completed));
    assert_eq!(h.tasks.get("t1"), Some(saved.clone()));
    assert_eq!(saved.extra["watchers"], json!([{"_id": "u2"}]));
}

#[tokio::test]
async fn error_in_a_success_reply_leaves_the_task_alone() {
    let mut h = signed_in().await;
    load_stored_task(&mut h).await;
    let before = h.tasks.get("t1").unwrap();

    let update = h
        .server
        .mock("PUT", "/api/New/UpdateTask/t1")
        .with_status(200)
        .with_body(json!({"error": "Room is required"}).to_string())
        .create_async()
        .await;

    let patch = TaskPatch {
        room: Some(String::new()),
        ..TaskPatch::default()
    };
    let err = h.tasks.update("t1", &patch).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(err.user_message(), "Room is required");
    assert_eq!(h.tasks.get("t1"), Some(before));
    update.assert_async().await;
}

#[tokio::test]
async fn delete_removes_the_task_after_the_server_confirms() {
    let mut h = signed_in().await;
    load_stored_task(&mut h).await;

    let rejected = h
        .server
        .mock("DELETE", "/api/New/DeleteTask/t1")
        .match_header("authorization", "Bearer abc")
        .with_status(500)
        .with_body(json!({"error": "Database unavailable"}).to_string())
        .create_async()
        .await;
    let err = h.tasks.delete("t1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Server);
    assert!(h.tasks.contains("t1"));
    rejected.assert_async().await;
    rejected.remove_async().await;

    let confirmed = h
        .server
        .mock("DELETE", "/api/New/DeleteTask/t1")
        .match_header("authorization", "Bearer abc")
        .with_status(200)
        .create_async()
        .await;
    h.tasks.delete("t1").await.unwrap();
    assert!(!h.tasks.contains("t1"));
    confirmed.assert_async().await;
}
