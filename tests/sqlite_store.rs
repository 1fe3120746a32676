//! Repository behaviour against a real SQLite file.

use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use chat_with_it::config::Config;
use chat_with_it::models::{ProcessingState, ProcessingStatus, TranscriptItem};
use chat_with_it::services::Repositories;
use chat_with_it::store::{
    IndexRegistry, SessionStore, SessionTouch, SqliteStore, StatusStore, TranscriptStore,
};
use chat_with_it::{db, migrate};

async fn open_store(tmp: &TempDir) -> SqliteStore {
    let config = Config::with_db_path(tmp.path().join("data").join("cwi.sqlite"));
    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    SqliteStore::new(pool)
}

fn status(user: &str, file: &str, state: ProcessingState, pct: u8) -> ProcessingStatus {
    let now = Utc::now();
    ProcessingStatus {
        user_id: user.to_string(),
        file_name: file.to_string(),
        status: state,
        progress_percentage: pct,
        started_at: now,
        updated_at: now,
        error: None,
    }
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    migrate::apply(store.pool()).await.unwrap();

    let config = Config::with_db_path(tmp.path().join("data").join("cwi.sqlite"));
    migrate::run_migrations(&config).await.unwrap();
}

#[tokio::test]
async fn test_registry_first_upsert_creates_single_entry() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    assert!(store.get("u1").await.unwrap().is_none());
    let record = store.upsert("u1", "vs-1").await.unwrap();
    assert_eq!(record.vector_store_ids, vec!["vs-1".to_string()]);
    assert_eq!(store.get("u1").await.unwrap().unwrap(), record);
}

#[tokio::test]
async fn test_registry_upsert_is_idempotent_and_ordered() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store.upsert("u1", "vs-1").await.unwrap();
    store.upsert("u1", "vs-2").await.unwrap();
    let record = store.upsert("u1", "vs-1").await.unwrap();

    assert_eq!(
        record.vector_store_ids,
        vec!["vs-1".to_string(), "vs-2".to_string()]
    );
    assert_eq!(record.first(), Some("vs-1"));
    assert!(store.get("u2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_upserts_never_duplicate() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(open_store(&tmp).await);

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.upsert("u1", &format!("vs-{}", i % 2)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let mut ids = store.get("u1").await.unwrap().unwrap().vector_store_ids;
    ids.sort();
    assert_eq!(ids, vec!["vs-0".to_string(), "vs-1".to_string()]);
}

#[tokio::test]
async fn test_status_put_overwrites_and_lists_per_user() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store
        .put_status(&status("u1", "a.pdf", ProcessingState::Uploading, 0))
        .await
        .unwrap();
    let mut failed = status("u1", "a.pdf", ProcessingState::Failed, 60);
    failed.error = Some("Attach failed: boom".to_string());
    store.put_status(&failed).await.unwrap();
    store
        .put_status(&status("u1", "b.txt", ProcessingState::Completed, 100))
        .await
        .unwrap();
    store
        .put_status(&status("u2", "c.md", ProcessingState::Processing, 40))
        .await
        .unwrap();

    let got = store.get_status("u1", "a.pdf").await.unwrap().unwrap();
    assert_eq!(got.status, ProcessingState::Failed);
    assert_eq!(got.progress_percentage, 60);
    assert_eq!(got.error.as_deref(), Some("Attach failed: boom"));

    let listed = store.list_statuses("u1").await.unwrap();
    let mut names: Vec<_> = listed.iter().map(|s| s.file_name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["a.pdf", "b.txt"]);
    assert!(store.get_status("u1", "c.md").await.unwrap().is_none());
}

#[tokio::test]
async fn test_session_touch_ownership_and_delete_cascade() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    assert_eq!(
        store.touch_session("s1", "u1").await.unwrap(),
        SessionTouch::Created
    );
    assert_eq!(
        store.touch_session("s1", "u1").await.unwrap(),
        SessionTouch::Touched
    );
    assert!(store.touch_session("s1", "u2").await.is_err());

    store
        .append_turn(
            "s1",
            &TranscriptItem::user("hi", None),
            &TranscriptItem::assistant("hello"),
        )
        .await
        .unwrap();

    assert!(store.delete_session("s1", "u2").await.is_err());
    assert!(store.get_session("s1").await.unwrap().is_some());

    assert!(store.delete_session("s1", "u1").await.unwrap());
    assert!(store.get_session("s1").await.unwrap().is_none());
    assert!(store.recent("s1", 10).await.unwrap().is_empty());
    assert!(!store.delete_session("s1", "u1").await.unwrap());
}

#[tokio::test]
async fn test_transcript_recent_and_reply_lookup() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store.touch_session("s1", "u1").await.unwrap();

    for (i, cmid) in [Some("m-1"), None, Some("m-3")].into_iter().enumerate() {
        store
            .append_turn(
                "s1",
                &TranscriptItem::user(format!("q{}", i), cmid.map(str::to_string)),
                &TranscriptItem::assistant(format!("a{}", i)),
            )
            .await
            .unwrap();
    }

    let recent = store.recent("s1", 3).await.unwrap();
    let contents: Vec<_> = recent.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec!["a1", "q2", "a2"]);
    assert_eq!(recent[1].client_message_id.as_deref(), Some("m-3"));

    assert_eq!(
        store.reply_for("s1", "m-1").await.unwrap().as_deref(),
        Some("a0")
    );
    assert_eq!(
        store.reply_for("s1", "m-3").await.unwrap().as_deref(),
        Some("a2")
    );
    assert!(store.reply_for("s1", "m-9").await.unwrap().is_none());
}

#[tokio::test]
async fn test_sessions_listed_only_for_owner() {
    let tmp = TempDir::new().unwrap();
    let config = Config::with_db_path(tmp.path().join("cwi.sqlite"));
    let repos = Repositories::sqlite(&config).await.unwrap();

    repos.sessions.touch_session("s1", "u1").await.unwrap();
    repos.sessions.touch_session("s2", "u1").await.unwrap();
    repos.sessions.touch_session("s3", "u2").await.unwrap();

    let mut ids: Vec<_> = repos
        .sessions
        .list_sessions("u1")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.session_id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["s1".to_string(), "s2".to_string()]);
}
