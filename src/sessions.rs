//! Session management callables: create, list, delete.
//!
//! Each returns the shared `{success, message, data}` envelope and never
//! fails outward.

use serde::Serialize;
use uuid::Uuid;

use crate::models::{ChatSession, Envelope};
use crate::store::SessionStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRef {
    pub session_id: String,
}

pub async fn create_session(store: &dyn SessionStore, user_id: &str) -> Envelope<SessionRef> {
    let session_id = Uuid::new_v4().to_string();
    match store.touch_session(&session_id, user_id).await {
        Ok(_) => {
            tracing::info!(user_id, session_id = %session_id, "Session created");
            Envelope::ok(
                "Session created successfully",
                SessionRef {
                    session_id: session_id.clone(),
                },
            )
            .with_session(session_id)
        }
        Err(e) => Envelope::failure(format!("Error creating session: {:#}", e)),
    }
}

pub async fn list_sessions(store: &dyn SessionStore, user_id: &str) -> Envelope<Vec<ChatSession>> {
    match store.list_sessions(user_id).await {
        Ok(sessions) => Envelope::ok(
            format!("Found {} sessions", sessions.len()),
            sessions,
        ),
        Err(e) => Envelope::failure(format!("Error listing sessions: {:#}", e)),
    }
}

pub async fn delete_session(
    store: &dyn SessionStore,
    user_id: &str,
    session_id: &str,
) -> Envelope<SessionRef> {
    match store.delete_session(session_id, user_id).await {
        Ok(true) => {
            tracing::info!(user_id, session_id, "Session deleted");
            Envelope::ok(
                "Session deleted successfully",
                SessionRef {
                    session_id: session_id.to_string(),
                },
            )
        }
        Ok(false) => Envelope::failure("Session not found"),
        Err(e) => Envelope::failure(format!("Error deleting session: {:#}", e)),
    }
}
