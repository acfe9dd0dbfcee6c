//! Conversation session lifecycle
//!
//! A session id is generated client-side when a conversation surface mounts
//! and sent with every chat and game request. Tearing the surface down sends
//! a best-effort `DELETE` for the id on a detached task; failures are logged
//! and never reach the caller.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::Backend;
use crate::transcript::Transcript;
use crate::{Error, Result};

/// Generate a fresh session id: `session-<unix millis>-<random suffix>`
#[must_use]
pub fn generate_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("session-{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}

/// A live backend session owned by one conversation surface
///
/// Consumed by [`Session::teardown`], so an id can never be used after its
/// deletion was requested. Dropping a session without tearing it down
/// schedules the deletion as well.
pub struct Session {
    id: String,
    backend: Arc<dyn Backend>,
    closed: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open a session with a newly generated id
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let id = generate_session_id();
        tracing::debug!(session_id = %id, "session created");
        Self {
            id,
            backend,
            closed: false,
        }
    }

    /// Session id sent with every request
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Backend this session talks to
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Fetch the server-side transcript for this session
    ///
    /// # Errors
    ///
    /// Returns error if the backend request fails
    pub async fn history(&self) -> Result<Transcript> {
        let turns = self.backend.session_history(&self.id).await?;
        Ok(Transcript::from_turns(turns))
    }

    /// Request server-side deletion without waiting for it
    ///
    /// The returned handle may be awaited (tests do) but callers navigating
    /// away are expected to drop it.
    #[must_use = "the deletion runs detached; drop the handle explicitly if unused"]
    pub fn teardown(mut self) -> Option<JoinHandle<()>> {
        self.spawn_delete()
    }

    fn spawn_delete(&mut self) -> Option<JoinHandle<()>> {
        if self.closed {
            return None;
        }
        self.closed = true;

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(session_id = %self.id, "no async runtime, session not deleted");
            return None;
        };

        let backend = Arc::clone(&self.backend);
        let id = self.id.clone();

        Some(runtime.spawn(async move {
            match backend.delete_session(&id).await {
                Ok(()) => tracing::debug!(session_id = %id, "session torn down"),
                Err(e) => {
                    let err = Error::SessionTeardown(e.to_string());
                    tracing::warn!(session_id = %id, error = %err, "ignoring session teardown failure");
                }
            }
        }))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        drop(self.spawn_delete());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_have_prefix_and_are_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert!(a.starts_with("session-"));
        assert_ne!(a, b);
    }
}
