//! Session record creation, lookup by join code, join, and deletion.
//!
//! Owns the mapping from the human-entered join code to the session id.
//! Codes are stored upper-case and matched case-insensitively; uniqueness
//! among live sessions is best-effort (the code space makes collisions
//! negligible).

use std::sync::Arc;

use chrono::Utc;
use derive_more::{Display, Error, From};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::session::{
    JOIN_CODE_LEN, Participant, PlayerId, SESSIONS_PATH, SessionId, SessionRecord,
    participant_path, session_path,
};
use crate::store::{Store, StoreError};

/// Length of generated session identifiers.
const SESSION_ID_LEN: usize = 16;

/// Errors from repository operations.
#[derive(Debug, Display, Error, From)]
pub enum RepositoryError {
    /// No live session matches the entered join code.
    #[display("no game found for that code")]
    NotFound,
    /// The session already has two participants.
    #[display("game is full")]
    Full,
    /// The underlying store operation failed.
    #[display("{_0}")]
    #[from]
    Store(StoreError),
}

/// Creates, finds, joins, and deletes session records in the store.
#[derive(Clone)]
pub struct SessionRepository {
    store: Arc<dyn Store>,
}

impl SessionRepository {
    /// Creates a repository over the given store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Creates a session hosted by `host_id`, returning the new session id
    /// and its join code. The host is the sole participant and the session
    /// starts in the lobby phase.
    #[instrument(skip(self))]
    pub async fn create_session(
        &self,
        host_id: &str,
        host_name: &str,
    ) -> Result<(SessionId, String), RepositoryError> {
        let session_id = generate_session_id();
        let code = generate_join_code();
        let record = SessionRecord::new(
            code.clone(),
            host_id,
            host_name,
            Utc::now().timestamp_millis(),
        );
        self.store
            .write(&session_path(&session_id), to_value(&record)?)
            .await?;
        info!(session_id = %session_id, code = %code, "session created");
        Ok((session_id, code))
    }

    /// Finds the live session whose join code matches `code`
    /// (case-insensitive).
    #[instrument(skip(self))]
    pub async fn find_session_by_code(&self, code: &str) -> Result<SessionId, RepositoryError> {
        let code = code.trim().to_uppercase();
        let sessions = self.store.read_once(SESSIONS_PATH).await?;
        let Some(Value::Object(sessions)) = sessions else {
            debug!("no live sessions");
            return Err(RepositoryError::NotFound);
        };
        for (session_id, record) in sessions {
            if record.get("code").and_then(Value::as_str) == Some(code.as_str()) {
                debug!(session_id = %session_id, "code matched");
                return Ok(session_id);
            }
        }
        debug!(code = %code, "no session with code");
        Err(RepositoryError::NotFound)
    }

    /// Adds `joiner_id` to the session. Fails with [`RepositoryError::Full`]
    /// at the two-participant cap; re-joining with the same id is a no-op.
    #[instrument(skip(self))]
    pub async fn join_session(
        &self,
        session_id: &str,
        joiner_id: &str,
        joiner_name: &str,
    ) -> Result<(), RepositoryError> {
        let snapshot = self.store.read_once(&session_path(session_id)).await?;
        let record = snapshot
            .as_ref()
            .and_then(SessionRecord::from_value)
            .ok_or(RepositoryError::NotFound)?;
        if record.participant(joiner_id).is_some() {
            debug!(joiner_id, "already a participant");
            return Ok(());
        }
        if record.is_full() {
            warn!(session_id, "join rejected, session full");
            return Err(RepositoryError::Full);
        }
        self.store
            .write(
                &participant_path(session_id, joiner_id),
                to_value(&Participant::new(joiner_name))?,
            )
            .await?;
        info!(session_id, joiner_id, "joined session");
        Ok(())
    }

    /// Deletes the whole session record. Idempotent: deleting an absent
    /// session is not an error.
    #[instrument(skip(self))]
    pub async fn delete_session(&self, session_id: &str) -> Result<(), RepositoryError> {
        self.store.remove(&session_path(session_id)).await?;
        info!(session_id, "session deleted");
        Ok(())
    }
}

impl std::fmt::Debug for SessionRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRepository").finish_non_exhaustive()
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, RepositoryError> {
    serde_json::to_value(value)
        .map_err(|e| RepositoryError::Store(StoreError::new(format!("encode record: {e}"))))
}

/// A fresh session identifier: random lowercase alphanumerics.
fn generate_session_id() -> SessionId {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

/// A fresh join code: 6 uppercase alphanumerics.
fn generate_join_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(JOIN_CODE_LEN)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect()
}

/// A fresh local player identifier, generated once per client process.
pub fn generate_player_id() -> PlayerId {
    let suffix = Utc::now().timestamp_millis();
    let head: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
    format!("{head}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_codes_are_six_uppercase_alphanumerics() {
        for _ in 0..32 {
            let code = generate_join_code();
            assert_eq!(code.len(), JOIN_CODE_LEN);
            assert!(
                code.chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            );
        }
    }

    #[test]
    fn player_ids_are_distinct() {
        assert_ne!(generate_player_id(), generate_player_id());
    }
}
