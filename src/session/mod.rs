//! Signed-in user sessions and the store that indexes them by subject.
//!
//! A [`UserSession`] is the typed projection of everything this service keeps
//! for a browser: subject, authentication flag, the provider token pair and the
//! journeys currently in flight. Records are persisted through a
//! [`SessionRecordStore`], which also answers "every session id for subject X"
//! so logout can tear down all of a user's devices at once.

mod handle;
pub mod postgres;
mod store;
mod teardown;

pub use handle::{SessionHandle, SessionSlot, WriteBack};
pub use store::{
    MemorySessionStore, SESSION_KEY_PREFIX, SessionRecord, SessionRecordStore, StoreError,
    session_key, strip_session_prefix,
};
pub use teardown::{SessionTeardown, TeardownReport};

use crate::journey::JourneyStateStore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};

fn expose<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// Provider credentials held for the signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    #[serde(serialize_with = "expose")]
    pub access_token: SecretString,
    #[serde(serialize_with = "expose")]
    pub refresh_token: SecretString,
    #[serde(serialize_with = "expose")]
    pub id_token: SecretString,
}

impl TokenSet {
    #[must_use]
    pub fn new(access_token: &str, refresh_token: &str, id_token: &str) -> Self {
        Self {
            access_token: SecretString::from(access_token),
            refresh_token: SecretString::from(refresh_token),
            id_token: SecretString::from(id_token),
        }
    }
}

impl PartialEq for TokenSet {
    fn eq(&self, other: &Self) -> bool {
        self.access_token.expose_secret() == other.access_token.expose_secret()
            && self.refresh_token.expose_secret() == other.refresh_token.expose_secret()
            && self.id_token.expose_secret() == other.id_token.expose_secret()
    }
}

impl Eq for TokenSet {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub subject_id: String,
    /// Sign-in email, sent along with password re-checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub is_authenticated: bool,
    pub tokens: TokenSet,
    #[serde(default, rename = "state")]
    pub journeys: JourneyStateStore,
}

impl UserSession {
    #[must_use]
    pub fn authenticated(subject_id: impl Into<String>, tokens: TokenSet) -> Self {
        Self {
            subject_id: subject_id.into(),
            email: None,
            is_authenticated: true,
            tokens,
            journeys: JourneyStateStore::default(),
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journey::JourneyType;

    #[test]
    fn user_session_round_trips_tokens_and_journeys() -> Result<(), serde_json::Error> {
        let mut session = UserSession::authenticated("u1", TokenSet::new("at", "rt", "it"));
        session.journeys.start(JourneyType::ChangePassword);

        let encoded = serde_json::to_value(&session)?;
        assert_eq!(encoded["tokens"]["accessToken"], "at");
        assert_eq!(encoded["state"]["changePassword"]["value"], "AUTHENTICATE");

        let decoded: UserSession = serde_json::from_value(encoded)?;
        assert_eq!(decoded.subject_id, "u1");
        assert_eq!(decoded.tokens.refresh_token.expose_secret(), "rt");
        assert_eq!(decoded.journeys, session.journeys);
        Ok(())
    }

    #[test]
    fn equality_sees_token_changes() {
        let session = UserSession::authenticated("u1", TokenSet::new("at", "rt", "it"));
        let mut refreshed = session.clone();
        assert_eq!(session, refreshed);

        refreshed.tokens.access_token = SecretString::from("at-2");
        assert_ne!(session, refreshed);
    }

    #[test]
    fn token_set_debug_redacts() {
        let tokens = TokenSet::new("access-secret", "refresh-secret", "id-secret");
        let debug = format!("{tokens:?}");
        assert!(!debug.contains("access-secret"));
        assert!(!debug.contains("refresh-secret"));
    }

    #[test]
    fn missing_state_defaults_to_no_journeys() -> Result<(), serde_json::Error> {
        let decoded: UserSession = serde_json::from_str(
            r#"{"subjectId":"u2","isAuthenticated":false,"tokens":{"accessToken":"a","refreshToken":"r","idToken":"i"}}"#,
        )?;
        assert!(decoded.journeys.is_empty());
        assert!(decoded.email.is_none());
        assert!(!decoded.is_authenticated);
        Ok(())
    }
}
