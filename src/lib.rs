//! # manage-account (account management sessions)
//!
//! `manage-account` serves the signed-in account management pages of an
//! OIDC relying party and keeps the user's sessions consistent with the
//! identity provider.
//!
//! ## Journeys
//!
//! Every multi-step flow (change email, change password, delete account, ...)
//! is a journey. Each journey has a small state machine stored in the user's
//! session, and every journey page declares the event it requires. A request
//! that does not match the recorded state is redirected to `/your-services`
//! and the journey entry is discarded, so pages cannot be skipped or replayed.
//! Journeys advance past their first page once the account management API
//! accepts the user's password.
//!
//! ## Sessions
//!
//! Session records live in a shared store (Postgres, or in memory for local
//! runs) indexed by subject. Voluntary logout, sign-out-everywhere and
//! back-channel logout from the provider all tear down every session of the
//! subject.
//!
//! ## Tokens
//!
//! Back-channel logout tokens are RS256 JWTs verified against the provider's
//! key set. Expired access tokens are refreshed before a guarded page runs,
//! authenticating to the token endpoint with a signed client assertion.

pub mod account;
pub mod api;
pub mod cli;
pub mod journey;
pub mod oidc;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
