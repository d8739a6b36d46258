//! Identity-provider integration: RS256 tokens, issuer key sets, back-channel
//! logout verification and access-token refresh.

pub mod assertion;
pub mod jwks;
pub mod jwt;
pub mod logout_token;
pub mod refresh;

pub use assertion::ClientAssertionSigner;
pub use jwks::{DependencyStatus, IssuerKeys, Jwk, Jwks, KeySetError};
pub use jwt::JwtError;
pub use logout_token::{
    BACKCHANNEL_LOGOUT_EVENT, LogoutTokenError, LogoutTokenVerifier, VerifiedLogout,
};
pub use refresh::{
    AccessTokenRefresher, ExchangeError, FAILED_TO_REFRESH_TOKEN, Freshness, HttpTokenEndpoint,
    RefreshError, TokenEndpoint, TokenResponse,
};
