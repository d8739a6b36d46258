use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_OIDC_ISSUER: &str = "oidc-issuer";
pub const ARG_OIDC_CLIENT_ID: &str = "oidc-client-id";
pub const ARG_OIDC_JWKS_URL: &str = "oidc-jwks-url";
pub const ARG_OIDC_JWKS_PATH: &str = "oidc-jwks-path";
pub const ARG_OIDC_TOKEN_ENDPOINT: &str = "oidc-token-endpoint";
pub const ARG_OIDC_END_SESSION_ENDPOINT: &str = "oidc-end-session-endpoint";
pub const ARG_CLIENT_KEY_PATH: &str = "client-key-path";
pub const ARG_CLIENT_KEY_ID: &str = "client-key-id";
pub const ARG_LOGOUT_TOKEN_MAX_AGE: &str = "logout-token-max-age";
pub const ARG_TOKEN_CLOCK_SKEW: &str = "token-clock-skew";

/// Where the provider's signing keys come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySetSource {
    Url(String),
    Path(String),
}

#[derive(Debug, Clone)]
pub struct Options {
    pub issuer: String,
    pub client_id: String,
    pub key_set: KeySetSource,
    pub token_endpoint: String,
    pub end_session_endpoint: String,
    pub client_key_path: String,
    pub client_key_id: String,
    pub logout_token_max_age: Duration,
    pub token_clock_skew: Duration,
}

impl Options {
    /// Parse provider arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing or empty, or if
    /// neither a key set URL nor a key set path is given.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        // clap passes through empty strings when env vars are set to ""
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };
        let required = |id: &str| {
            get_non_empty(id)
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        let key_set = match (
            get_non_empty(ARG_OIDC_JWKS_URL),
            get_non_empty(ARG_OIDC_JWKS_PATH),
        ) {
            (Some(url), _) => KeySetSource::Url(url),
            (None, Some(path)) => KeySetSource::Path(path),
            (None, None) => anyhow::bail!(
                "missing required argument: --{ARG_OIDC_JWKS_URL} or --{ARG_OIDC_JWKS_PATH}"
            ),
        };

        let seconds = |id: &str, default: u64| {
            Duration::from_secs(matches.get_one::<u64>(id).copied().unwrap_or(default))
        };

        Ok(Self {
            issuer: required(ARG_OIDC_ISSUER)?,
            client_id: required(ARG_OIDC_CLIENT_ID)?,
            key_set,
            token_endpoint: required(ARG_OIDC_TOKEN_ENDPOINT)?,
            end_session_endpoint: required(ARG_OIDC_END_SESSION_ENDPOINT)?,
            client_key_path: required(ARG_CLIENT_KEY_PATH)?,
            client_key_id: get_non_empty(ARG_CLIENT_KEY_ID)
                .unwrap_or_else(|| "client-1".to_string()),
            logout_token_max_age: seconds(ARG_LOGOUT_TOKEN_MAX_AGE, 120),
            token_clock_skew: seconds(ARG_TOKEN_CLOCK_SKEW, 10),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OIDC_ISSUER)
                .long(ARG_OIDC_ISSUER)
                .help("Expected logout token issuer (iss)")
                .env("MANAGE_ACCOUNT_OIDC_ISSUER"),
        )
        .arg(
            Arg::new(ARG_OIDC_CLIENT_ID)
                .long(ARG_OIDC_CLIENT_ID)
                .help("Client id registered with the provider")
                .long_help(
                    "Client id registered with the provider.\n\nExpected as the audience (aud) of logout tokens and used as iss/sub of client assertions.",
                )
                .env("MANAGE_ACCOUNT_OIDC_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_OIDC_JWKS_URL)
                .long(ARG_OIDC_JWKS_URL)
                .help("Provider JWKS URL (https) used to verify logout tokens")
                .long_help(
                    "Provider JWKS URL (https) used to verify logout tokens.\n\nThe key set is cached (TTL ~5 minutes) and refreshed on unknown `kid` with a cooldown.",
                )
                .env("MANAGE_ACCOUNT_OIDC_JWKS_URL")
                .conflicts_with(ARG_OIDC_JWKS_PATH),
        )
        .arg(
            Arg::new(ARG_OIDC_JWKS_PATH)
                .long(ARG_OIDC_JWKS_PATH)
                .help("Path to a static JWKS file used to verify logout tokens")
                .env("MANAGE_ACCOUNT_OIDC_JWKS_PATH"),
        )
        .arg(
            Arg::new(ARG_OIDC_TOKEN_ENDPOINT)
                .long(ARG_OIDC_TOKEN_ENDPOINT)
                .help("Provider token endpoint used to refresh access tokens")
                .env("MANAGE_ACCOUNT_OIDC_TOKEN_ENDPOINT"),
        )
        .arg(
            Arg::new(ARG_OIDC_END_SESSION_ENDPOINT)
                .long(ARG_OIDC_END_SESSION_ENDPOINT)
                .help("Provider end-session endpoint the browser is sent to on logout")
                .env("MANAGE_ACCOUNT_OIDC_END_SESSION_ENDPOINT"),
        )
        .arg(
            Arg::new(ARG_CLIENT_KEY_PATH)
                .long(ARG_CLIENT_KEY_PATH)
                .help("Path to the RSA private key (PEM or DER) signing client assertions")
                .env("MANAGE_ACCOUNT_CLIENT_KEY_PATH"),
        )
        .arg(
            Arg::new(ARG_CLIENT_KEY_ID)
                .long(ARG_CLIENT_KEY_ID)
                .help("Key id (kid) placed in client assertion headers")
                .default_value("client-1")
                .env("MANAGE_ACCOUNT_CLIENT_KEY_ID"),
        )
        .arg(
            Arg::new(ARG_LOGOUT_TOKEN_MAX_AGE)
                .long(ARG_LOGOUT_TOKEN_MAX_AGE)
                .help("Maximum logout token age in seconds")
                .default_value("120")
                .env("MANAGE_ACCOUNT_LOGOUT_TOKEN_MAX_AGE")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_TOKEN_CLOCK_SKEW)
                .long(ARG_TOKEN_CLOCK_SKEW)
                .help("Clock skew tolerated on token timestamps, in seconds")
                .default_value("10")
                .env("MANAGE_ACCOUNT_TOKEN_CLOCK_SKEW")
                .value_parser(clap::value_parser!(u64)),
        )
}
