//! Map validated CLI arguments to the action the binary runs.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_ACCOUNT_API_URL, ARG_BASE_URL, ARG_PORT, oidc, session};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let base_url = matches
        .get_one::<String>(ARG_BASE_URL)
        .cloned()
        .context("missing required argument: --base-url")?;
    let account_api_url = matches
        .get_one::<String>(ARG_ACCOUNT_API_URL)
        .filter(|value| !value.is_empty())
        .cloned()
        .context("missing required argument: --account-api-url")?;

    let session_opts = session::Options::parse(matches)?;
    let oidc_opts = oidc::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        base_url,
        account_api_url,
        dsn: session_opts.dsn,
        session_ttl: session_opts.ttl,
        oidc_issuer: oidc_opts.issuer,
        oidc_client_id: oidc_opts.client_id,
        oidc_key_set: oidc_opts.key_set,
        oidc_token_endpoint: oidc_opts.token_endpoint,
        oidc_end_session_endpoint: oidc_opts.end_session_endpoint,
        client_key_path: oidc_opts.client_key_path,
        client_key_id: oidc_opts.client_key_id,
        logout_token_max_age: oidc_opts.logout_token_max_age,
        token_clock_skew: oidc_opts.token_clock_skew,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::oidc::KeySetSource;
    use std::time::Duration;

    const REQUIRED_ENV: [(&str, Option<&str>); 9] = [
        ("MANAGE_ACCOUNT_BASE_URL", Some("https://account.example.test")),
        (
            "MANAGE_ACCOUNT_ACCOUNT_API_URL",
            Some("https://api.account.example.test"),
        ),
        ("MANAGE_ACCOUNT_OIDC_ISSUER", Some("https://oidc.example.test")),
        ("MANAGE_ACCOUNT_OIDC_CLIENT_ID", Some("manage-account")),
        (
            "MANAGE_ACCOUNT_OIDC_JWKS_URL",
            Some("https://oidc.example.test/jwks"),
        ),
        (
            "MANAGE_ACCOUNT_OIDC_TOKEN_ENDPOINT",
            Some("https://oidc.example.test/token"),
        ),
        (
            "MANAGE_ACCOUNT_OIDC_END_SESSION_ENDPOINT",
            Some("https://oidc.example.test/logout"),
        ),
        (
            "MANAGE_ACCOUNT_CLIENT_KEY_PATH",
            Some("/etc/manage-account/client.pem"),
        ),
        ("MANAGE_ACCOUNT_DSN", None),
    ];

    fn with_env<F: FnOnce()>(overrides: &[(&'static str, Option<&'static str>)], f: F) {
        let mut vars: Vec<(&str, Option<&str>)> = REQUIRED_ENV.to_vec();
        for (key, value) in overrides {
            vars.retain(|(existing, _)| existing != key);
            vars.push((key, *value));
        }
        temp_env::with_vars(vars, f);
    }

    fn dispatch() -> Result<Args> {
        let matches = crate::cli::commands::new().get_matches_from(vec!["manage-account"]);
        match handler(&matches)? {
            Action::Server(args) => Ok(args),
        }
    }

    #[test]
    fn builds_server_args_from_env() {
        with_env(&[("MANAGE_ACCOUNT_TOKEN_CLOCK_SKEW", Some("5"))], || {
            let args = dispatch();
            assert!(args.is_ok());
            if let Ok(args) = args {
                assert_eq!(args.port, 8080);
                assert_eq!(args.dsn, None);
                assert_eq!(args.account_api_url, "https://api.account.example.test");
                assert_eq!(args.oidc_client_id, "manage-account");
                assert_eq!(
                    args.oidc_key_set,
                    KeySetSource::Url("https://oidc.example.test/jwks".to_string())
                );
                assert_eq!(args.client_key_id, "client-1");
                assert_eq!(args.logout_token_max_age, Duration::from_secs(120));
                assert_eq!(args.token_clock_skew, Duration::from_secs(5));
                assert_eq!(args.session_ttl, Duration::from_secs(3600));
            }
        });
    }

    #[test]
    fn key_set_path_is_accepted_instead_of_url() {
        with_env(
            &[
                ("MANAGE_ACCOUNT_OIDC_JWKS_URL", None),
                (
                    "MANAGE_ACCOUNT_OIDC_JWKS_PATH",
                    Some("/etc/manage-account/jwks.json"),
                ),
            ],
            || {
                let args = dispatch();
                assert!(args.is_ok_and(|args| args.oidc_key_set
                    == KeySetSource::Path("/etc/manage-account/jwks.json".to_string())));
            },
        );
    }

    #[test]
    fn key_set_source_required() {
        with_env(
            &[
                ("MANAGE_ACCOUNT_OIDC_JWKS_URL", None),
                ("MANAGE_ACCOUNT_OIDC_JWKS_PATH", None),
            ],
            || {
                let result = dispatch();
                assert!(result.err().is_some_and(|err| err
                    .to_string()
                    .contains("--oidc-jwks-url or --oidc-jwks-path")));
            },
        );
    }

    #[test]
    fn empty_client_id_is_missing() {
        with_env(&[("MANAGE_ACCOUNT_OIDC_CLIENT_ID", Some(""))], || {
            let result = dispatch();
            assert!(result.err().is_some_and(|err| err
                .to_string()
                .contains("missing required argument: --oidc-client-id")));
        });
    }

    #[test]
    fn account_api_url_required() {
        with_env(&[("MANAGE_ACCOUNT_ACCOUNT_API_URL", None)], || {
            let result = dispatch();
            assert!(result.err().is_some_and(|err| err
                .to_string()
                .contains("missing required argument: --account-api-url")));
        });
    }

    #[test]
    fn zero_session_ttl_rejected() {
        with_env(&[("MANAGE_ACCOUNT_SESSION_TTL", Some("0"))], || {
            assert!(dispatch().is_err());
        });
    }
}
