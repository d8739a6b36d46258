pub mod logging;
pub mod oidc;
pub mod session;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const ARG_PORT: &str = "port";
pub const ARG_BASE_URL: &str = "base-url";
pub const ARG_ACCOUNT_API_URL: &str = "account-api-url";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("manage-account")
        .about("Account management journeys and session integrity")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("MANAGE_ACCOUNT_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_BASE_URL)
                .long(ARG_BASE_URL)
                .help("Public base URL of this service")
                .long_help(
                    "Public base URL of this service.\n\nUsed to build the post-logout redirect URI; cookies are marked Secure when it uses https.",
                )
                .env("MANAGE_ACCOUNT_BASE_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_ACCOUNT_API_URL)
                .long(ARG_ACCOUNT_API_URL)
                .help("Base URL of the account management API")
                .long_help(
                    "Base URL of the account management API.\n\nJourney password checks are posted to {url}/authenticate with the user's access token.",
                )
                .env("MANAGE_ACCOUNT_ACCOUNT_API_URL"),
        );

    let command = session::with_args(command);
    let command = oidc::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "manage-account");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Account management journeys and session integrity".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_defaults() {
        temp_env::with_vars(
            [
                ("MANAGE_ACCOUNT_PORT", None::<&str>),
                ("MANAGE_ACCOUNT_SESSION_TTL", None),
                ("MANAGE_ACCOUNT_LOGOUT_TOKEN_MAX_AGE", None),
                ("MANAGE_ACCOUNT_TOKEN_CLOCK_SKEW", None),
                ("MANAGE_ACCOUNT_CLIENT_KEY_ID", None),
            ],
            || {
                let matches = new().get_matches_from(vec![
                    "manage-account",
                    "--base-url",
                    "https://account.example.test",
                ]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(8080));
                assert_eq!(
                    matches.get_one::<u64>(session::ARG_SESSION_TTL).copied(),
                    Some(3600)
                );
                assert_eq!(
                    matches
                        .get_one::<u64>(oidc::ARG_LOGOUT_TOKEN_MAX_AGE)
                        .copied(),
                    Some(120)
                );
                assert_eq!(
                    matches.get_one::<u64>(oidc::ARG_TOKEN_CLOCK_SKEW).copied(),
                    Some(10)
                );
                assert_eq!(
                    matches
                        .get_one::<String>(oidc::ARG_CLIENT_KEY_ID)
                        .map(String::as_str),
                    Some("client-1")
                );
            },
        );
    }

    #[test]
    fn test_jwks_url_conflicts_with_path() {
        let result = new().try_get_matches_from(vec![
            "manage-account",
            "--base-url",
            "https://account.example.test",
            "--oidc-jwks-url",
            "https://oidc.example.test/jwks",
            "--oidc-jwks-path",
            "/etc/manage-account/jwks.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_env_port() {
        temp_env::with_vars(
            [
                ("MANAGE_ACCOUNT_PORT", Some("9090")),
                ("MANAGE_ACCOUNT_BASE_URL", Some("http://localhost:9090")),
            ],
            || {
                let matches = new().get_matches_from(vec!["manage-account"]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(9090));
                assert_eq!(
                    matches.get_one::<String>(ARG_BASE_URL).map(String::as_str),
                    Some("http://localhost:9090")
                );
            },
        );
    }

    #[test]
    fn test_verbosity_count() {
        let matches = new().get_matches_from(vec![
            "manage-account",
            "--base-url",
            "http://localhost:8080",
            "-vv",
        ]);
        assert_eq!(
            matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
            Some(2)
        );
    }
}
