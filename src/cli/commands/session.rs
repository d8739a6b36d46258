use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_DSN: &str = "dsn";
pub const ARG_SESSION_TTL: &str = "session-ttl";

#[derive(Debug, Clone)]
pub struct Options {
    pub dsn: Option<String>,
    pub ttl: Duration,
}

impl Options {
    /// Parse session store arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the session TTL is zero.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let ttl = matches
            .get_one::<u64>(ARG_SESSION_TTL)
            .copied()
            .unwrap_or(3600);
        if ttl == 0 {
            anyhow::bail!("--{ARG_SESSION_TTL} must be greater than zero");
        }

        Ok(Self {
            dsn: matches
                .get_one::<String>(ARG_DSN)
                .cloned()
                .filter(|v| !v.trim().is_empty()),
            ttl: Duration::from_secs(ttl),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string for the session store")
                .long_help(
                    "Postgres connection string for the shared session store.\n\nWhen omitted, sessions are kept in process memory and are lost on restart.",
                )
                .env("MANAGE_ACCOUNT_DSN"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL)
                .long(ARG_SESSION_TTL)
                .help("Session record lifetime in seconds")
                .default_value("3600")
                .env("MANAGE_ACCOUNT_SESSION_TTL")
                .value_parser(clap::value_parser!(u64)),
        )
}
