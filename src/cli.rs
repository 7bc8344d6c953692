//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, validate, health), and their associated argument
//! structs. Every `run` flag has an environment variable equivalent for
//! container deployments.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "relaymesh",
    version,
    about = "Dynamically configured load-balancing reverse proxy",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        relaymesh run                        Start with ./relaymesh.yaml\n  \
        relaymesh run -c routes.yaml         Start with a specific route file\n  \
        relaymesh validate routes.yaml       Check a route file without starting"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy server
    Run(Box<RunArgs>),

    /// Validate a route file without starting
    Validate(ValidateArgs),

    /// Check health of a running instance
    Health(HealthArgs),
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        relaymesh run                                    Auto-detect route file\n  \
        relaymesh run -c routes.yaml -p 8080 --pretty    Local dev mode\n  \
        relaymesh run --redis-url redis://cache:6379     Redis registry")]
pub struct RunArgs {
    /// Route file path (.yaml, .json, .toml)
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // -- Registry --
    /// Redis connection URL (takes precedence over a route file)
    #[cfg(feature = "redis")]
    #[arg(long, env = "REDIS_URL", help_heading = "Registry")]
    pub redis_url: Option<String>,

    /// Pub/sub channel carrying route updates
    #[cfg(feature = "redis")]
    #[arg(
        long,
        env = "REDIS_CHANNEL",
        default_value = crate::config::sources::redis_source::DEFAULT_CHANNEL,
        help_heading = "Registry"
    )]
    pub redis_channel: String,

    /// Key pattern of persisted route registrations
    #[cfg(feature = "redis")]
    #[arg(
        long,
        env = "REDIS_KEY_PATTERN",
        default_value = crate::config::sources::redis_source::DEFAULT_KEY_PATTERN,
        help_heading = "Registry"
    )]
    pub redis_key_pattern: String,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    // -- Tuning --
    /// Seconds between health probes of each backend
    #[arg(
        long,
        env = "PROBE_INTERVAL_SECS",
        default_value_t = 15,
        value_parser = clap::value_parser!(u64).range(1..),
        help_heading = "Tuning"
    )]
    pub probe_interval: u64,

    /// Health probe connect timeout in milliseconds
    #[arg(
        long,
        env = "PROBE_TIMEOUT_MS",
        default_value_t = 2000,
        help_heading = "Tuning"
    )]
    pub probe_timeout: u64,

    /// Backend connect timeout in milliseconds
    #[arg(
        long,
        env = "CONNECT_TIMEOUT_MS",
        default_value_t = 5000,
        help_heading = "Tuning"
    )]
    pub connect_timeout: u64,

    /// Backend response timeout in milliseconds
    #[arg(
        long,
        env = "RESPONSE_TIMEOUT_MS",
        default_value_t = 10_000,
        help_heading = "Tuning"
    )]
    pub response_timeout: u64,

    /// Max request body size in bytes
    #[arg(
        long,
        env = "MAX_BODY_SIZE",
        default_value_t = 1_048_576,
        help_heading = "Tuning"
    )]
    pub max_body: usize,

    /// Route file poll interval in seconds
    #[arg(
        long,
        env = "POLL_INTERVAL_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..),
        help_heading = "Tuning"
    )]
    pub poll_interval: u64,

    /// Seconds to wait before resubscribing to an unreachable registry
    #[arg(
        long,
        env = "RESUBSCRIBE_INTERVAL_SECS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..),
        help_heading = "Tuning"
    )]
    pub resubscribe_interval: u64,
}

impl RunArgs {
    #[must_use]
    pub const fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval)
    }

    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }

    #[must_use]
    pub const fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    #[must_use]
    pub const fn resubscribe_interval(&self) -> Duration {
        Duration::from_secs(self.resubscribe_interval)
    }
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Route file to validate
    #[arg(default_value = "relaymesh.yaml")]
    pub config: PathBuf,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: ValidateFormat,
}

#[derive(Args)]
pub struct HealthArgs {
    /// URL of the running instance
    #[arg(default_value = "http://localhost:8080")]
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ValidateFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults() {
        let cli = Cli::try_parse_from(["relaymesh", "run"]).unwrap();
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.probe_interval(), Duration::from_secs(15));
        assert_eq!(args.probe_timeout(), Duration::from_secs(2));
        assert_eq!(args.connect_timeout(), Duration::from_secs(5));
        assert_eq!(args.response_timeout(), Duration::from_secs(10));
        assert_eq!(args.resubscribe_interval(), Duration::from_secs(5));
    }

    #[test]
    fn zero_probe_interval_is_rejected() {
        assert!(Cli::try_parse_from(["relaymesh", "run", "--probe-interval", "0"]).is_err());
    }

    #[test]
    fn zero_resubscribe_interval_is_rejected() {
        assert!(
            Cli::try_parse_from(["relaymesh", "run", "--resubscribe-interval", "0"]).is_err()
        );
        assert!(
            Cli::try_parse_from(["relaymesh", "run", "--resubscribe-interval", "1"]).is_ok()
        );
    }

    #[test]
    fn pretty_and_json_conflict() {
        assert!(Cli::try_parse_from(["relaymesh", "run", "--pretty", "--json"]).is_err());
    }
}
