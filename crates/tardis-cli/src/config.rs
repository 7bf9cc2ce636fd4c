//! Command-line configuration.
//!
//! Flags fall back to environment variables:
//!
//! - `SHIM_URL` -- resolver shim address (`ws://` or `wss://`). Without one,
//!   `resolve` uses the local naive merge.
//! - `RESOLVE_TIMEOUT_MS` -- per-request deadline (default 30000, `0` for none)
//!
//! [`Args`] is what clap parses; [`TardisConfig`] is the validated form the
//! rest of the binary works with.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tardis_types::EventId;

/// Default per-request resolver timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Invalid command-line configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The shim address is not a WebSocket URL.
    #[error("invalid resolver URL {url:?}: expected ws://host[:port][/path] or wss://...")]
    InvalidShimUrl {
        /// The rejected value.
        url: String,
    },

    /// `--at` was given an empty event ID.
    #[error("--at needs a non-empty event ID")]
    EmptyEventId,
}

/// Raw command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "tardis",
    version,
    about = "Step through a Matrix room DAG and resolve the state at each event"
)]
pub struct Args {
    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load and validate a scenario file, then print a summary.
    Validate {
        /// Scenario file (`.json5`, or newline-delimited JSON events).
        scenario: PathBuf,
    },
    /// Resolve the state at an event and print it as JSON.
    Resolve {
        /// Scenario file (`.json5`, or newline-delimited JSON events).
        scenario: PathBuf,
        /// Event to resolve up to. Defaults to the scenario's start position.
        #[arg(long)]
        at: Option<String>,
        /// Resolver shim WebSocket address.
        #[arg(long, env = "SHIM_URL")]
        shim_url: Option<String>,
        /// Per-request resolver timeout in milliseconds; 0 waits forever.
        #[arg(long, env = "RESOLVE_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
        timeout_ms: u64,
    },
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TardisConfig {
    /// Validate a scenario file.
    Validate {
        /// Scenario to load.
        scenario: PathBuf,
    },
    /// Resolve state in a scenario.
    Resolve(ResolveConfig),
}

/// Settings for the `resolve` subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveConfig {
    /// Scenario to load.
    pub scenario: PathBuf,
    /// Event to move the cursor to before resolving.
    pub at: Option<EventId>,
    /// Resolver shim address, if a remote resolver is used.
    pub shim_url: Option<String>,
    /// Per-request deadline.
    pub timeout: Option<Duration>,
}

impl TryFrom<Args> for TardisConfig {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        match args.command {
            Command::Validate { scenario } => Ok(Self::Validate { scenario }),
            Command::Resolve {
                scenario,
                at,
                shim_url,
                timeout_ms,
            } => {
                let at = at
                    .map(|id| {
                        if id.is_empty() {
                            Err(ConfigError::EmptyEventId)
                        } else {
                            Ok(EventId::new(id))
                        }
                    })
                    .transpose()?;
                let shim_url = shim_url
                    .filter(|url| !url.is_empty())
                    .map(validate_shim_url)
                    .transpose()?;
                let timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));
                Ok(Self::Resolve(ResolveConfig {
                    scenario,
                    at,
                    shim_url,
                    timeout,
                }))
            }
        }
    }
}

/// Accept `ws://` and `wss://` URLs with a non-empty host.
fn validate_shim_url(url: String) -> Result<String, ConfigError> {
    let has_host = url
        .strip_prefix("ws://")
        .or_else(|| url.strip_prefix("wss://"))
        .is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/'));
    if has_host {
        Ok(url)
    } else {
        Err(ConfigError::InvalidShimUrl { url })
    }
}
