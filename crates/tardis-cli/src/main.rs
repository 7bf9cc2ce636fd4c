//! `tardis`: load a Matrix room DAG scenario and resolve its state.
//!
//! ```text
//! scenario file --> Session --> Orchestrator --> ResolverClient --> WebSocket --> shim
//!                                                     ^                            |
//!                                                     +-------- get_event <--------+
//! ```
//!
//! `validate` only loads the scenario. `resolve` positions the cursor,
//! resolves every event up to it, and prints the state as JSON on stdout.
//! Logs go to stderr.

mod config;
mod report;

use anyhow::{Context as _, bail};
use clap::Parser as _;
use tardis_core::{NaiveResolver, Scenario, Session, StateResolver};
use tardis_resolver::connect_session;
use tardis_types::EventId;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Args, ResolveConfig, TardisConfig};
use crate::report::{ResolveReport, ValidateReport};

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the scenario cannot
/// be loaded, or resolution fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    match TardisConfig::try_from(args)? {
        TardisConfig::Validate { scenario } => {
            let scenario = Scenario::from_path(&scenario)
                .with_context(|| format!("loading {}", scenario.display()))?;
            print_json(&ValidateReport::new(&scenario))
        }
        TardisConfig::Resolve(config) => run_resolve(config).await,
    }
}

/// Structured logging to stderr, filtered by `RUST_LOG` (default `info`).
/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_resolve(config: ResolveConfig) -> anyhow::Result<()> {
    let scenario = Scenario::from_path(&config.scenario)
        .with_context(|| format!("loading {}", config.scenario.display()))?;

    let Some(url) = config.shim_url else {
        warn!("no resolver shim configured, merging state without conflict resolution");
        let mut session = Session::load(scenario, NaiveResolver::new());
        let report = resolve_at(&mut session, config.at.as_ref()).await?;
        return print_json(&report);
    };

    let (mut session, transport) = connect_session(scenario, &url, config.timeout)
        .await
        .with_context(|| format!("connecting to resolver shim at {url}"))?;

    let outcome = resolve_at(&mut session, config.at.as_ref()).await;
    transport.close().await;
    print_json(&outcome?)
}

async fn resolve_at<R: StateResolver>(
    session: &mut Session<R>,
    at: Option<&EventId>,
) -> anyhow::Result<ResolveReport> {
    let unknown = at.filter(|at| !session.go_to(at));
    if let Some(at) = unknown {
        bail!("event {at} is not in the scenario");
    }
    let Some(current) = session.current().cloned() else {
        bail!("scenario has no events to resolve");
    };

    let summary = session
        .resolve()
        .await
        .with_context(|| format!("resolving state at {current}"))?;
    info!(
        current = %current,
        resolved = summary.resolved,
        cached = summary.cached,
        "resolution complete"
    );
    Ok(ResolveReport::collect(session, summary).await)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("encoding output")?;
    println!("{text}");
    Ok(())
}
