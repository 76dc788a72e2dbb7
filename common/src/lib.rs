//! Shared implementation of the `uremap` tool
//!
//! `uremap` rewrites the numeric owner and group of every entry under one or more directories
//! according to a small remap table, e.g. after accounts were renumbered or a filesystem moved
//! between hosts with different uid/gid assignments.
//!
//! # Pipeline
//!
//! 1. [`args::partition`] splits the raw arguments into switches and directory paths.
//! 2. [`args::parse_switches`] decodes the switches ([`switch`]), expands switch files and builds
//!    a validated [`remap::RemapTable`].
//! 3. [`preflight::check`] makes sure there is something to do before anything is touched.
//! 4. [`chown()`] walks each directory and applies the table, reporting through a
//!    [`report::Reporter`].
//!
//! # Switches
//!
//! ```text
//! -u<FROM>:<TO>   remap uid FROM to TO
//! -g<FROM>:<TO>   remap gid FROM to TO
//! -f<PATH>        read switches from PATH (one per line, may include other files)
//! --dry-run       show what would change, change nothing
//! --verbose       print "<uid>\t<gid>\t<path>" for every remapped entry
//! ```
//!
//! Root (id 0) is never remapped, in either direction, and each source id may be remapped only
//! once. Remaps do not chain: with `-u100:200 -u200:300` an entry owned by 100 ends up owned by
//! 200.
//!
//! # Safety
//!
//! Changing the owner of a setuid/setgid file always produces a warning, even in dry-run mode.
//! Since `chown(2)` may clear those bits, the original mode is written back after every owner
//! change (except on symlinks, which are never followed).

use tracing::Instrument;

pub mod args;
pub mod chown;
pub mod config;
pub mod preflight;
pub mod remap;
pub mod report;
pub mod switch;
#[cfg(test)]
pub mod testutils;

pub use chown::chown;
pub use chown::Settings as ChownSettings;
pub use chown::Summary as ChownSummary;
pub use config::TracingConfig;

fn init_tracing(config: &TracingConfig) {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(config.default_level.into())
        .from_env_lossy();
    // stdout is reserved for --verbose change lines
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Set up logging and a single-threaded runtime, then drive `func` to completion.
///
/// Returns `None` if `func` failed; the error has already been logged.
pub fn run<Fut, Summary>(
    tracing_config: TracingConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Fut: std::future::Future<Output = anyhow::Result<Summary>>,
{
    init_tracing(&tracing_config);
    // entries are processed strictly one at a time
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!("failed to start runtime: {:#}", &error);
            return None;
        }
    };
    let span = tracing::info_span!("run", id = %tracing_config.trace_identifier);
    let res = runtime.block_on(func().instrument(span));
    match res {
        Ok(summary) => {
            tracing::info!("summary:\n{}", &summary);
            Some(summary)
        }
        Err(error) => {
            tracing::error!("{:#}", &error);
            None
        }
    }
}
