use anyhow::Result;
use clap::Parser;
use common::report::Reporter;

/// Only used to render --help and --version; the arguments themselves use the switch language
/// implemented in `common::args`, which clap can't express (`-u1000:2000`, switch files, `--`
/// ending the switch list).
#[derive(Parser, Debug)]
#[command(
    name = "uremap",
    version,
    about = "Recursively remap file ownership (uid/gid) across directory trees",
    override_usage = "uremap [SWITCH]... [--] <DIR>...",
    long_about = "`uremap` rewrites the numeric owner and group of every entry under the given
directories according to a remap table, e.g. after accounts were renumbered or a filesystem was
moved between hosts with different uid/gid assignments.

SWITCHES (must come before the directories; `--` ends the switch list):
    -u<FROM>:<TO>   Remap uid FROM to TO (repeatable)
    -g<FROM>:<TO>   Remap gid FROM to TO (repeatable)
    -f<PATH>        Read more switches from PATH, one per line (repeatable, may nest)
    --dry-run       Show what would change, change nothing
    --verbose       Print `<uid>\\t<gid>\\t<path>` for every remapped entry to stdout

Root (id 0) is never remapped and each source id may be remapped only once. Remaps don't
chain: with -u100:200 -u200:300 an entry owned by 100 ends up owned by 200. Symbolic links
are never followed. Changing the owner of a setuid/setgid file always prints a warning.

EXAMPLE:
    # Preview, then apply a renumbering of one user and one group
    uremap -u1001:2001 -g1001:2001 --dry-run --verbose /srv/data
    uremap -f/etc/uremap/site.args /srv/data /home

Set RUST_LOG (e.g. RUST_LOG=debug) for diagnostic logging on stderr."
)]
struct Args {
    /// Switches followed by the directories to remap
    #[arg(value_name = "SWITCH|DIR")]
    args: Vec<std::ffi::OsString>,
}

async fn async_main(raw_args: Vec<std::ffi::OsString>) -> Result<common::ChownSummary> {
    let (switches, paths) = common::args::partition(raw_args);
    tracing::debug!("switches={:?} paths={:?}", &switches, &paths);
    let parsed = common::args::parse_switches(&switches)?;
    let reporter = common::report::ConsoleReporter;
    for warning in parsed.warnings {
        reporter.report(warning.into());
    }
    tracing::debug!("remap table: {:?}, flags: {:?}", &parsed.table, &parsed.flags);
    common::preflight::check(&paths, &parsed.table)?;
    let settings = common::ChownSettings {
        dry_run: parsed.flags.dry_run,
        verbose: parsed.flags.verbose,
    };
    // one set for all paths, an entry reachable from two of them is remapped once
    let mut visited = common::chown::Visited::default();
    let mut summary = common::ChownSummary::default();
    for path in &paths {
        summary = summary
            + common::chown(path, &parsed.table, &settings, &mut visited, &reporter).await;
    }
    Ok(summary)
}

fn main() -> Result<()> {
    let raw_args: Vec<std::ffi::OsString> = std::env::args_os().skip(1).collect();
    // help and version only make sense up front, anywhere else they're ordinary arguments
    let wants_help_or_version = raw_args
        .first()
        .and_then(|arg| arg.to_str())
        .is_some_and(|arg| matches!(arg, "-h" | "--help" | "-V" | "--version"));
    if wants_help_or_version {
        // prints and exits
        let _args = Args::parse();
        return Ok(());
    }
    let func = || async_main(raw_args);
    let res = common::run(common::TracingConfig::default(), func);
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
