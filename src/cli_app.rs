//! Top-level CLI definition and dispatch.

use std::io;
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};

use dirmirror::core::config::Config;
use dirmirror::core::errors::Result;
use dirmirror::daemon::loop_main::SyncDaemon;
use dirmirror::mirror::service::OsFileService;
use dirmirror::mirror::sync::{Mirror, TickOutcome};

/// One-way directory mirroring daemon.
#[derive(Debug, Parser)]
#[command(
    name = "dirmirror",
    author,
    version,
    about = "Keeps a mirror directory byte-for-byte synchronized with an origin",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the mirroring daemon.
    Run(MirrorArgs),
    /// Run a single reconciliation pass and exit.
    Sync(MirrorArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct MirrorArgs {
    /// Source directory; never written to.
    #[arg(long, value_name = "PATH")]
    origin: Option<PathBuf>,
    /// Destination directory; overwritten to match origin.
    #[arg(long, value_name = "PATH")]
    mirror: Option<PathBuf>,
    /// Tick period in milliseconds.
    #[arg(long, value_name = "MS")]
    interval: Option<u64>,
    /// Maximum mirrored file size in bytes.
    #[arg(long, value_name = "BYTES")]
    maxsize: Option<u64>,
    /// Copy buffer size in KiB.
    #[arg(long, value_name = "KIB")]
    buffer_multiplier: Option<u64>,
    /// Load settings from a TOML file; explicit flags override it.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Directory for persisted snapshot libraries.
    #[arg(long, value_name = "PATH")]
    library_dir: Option<PathBuf>,
    /// JSONL activity log file.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
    /// Skip the synchronous check before the interval loop starts.
    #[arg(long)]
    no_initial_check: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    shell: CompletionShell,
}

impl MirrorArgs {
    /// Merge the optional config file with explicit flags (flags win).
    fn build_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(origin) = &self.origin {
            config.mirror.origin = origin.clone();
        }
        if let Some(mirror) = &self.mirror {
            config.mirror.target = mirror.clone();
        }
        if let Some(interval) = self.interval {
            config.mirror.interval_ms = interval;
        }
        if let Some(maxsize) = self.maxsize {
            config.mirror.max_file_size = maxsize;
        }
        if let Some(buffer) = self.buffer_multiplier {
            config.mirror.buffer_kib = buffer;
        }
        if let Some(library_dir) = &self.library_dir {
            config.paths.library_dir = library_dir.clone();
        }
        if let Some(log_file) = &self.log_file {
            config.paths.log_file = Some(log_file.clone());
        }
        if self.no_initial_check {
            config.daemon.initial_check = false;
        }

        Ok(config)
    }
}

/// Dispatch a parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => {
            let config = args.build_config()?;
            config.validate()?;
            SyncDaemon::init(&config)?.run()
        }
        Command::Sync(args) => run_sync(&args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let name = command.get_name().to_string();
            generate(args.shell, &mut command, name, &mut io::stdout());
            Ok(())
        }
    }
}

fn run_sync(args: &MirrorArgs) -> Result<()> {
    let mut config = args.build_config()?;
    // A one-shot pass has no timer; any positive interval satisfies
    // validation without requiring the flag.
    if config.mirror.interval_ms == 0 {
        config.mirror.interval_ms = 1_000;
    }
    config.validate()?;

    let mut mirror = Mirror::new(&config, Box::new(OsFileService), None)?;
    match mirror.check()? {
        TickOutcome::Completed(report) => {
            println!(
                "synced {} -> {}: added={} updated={} deleted={} missing={} extra={} failures={} in {}ms",
                config.mirror.origin.display(),
                config.mirror.target.display(),
                report.added,
                report.updated,
                report.deleted,
                report.missing,
                report.extra,
                report.failures,
                report.duration.as_millis(),
            );
            Ok(())
        }
        TickOutcome::Skipped => Ok(()),
    }
}
