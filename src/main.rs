//! nimbus - bring a local, ephemeral Kubernetes environment from zero to
//! applications-healthy with a single command.

use clap::Parser;
use nimbus::cli::{Cli, Commands};
use nimbus::{commands, NimbusError};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.command.verbose());

    let result: anyhow::Result<()> = match cli.command {
        Commands::Bootstrap(args) => commands::bootstrap::run(args).map_err(Into::into),
        Commands::Cluster(args) => commands::cluster::run(args).map_err(Into::into),
        Commands::Chart(args) => commands::chart::run(args).map_err(Into::into),
        Commands::Schema(args) => commands::schema::run(args),
        Commands::Completions(args) => commands::completions::run(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

/// Maps a top-level error back to the taxonomy's exit code (spec §6),
/// falling back to the generic "unspecified failure" code for errors that
/// never passed through [`NimbusError`] (e.g. an I/O error from `--output`).
fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<NimbusError>()
        .map(|nimbus_err| nimbus_err.exit_code() as u8)
        .unwrap_or(1)
}

/// Honors `LOG_LEVEL` first (spec §6's `error|warn|info|debug|trace`), then
/// `RUST_LOG` for `tracing_subscriber`'s own filter syntax; `--verbose` raises
/// the default floor to `debug` when neither variable sets an explicit
/// filter.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = std::env::var("LOG_LEVEL")
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .and_then(|level| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
