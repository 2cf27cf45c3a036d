// ABOUTME: CLI entry point for the migrate test driver
// ABOUTME: Parses arguments, wires the file store and HTTP control-plane, and runs the abort sequence

use anyhow::Context;
use clap::Parser;
use ext_migrate::commands::{resolve_source_controller, Migrator, ReadinessPolicy};
use ext_migrate::remote::{DialOptions, HttpControlPlane};
use ext_migrate::store::FileStore;
use ext_migrate::MigrateArgs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "migrate")]
#[command(
    about = "Start an externally controlled model migration, then force it through ABORT and ABORTDONE",
    long_about = None
)]
#[command(
    override_usage = "migrate [OPTIONS] <model-name> <target-controller-name> <machine-tag> <machine-password> <machine-nonce>"
)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log: String,
    /// Source controller (defaults to the store's current controller)
    #[arg(short = 'c', long = "controller")]
    controller: Option<String>,
    /// Directory holding controllers.json, accounts.json and models.json
    #[arg(long = "store-dir", env = "EXT_MIGRATE_STORE_DIR")]
    store_dir: Option<PathBuf>,
    /// Seconds to wait after initiating before connecting to the coordinator
    #[arg(long = "settle-delay", default_value_t = 5)]
    settle_delay: u64,
    /// Seconds to wait for the coordinator to report the migration (0 disables)
    #[arg(long = "ready-timeout", default_value_t = 60)]
    ready_timeout: u64,
    /// Per-request timeout in seconds
    #[arg(long = "request-timeout", default_value_t = 30)]
    request_timeout: u64,
    /// <model-name> <target-controller-name> <machine-tag> <machine-password> <machine-nonce>
    #[arg(value_name = "ARGS", num_args = 0.., allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log. Logs go to stderr so stdout only carries the migration ID.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let args = MigrateArgs::parse(&cli.args[..])?;

    let store = match cli.store_dir {
        Some(dir) => FileStore::new(dir),
        None => FileStore::default_location()?,
    };
    tracing::debug!("Using client store at {}", store.dir().display());

    let source_controller = resolve_source_controller(&store, cli.controller.as_deref())?;

    let control_plane = HttpControlPlane::new(DialOptions {
        request_timeout: Duration::from_secs(cli.request_timeout),
    });
    let readiness = ReadinessPolicy {
        settle_delay: Duration::from_secs(cli.settle_delay),
        timeout: Duration::from_secs(cli.ready_timeout),
        ..ReadinessPolicy::default()
    };
    let migrator = Migrator::new(&store, &control_plane).with_readiness(readiness);

    let migration_id = tokio::select! {
        result = migrator.run(&args, &source_controller) => {
            result.with_context(|| format!("migrating {:?} to {:?}", args.model, args.target_controller))?
        }
        // A handler that fails to install disables this arm; the run carries on.
        Ok(()) = tokio::signal::ctrl_c() => {
            anyhow::bail!("interrupted");
        }
    };

    println!("{}", migration_id);
    Ok(())
}
