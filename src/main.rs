//! Portcullis CLI entry point.
//!
//! Provides `watch`, `register`, and `status` subcommands: run the admission
//! monitor, register a local image in the trust policy, or print a summary of
//! the policy and recent audit events.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use portcullis::audit::AuditLog;
use portcullis::config::RuntimePaths;
use portcullis::enforce::EnforceMode;
use portcullis::monitor::Monitor;
use portcullis::policy::{PolicyAdvisory, PolicyStore};
use portcullis::runtime::{ContainerRuntime, DockerRuntime};
use portcullis::status::StatusReport;
use portcullis::{logging, register};

/// Portcullis — image-digest admission control for Docker containers.
#[derive(Parser)]
#[command(name = "portcullis", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Watch container lifecycle events and enforce the trust policy.
    Watch {
        /// Safer enforcement: stop blocked containers instead of removing them.
        #[arg(long)]
        safe_mode: bool,

        /// Compatibility mode: allow images that are not in the policy.
        #[arg(long)]
        allow_unregistered: bool,
    },
    /// Register a local image's digest and layer hashes in the policy.
    Register {
        /// Image name or tag to register (must exist locally).
        image: String,
    },
    /// Show registered images and recent audit events.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Watch {
            safe_mode,
            allow_unregistered,
        } => handle_watch(safe_mode, allow_unregistered).await,
        Command::Register { image } => handle_register(&image).await,
        Command::Status => handle_status(),
    }
}

/// Run the admission monitor until the operator interrupts it.
async fn handle_watch(safe_mode: bool, allow_unregistered: bool) -> anyhow::Result<()> {
    let paths = RuntimePaths::resolve()?;
    paths.ensure_dirs()?;
    let _logging_guard = logging::init_daemon(&paths.logs_dir)?;

    // Startup self-check: an unreachable daemon is the one fatal condition.
    let runtime = DockerRuntime::connect().context("Docker daemon is not reachable")?;
    runtime
        .ping()
        .await
        .context("Docker daemon is not reachable")?;

    let (policy, advisories) = PolicyStore::load(&paths.policy_file);
    for advisory in &advisories {
        match advisory {
            PolicyAdvisory::Missing => warn!(
                path = %paths.policy_file.display(),
                "policy file not found; monitoring continues but everything \
                 blocks until images are registered"
            ),
            PolicyAdvisory::Corrupt(reason) => warn!(
                path = %paths.policy_file.display(),
                reason = %reason,
                "failed to read policy file; proceeding with empty policy"
            ),
            PolicyAdvisory::WeakPermissions(mode) => warn!(
                path = %paths.policy_file.display(),
                mode = %format_args!("{mode:o}"),
                "policy file permissions are too open; recommended 600"
            ),
        }
    }

    let mode = if safe_mode {
        EnforceMode::Safe
    } else {
        EnforceMode::Strict
    };

    if policy.is_empty() && !allow_unregistered {
        warn!("policy is empty and strict mode is active: all images will be blocked");
    }
    if safe_mode {
        info!("safe mode enabled: blocked containers are stopped, not removed");
    }
    if allow_unregistered {
        warn!("--allow-unregistered enabled: unregistered images will be allowed");
    }

    let audit = AuditLog::open(&paths.audit_log)
        .with_context(|| format!("failed to open {}", paths.audit_log.display()))?;

    info!("monitoring container creation events (Ctrl+C to exit)");

    let events = runtime.events();
    let mut monitor = Monitor::new(runtime.clone(), policy, audit, mode, allow_unregistered);
    monitor.run(events).await;

    Ok(())
}

/// Register one local image in the trust policy.
async fn handle_register(image: &str) -> anyhow::Result<()> {
    logging::init_cli();

    let paths = RuntimePaths::resolve()?;
    paths.ensure_dirs()?;

    let runtime = DockerRuntime::connect().context("Docker daemon is not reachable")?;
    runtime
        .ping()
        .await
        .context("Docker daemon is not reachable")?;

    let registered = register::register_image(runtime.docker(), &paths, image).await?;
    println!(
        "Image '{image}' registered with digest {} ({} layers)",
        registered.digest, registered.layer_count
    );
    Ok(())
}

/// Print the status summary.
fn handle_status() -> anyhow::Result<()> {
    logging::init_cli();

    let paths = RuntimePaths::resolve()?;
    let report = StatusReport::build(&paths.policy_file, &paths.audit_log);
    print!("{}", report.render());
    Ok(())
}
