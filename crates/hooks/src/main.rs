//! Hook entry point for the monitor charm.
//!
//! Install one symlink per hook pointing at this binary; the hook to run is
//! taken from the name the binary was invoked as, or from `--hook`.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use cephmon_controller::{ControllerOptions, CycleOutcome, Error, EventRouter, HookEvent};
use cephmon_primitives::PrimitiveError;
use cephmon_primitives_host::{HostDisks, HostOptions, HostPrimitives};
use cephmon_primitives_mock::{MockDisks, MockPrimitives};
use cephmon_relation::RelationError;
use cephmon_relation_juju::{JujuTransport, LogLevel};
use cephmon_relation_mock::MockTransport;
use clap::Parser;
use tracing::{error, info};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Daemon admin socket directory
    #[arg(long, default_value = "/var/run/ceph", env = "CEPHMON_ADMIN_SOCKET_DIR")]
    admin_socket_dir: PathBuf,

    /// Rendered daemon configuration
    #[arg(long, default_value = "/etc/ceph/ceph.conf", env = "CEPHMON_CEPH_CONF")]
    ceph_conf: PathBuf,

    /// Mount point unmounted before inspecting devices
    #[arg(long, default_value = "/mnt", env = "CEPHMON_CONFLICTING_MOUNT")]
    conflicting_mount: PathBuf,

    /// Directory a fixture run writes under; a fresh temporary directory when unset
    #[arg(long, env = "CEPHMON_DRY_RUN_ROOT", requires = "fixture")]
    dry_run_root: Option<PathBuf>,

    /// Run against a JSON fixture instead of the hook tools; primitives are recorded, not run
    #[arg(long, env = "CEPHMON_FIXTURE")]
    fixture: Option<PathBuf>,

    /// Hook to run (defaults to the invoked binary name)
    #[arg(long, env = "CEPHMON_HOOK")]
    hook: Option<String>,

    /// Directory for the transient monitor keyring
    #[arg(long, default_value = "/var/lib/ceph/tmp", env = "CEPHMON_KEYRING_DIR")]
    keyring_dir: PathBuf,

    /// Monitor data root holding the bootstrap marker
    #[arg(long, default_value = "/var/lib/ceph/mon", env = "CEPHMON_MON_DATA_ROOT")]
    mon_data_root: PathBuf,

    /// Kernel mount table
    #[arg(long, default_value = "/proc/mounts", env = "CEPHMON_MOUNTS")]
    mounts: PathBuf,

    /// Deadline for each external command, in seconds
    #[arg(long, default_value_t = 300, env = "CEPHMON_PRIMITIVE_TIMEOUT_SECS")]
    primitive_timeout_secs: u64,

    /// Interval between quorum polls, in seconds
    #[arg(long, default_value_t = 3, env = "CEPHMON_QUORUM_POLL_SECS")]
    quorum_poll_secs: u64,

    /// How long to wait for quorum after bootstrap, in seconds
    #[arg(long, default_value_t = 300, env = "CEPHMON_QUORUM_WAIT_SECS")]
    quorum_wait_secs: u64,
}

impl Args {
    fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            ceph_conf_path: self.ceph_conf.clone(),
            conflicting_mount: self.conflicting_mount.clone(),
            keyring_dir: self.keyring_dir.clone(),
            mon_data_root: self.mon_data_root.clone(),
            quorum_poll: Duration::from_secs(self.quorum_poll_secs),
            quorum_wait: Duration::from_secs(self.quorum_wait_secs),
        }
    }

    /// Controller options with every path moved under `root`.
    fn dry_run_options(&self, root: &Path) -> ControllerOptions {
        let options = self.controller_options();

        ControllerOptions {
            ceph_conf_path: rebase(root, &options.ceph_conf_path),
            conflicting_mount: rebase(root, &options.conflicting_mount),
            keyring_dir: rebase(root, &options.keyring_dir),
            mon_data_root: rebase(root, &options.mon_data_root),
            ..options
        }
    }

    fn host_options(&self) -> HostOptions {
        HostOptions {
            admin_socket_dir: self.admin_socket_dir.clone(),
            mon_data_root: self.mon_data_root.clone(),
            mounts_path: self.mounts.clone(),
            timeout: Duration::from_secs(self.primitive_timeout_secs),
        }
    }
}

fn rebase(root: &Path, path: &Path) -> PathBuf {
    root.join(path.strip_prefix("/").unwrap_or(path))
}

/// Hook name from the path the binary was invoked through.
fn invoked_as(argv0: Option<OsString>) -> Option<String> {
    let argv0 = argv0?;

    Path::new(&argv0)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Logs how the cycle ended and maps it to the process exit code.
fn report<RE, PE>(event: HookEvent, result: &Result<CycleOutcome, Error<RE, PE>>) -> ExitCode
where
    RE: RelationError,
    PE: PrimitiveError,
{
    match result {
        Ok(outcome) => {
            info!("{event} finished: {outcome:?}");
            ExitCode::SUCCESS
        }
        Err(e) if e.is_fatal() => {
            error!(severity = "CRITICAL", "{e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{event} failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_juju(event: HookEvent, args: &Args) -> ExitCode {
    let transport = JujuTransport::new();
    let host = args.host_options();
    let router = EventRouter::new(
        transport.clone(),
        HostPrimitives::new(host.clone()),
        HostDisks::new(&host),
        args.controller_options(),
    );

    let result = router.dispatch(event).await;
    if let Err(e) = &result {
        if e.is_fatal() {
            transport.juju_log(LogLevel::Critical, &e.to_string()).await;
        }
    }

    report(event, &result)
}

async fn run_fixture(event: HookEvent, args: &Args, fixture: &Path) -> ExitCode {
    let transport = match MockTransport::from_fixture_file(fixture) {
        Ok(transport) => transport,
        Err(e) => {
            error!("failed to load fixture {}: {e}", fixture.display());
            return ExitCode::FAILURE;
        }
    };
    let scratch = match tempfile::tempdir() {
        Ok(scratch) => scratch,
        Err(e) => {
            error!("failed to create dry run directory: {e}");
            return ExitCode::FAILURE;
        }
    };
    let root = args.dry_run_root.as_deref().unwrap_or_else(|| scratch.path());
    info!("dry run writing under {}", root.display());

    let primitives = MockPrimitives::new();
    let router = EventRouter::new(
        transport.clone(),
        primitives.clone(),
        MockDisks::new(),
        args.dry_run_options(root),
    );

    let result = router.dispatch(event).await;

    for invocation in primitives.invocations() {
        info!("would invoke {invocation:?}");
    }

    let published: BTreeMap<String, _> = transport
        .published()
        .into_iter()
        .map(|(relation_id, settings)| (relation_id.to_string(), settings))
        .collect();
    match serde_json::to_string_pretty(&published) {
        Ok(json) => println!("{json}"),
        Err(e) => error!("failed to serialize published settings: {e}"),
    }

    report(event, &result)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let Some(hook) = args
        .hook
        .clone()
        .or_else(|| invoked_as(std::env::args_os().next()))
    else {
        error!("cannot determine which hook to run");
        return ExitCode::FAILURE;
    };

    let event = match hook.parse::<HookEvent>() {
        Ok(event) => event,
        Err(e) => {
            info!("{e}; nothing to do");
            return ExitCode::SUCCESS;
        }
    };

    match &args.fixture {
        Some(fixture) => run_fixture(event, &args, fixture).await,
        None => run_juju(event, &args).await,
    }
}
