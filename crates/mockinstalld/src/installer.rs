//! Install state machine.
//!
//! One `Installer` per process: idle until an `InstallBundle` call passes
//! verification, then an installing simulation that walks a fixed phase list
//! at a 100 ms cadence and terminates with exactly one `Completed` signal.
//! All mutation happens on the daemon's single-threaded runtime; every state
//! change is notified synchronously before the setter returns.

use mockinstall_common::ipc::{InstallerProperties, InstallerSignal, Progress, PropertyUpdate};
use mockinstall_common::mtls::MtlsPaths;
use mockinstall_common::{AuthContext, InstallError, INSTALLER_INTERFACE};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::verifier;

const OPERATION_IDLE: &str = "idle";
const OPERATION_INSTALLING: &str = "installing";

/// Placeholder value for the static capability properties.
const NOT_IMPLEMENTED: &str = "not implemented";

/// Delay between InstallBundle returning and the simulation starting.
const SCHEDULING_DELAY: Duration = Duration::from_secs(1);

/// Delay between two phase-progress updates.
const PHASE_DELAY: Duration = Duration::from_millis(100);

/// Fixed phase names of the simulated installation, final phase excluded.
const PHASES: [&str; 17] = [
    "Installing",
    "Determining slot states",
    "Determining slot states done.",
    "Checking bundle",
    "Verifying signature",
    "Verifying signature done.",
    "Checking bundle done.",
    "Loading manifest file",
    "Loading manifest file done.",
    "Determining target install group",
    "Determining target install group done.",
    "Updating slots",
    "Checking slot rootfs.1",
    "Checking slot rootfs.1 done.",
    "Copying image to rootfs.1",
    "Copying image to rootfs.1 done.",
    "Updating slots done.",
];

#[derive(Debug)]
struct State {
    operation: String,
    progress: Progress,
    last_error: String,
    /// Latched for the whole span of one accepted invocation, verification
    /// included. Overlapping invocations are rejected while it is set.
    busy: bool,
}

/// The installer test double: reference digest, fixed completion code, and
/// the mutable idle/installing state.
pub struct Installer {
    expected_digest: String,
    completed_code: i32,
    mtls: Option<MtlsPaths>,
    transfer_timeout: Duration,
    state: Mutex<State>,
    signals: broadcast::Sender<InstallerSignal>,
}

impl Installer {
    /// Computes the reference digest from `bundle` and constructs the
    /// installer around it.
    pub fn open(
        bundle: &Path,
        completed_code: i32,
        mtls: Option<MtlsPaths>,
        transfer_timeout: Duration,
    ) -> Result<Self, InstallError> {
        let expected_digest = verifier::file_digest(bundle)?;
        info!(bundle = %bundle.display(), %expected_digest, "reference bundle digest computed");

        let (signals, _) = broadcast::channel(256);
        Ok(Self {
            expected_digest,
            completed_code,
            mtls,
            transfer_timeout,
            state: Mutex::new(State {
                operation: OPERATION_IDLE.to_string(),
                progress: Progress::idle(),
                last_error: String::new(),
                busy: false,
            }),
            signals,
        })
    }

    /// New receiver for the installer's signal stream.
    pub fn subscribe(&self) -> broadcast::Receiver<InstallerSignal> {
        self.signals.subscribe()
    }

    /// Snapshot of all properties, static placeholders included.
    pub fn properties(&self) -> InstallerProperties {
        let state = self.state.lock().unwrap();
        InstallerProperties {
            operation: state.operation.clone(),
            progress: state.progress.clone(),
            last_error: state.last_error.clone(),
            compatible: NOT_IMPLEMENTED.to_string(),
            variant: NOT_IMPLEMENTED.to_string(),
            boot_slot: NOT_IMPLEMENTED.to_string(),
        }
    }

    /// Verifies `source` against the reference digest and, on success,
    /// schedules the install simulation. Returns as soon as verification
    /// resolves; it never waits for the simulation.
    ///
    /// Configuration errors and concurrent-invocation rejections return
    /// without emitting anything. A verification failure emits `Completed(1)`
    /// plus the error properties and is also returned to the caller.
    pub async fn install_bundle(
        self: Arc<Self>,
        source: &str,
        args: &HashMap<String, serde_json::Value>,
    ) -> Result<(), InstallError> {
        info!("installing {source}");

        // Auth args only matter for remote sources; a local install ignores
        // them entirely.
        let auth = if verifier::is_remote(source) {
            let auth = AuthContext::from_args(args, self.mtls.as_ref())?;
            if auth == AuthContext::None {
                return Err(InstallError::Config(
                    "remote source requires http-headers or tls-cert/tls-key".into(),
                ));
            }
            auth
        } else {
            AuthContext::None
        };

        {
            let mut state = self.state.lock().unwrap();
            if state.busy {
                warn!("rejecting overlapping InstallBundle invocation");
                return Err(InstallError::Busy);
            }
            state.busy = true;
        }

        if let Err(e) = verifier::verify(source, &auth, &self.expected_digest, self.transfer_timeout).await
        {
            warn!(error = %e, "bundle verification failed");
            let _ = self.signals.send(InstallerSignal::Completed { code: 1 });
            self.set_last_error(format!("Installation error: {e}"));
            self.set_operation(OPERATION_IDLE);
            self.state.lock().unwrap().busy = false;
            return Err(e);
        }

        let installer = Arc::clone(&self);
        tokio::spawn(async move {
            installer.run_simulation().await;
        });

        Ok(())
    }

    /// Walks the phase list and fires the terminal signal. Runs to completion
    /// once scheduled; there is no cancellation path.
    async fn run_simulation(&self) {
        tokio::time::sleep(SCHEDULING_DELAY).await;

        self.set_operation(OPERATION_INSTALLING);

        let final_phase = if self.completed_code != 0 {
            "Install failed."
        } else {
            "Installing done."
        };
        let phases = PHASES.iter().copied().chain(std::iter::once(final_phase));
        let total = (PHASES.len() + 1) as i32;

        for (index, phase) in phases.enumerate() {
            self.set_progress(Progress {
                percent: (index as i32 + 1) * 100 / total,
                message: phase.to_string(),
                depth: 1,
            });
            tokio::time::sleep(PHASE_DELAY).await;
        }

        info!(code = self.completed_code, "simulated installation completed");
        let _ = self.signals.send(InstallerSignal::Completed {
            code: self.completed_code,
        });

        if self.completed_code != 0 {
            self.set_last_error("Installation error".to_string());
        }

        self.set_operation(OPERATION_IDLE);
        self.state.lock().unwrap().busy = false;
    }

    fn set_operation(&self, value: &str) {
        let mut state = self.state.lock().unwrap();
        state.operation = value.to_string();
        let _ = self.signals.send(InstallerSignal::PropertiesChanged {
            interface: INSTALLER_INTERFACE.to_string(),
            update: PropertyUpdate::Operation(state.operation.clone()),
        });
    }

    fn set_progress(&self, value: Progress) {
        let mut state = self.state.lock().unwrap();
        state.progress = value.clone();
        let _ = self.signals.send(InstallerSignal::PropertiesChanged {
            interface: INSTALLER_INTERFACE.to_string(),
            update: PropertyUpdate::Progress(value),
        });
    }

    fn set_last_error(&self, value: String) {
        let mut state = self.state.lock().unwrap();
        state.last_error = value.clone();
        let _ = self.signals.send(InstallerSignal::PropertiesChanged {
            interface: INSTALLER_INTERFACE.to_string(),
            update: PropertyUpdate::LastError(value),
        });
    }
}
