//! Delayed approve/deny decision for install-confirmation requests.

use mockinstall_common::ipc::ConfirmationSignal;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

/// Delay between a confirmation request and its status signal.
const DECISION_DELAY: Duration = Duration::from_secs(1);

/// The decision returned for every confirmation request, fixed at startup.
#[derive(Debug, Clone)]
pub struct Decision {
    pub confirmed: bool,
    pub error_code: i32,
    pub details: String,
}

/// The confirmation test double. No mutable properties; each request
/// schedules exactly one `ConfirmationStatus` emission.
pub struct Confirmation {
    decision: Decision,
    signals: broadcast::Sender<ConfirmationSignal>,
}

impl Confirmation {
    pub fn new(decision: Decision) -> Self {
        let (signals, _) = broadcast::channel(64);
        Self { decision, signals }
    }

    /// New receiver for the confirmation signal stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ConfirmationSignal> {
        self.signals.subscribe()
    }

    /// Records the request and schedules the decision signal. Returns
    /// immediately; the signal fires once after the fixed delay and is never
    /// re-fired.
    pub fn confirm_installation_request(&self, action_id: &str, version: &str) {
        info!("Confirmation requested for version {version}");

        let decision = self.decision.clone();
        let signals = self.signals.clone();
        let action_id = action_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(DECISION_DELAY).await;
            let _ = signals.send(ConfirmationSignal::ConfirmationStatus {
                action_id,
                confirmed: decision.confirmed,
                error_code: decision.error_code,
                details: decision.details,
            });
        });
    }
}
