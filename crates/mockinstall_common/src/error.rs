//! Error kinds surfaced by the installer daemon.

/// Failure modes of an `InstallBundle` invocation.
///
/// None of these are retried internally: configuration and concurrency errors
/// are returned synchronously before anything is emitted, verification
/// failures surface exactly once through `Completed(1)` plus `LastError`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InstallError {
    /// The computed bundle digest differs from the reference digest. Fatal,
    /// the install is never scheduled.
    #[error("checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch { expected: String, computed: String },

    /// Network or file I/O failed while computing the digest, other than the
    /// benign range-exhaustion signal.
    #[error("transfer error: {0}")]
    Transfer(String),

    /// Contradictory or incomplete install arguments.
    #[error("configuration error: {0}")]
    Config(String),

    /// An installation is already in progress on this instance. Overlapping
    /// invocations are rejected, never queued.
    #[error("installation already in progress")]
    Busy,
}
