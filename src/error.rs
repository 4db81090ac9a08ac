use std::time::Duration;
use thiserror::Error;

/// Failure of a single debug-link operation.
///
/// Produced by [`DebugTransport`](crate::transport::DebugTransport)
/// implementations. This layer never retries a transport failure; retry policy
/// belongs to the transport itself.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A wire-level operation failed.
    #[error("wire-level failure during {operation}")]
    Wire {
        /// The operation that failed, e.g. `"read_register"`.
        operation: &'static str,
        /// The underlying driver error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The target did not respond within the transport-level timeout.
    #[error("target did not respond within the transport timeout")]
    NoResponse,

    /// Any other transport failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors of the classic ARM core layer.
#[derive(Debug, Error)]
pub enum ArmError {
    /// A value was used as a processor mode that is not one of the eight
    /// PSR mode encodings.
    #[error("{0:#04x} is not a valid ARM processor mode")]
    InvalidMode(u32),

    /// A mode index outside `0..=7` was used.
    #[error("{0} is not a valid mode index (expected 0..=7)")]
    InvalidIndex(usize),

    /// A logical register number outside `0..=16` was used.
    #[error("register number {0} is not valid for a classic ARM core")]
    InvalidRegisterNumber(u16),

    /// An algorithm run was requested in an instruction-set state that cannot
    /// execute injected code.
    #[error("cannot execute injected code in {0} state")]
    UnsupportedState(crate::core::mode::ArmCoreState),

    /// A register or memory access over the debug link failed.
    #[error("debug transport error")]
    Transport(#[from] TransportError),

    /// Snapshotting registers before an algorithm run failed. No target state
    /// has been modified.
    #[error("failed to snapshot registers before algorithm execution")]
    PrepareFailed(#[source] Box<ArmError>),

    /// Arming the exit breakpoint failed. Registers written during install
    /// have been rolled back.
    #[error("failed to arm the exit breakpoint at {address:#010x}")]
    BreakpointSetupFailed {
        /// The exit address the breakpoint was meant for.
        address: u32,
        /// The underlying failure.
        #[source]
        source: Box<ArmError>,
    },

    /// The target halted somewhere other than the exit point during an
    /// algorithm run.
    #[error("target halted at {address:#010x} instead of the expected exit point")]
    TargetFault {
        /// Program counter at the unexpected halt.
        address: u32,
    },

    /// The algorithm did not reach its exit point in time. The target has
    /// been forcibly halted and its state restored.
    #[error("algorithm did not reach its exit point within {timeout:?}")]
    ExecutionTimeout {
        /// The caller-supplied run timeout.
        timeout: Duration,
    },

    /// Restoring target state after an algorithm run failed. Every restore was
    /// still attempted; the core may be left inconsistent.
    #[error("failed to restore target state after algorithm execution ({failures} operation(s) failed)")]
    CleanupFailed {
        /// How many restore operations failed.
        failures: usize,
        /// The first failure encountered; the rest are logged.
        #[source]
        source: Box<ArmError>,
    },
}
