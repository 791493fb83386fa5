//! Error types for beacon-protocols.

use thiserror::Error;

use crate::interfaces::{CommissionError, SendError};

/// Result type for beacon-protocols operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised inside the engine and the coordinator.
///
/// None of them is fatal: the engine turns them into log lines and drops,
/// the coordinator into a loop-continue. Malformed payloads and full tables
/// are not errors here; the engine reports them in its [`HandleOutcome`].
///
/// [`HandleOutcome`]: crate::engine::HandleOutcome
#[derive(Debug, Error)]
pub enum Error {
    /// The transport refused a send.
    #[error(transparent)]
    Send(#[from] SendError),

    /// The commissioning collaborator failed.
    #[error("commissioning: {0}")]
    Commission(#[from] CommissionError),

    /// No free address is left in the shared-prefix space.
    #[error("no free node address under the shared prefix")]
    AddressSpaceExhausted,

    /// A bounded wait expired.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}
