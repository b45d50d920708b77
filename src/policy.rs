/// Swallow-or-propagate decisions for adapter failures
///
/// Teardown steps that are expected to fail on a cold start are swallowed and
/// logged. Everything that would leave the gadget or mount state unknown is
/// propagated so the supervisor restarts the process.

use crate::error::Result;

/// Adapter operations that can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Startup withdraw of whatever a previous run left exposed
    ResetWithdraw,
    /// Startup unmount of the local mount point
    ResetUnmount,
    Expose,
    Withdraw,
    Repair,
    Mount,
    Unmount,
    Provision,
    CreateDirectory,
    /// Lock marker create/remove and backup directory counting
    CopyBookkeeping,
    /// Moving a single captured entry into the backup directory
    MoveEntry,
    JournalWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Log and carry on
    Swallow,
    /// Stop the rotation
    Propagate,
}

/// The decision table
pub fn disposition(operation: Operation) -> Disposition {
    match operation {
        Operation::ResetWithdraw
        | Operation::ResetUnmount
        | Operation::Repair
        | Operation::Unmount
        | Operation::MoveEntry
        | Operation::JournalWrite => Disposition::Swallow,
        Operation::Expose
        | Operation::Withdraw
        | Operation::Mount
        | Operation::Provision
        | Operation::CreateDirectory
        | Operation::CopyBookkeeping => Disposition::Propagate,
    }
}

/// Apply the decision table to a result.
///
/// Returns `Ok(Some(value))` on success, `Ok(None)` for a swallowed failure
/// and `Err` for a propagated one.
pub fn settle<T>(operation: Operation, result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) => match disposition(operation) {
            Disposition::Swallow => {
                tracing::warn!(?operation, error = %err, "ignoring error");
                Ok(None)
            }
            Disposition::Propagate => {
                tracing::error!(?operation, error = %err, "fatal adapter error");
                Err(err)
            }
        },
    }
}

/// [`settle`] for operations whose failures always propagate
pub fn require<T>(operation: Operation, result: Result<T>) -> Result<T> {
    debug_assert_eq!(disposition(operation), Disposition::Propagate);
    match settle(operation, result)? {
        Some(value) => Ok(value),
        None => unreachable!("{:?} failures are never swallowed", operation),
    }
}
