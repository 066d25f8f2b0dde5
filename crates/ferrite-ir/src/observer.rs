//! Change reporting for graph mutations.
//!
//! Every mutation that can affect an ancestor's indices reports back through
//! a chain of parent notifications: the mutating node captures its old state,
//! applies the change, then dispatches to its parent, which repairs local
//! indices and re-raises a corresponding event to *its* parent. The parent
//! handlers live on [`Context`](crate::Context) next to the container they
//! maintain (`section::*` for interval and block indices, `module::*` for
//! section and symbol indices, `ir::*` for module ordering).

/// Outcome of a mutation or of a parent notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    /// The change was applied and all affected indices were updated.
    Accepted,
    /// The operation had no effect, e.g. removing a node that is not a child
    /// of the receiver or storing a value equal to the current one.
    NoChange,
    /// The parent could not repair its invariants under the change.
    ///
    /// Reserved: no current parent rejects. Callers that depend on success
    /// assert non-rejection.
    Rejected,
}

impl ChangeStatus {
    /// Whether the change took effect.
    pub fn is_accepted(self) -> bool {
        self == ChangeStatus::Accepted
    }
}

/// Assert that a notification was not rejected.
///
/// Rejection recovery is unimplemented; a rejecting parent is a contract
/// violation on the debug path.
macro_rules! assert_not_rejected {
    ($status:expr) => {
        debug_assert!(
            $status != $crate::ChangeStatus::Rejected,
            "recovering from a rejected change is not implemented"
        )
    };
}

pub(crate) use assert_not_rejected;
