use crate::item::ItemId;
use crate::solver::ConstraintId;
use thiserror::Error;

/// The main error type for the vellum crate.
///
/// Every fallible operation in the engine reports through this enum. Errors
/// are rejections: unless a variant says otherwise, the operation that
/// produced it had no side effect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VellumError {
    /// The solver exhausted its iteration budget (or a constraint kept
    /// oscillating past its re-enqueue cap). Carries every constraint that
    /// was still dirty, queued or suppressed when solving halted. Variable
    /// state is left as last written; the caller may re-invoke `solve`.
    #[error("unresolvable constraints after budget exhaustion: {0:?}")]
    UnresolvableConstraints(Vec<ConstraintId>),

    /// `connect` was called for a handle that already has a connection.
    /// The existing record is untouched; disconnect first.
    #[error("handle {handle} of item {item:?} is already connected")]
    DuplicateConnection { item: ItemId, handle: usize },

    /// `remove_constraint` was called with an id the solver does not know.
    #[error("constraint is not registered with the solver")]
    UnknownConstraint,

    /// An item id that is not (or no longer) part of the canvas.
    #[error("item is not part of the canvas")]
    UnknownItem,

    /// A handle index out of range for the item it was used with.
    #[error("handle index {0} is out of range")]
    UnknownHandle(usize),

    /// A port index out of range for the item it was used with.
    #[error("port index {0} is out of range")]
    UnknownPort(usize),

    /// `update()` was entered while an update was already running,
    /// typically from an observer callback.
    #[error("update() entered while an update is already running")]
    ReentrantUpdate,

    /// A degenerate matrix could not be inverted.
    #[error("matrix is singular and cannot be inverted")]
    SingularMatrix,

    /// The equation constraint failed to bracket a root within its
    /// expansion cap. The constraint stays dirty and is reported through
    /// [`VellumError::UnresolvableConstraints`].
    #[error("equation constraint failed to bracket a root")]
    NonConvergentEquation,

    /// A reparent that would make an item its own ancestor.
    #[error("reparent would create a cycle")]
    CyclicReparent,
}
