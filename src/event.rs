use crate::item::ItemId;
use crate::matrix::Matrix;
use crate::solver::ConstraintId;
use crate::solver::variable::VarId;

/// Boolean properties of a handle that are tracked for undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleFlag {
    Connectable,
    Movable,
    Visible,
}

/// Boolean properties of a polyline that are tracked for undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFlag {
    Orthogonal,
    Horizontal,
}

/// Conditions the engine reports without failing the surrounding operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// `solve()` hit its per-pass constraint-solve budget.
    SolveBudgetExceeded,
    /// A constraint hit its per-pass re-enqueue cap and further enqueues
    /// were suppressed.
    RequeueSuppressed,
    /// A projection write was dropped because the item matrix could not be
    /// inverted.
    SingularMatrix,
    /// An equation constraint failed to bracket a root.
    NonConvergentEquation,
}

/// A mutation of engine state, emitted to observers *before* the change
/// commits so they can capture prior state.
///
/// Events are data-only: ids and values, never live references. That keeps
/// them `Clone + PartialEq`, which is what a host needs to record them into
/// an undo log and replay them later through
/// [`Canvas::apply`](crate::canvas::Canvas::apply).
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    VariableSet {
        var: VarId,
        value: f64,
        old: f64,
    },
    MatrixSet {
        item: ItemId,
        matrix: Matrix,
        old: Matrix,
    },
    ItemAdded {
        item: ItemId,
        parent: Option<ItemId>,
        index: usize,
    },
    ItemRemoved {
        item: ItemId,
        parent: Option<ItemId>,
        index: usize,
    },
    ItemReparented {
        item: ItemId,
        parent: Option<ItemId>,
        index: usize,
        old_parent: Option<ItemId>,
        old_index: usize,
    },
    HandleConnected {
        item: ItemId,
        handle: usize,
        connected: ItemId,
        port: usize,
    },
    HandleDisconnected {
        item: ItemId,
        handle: usize,
        connected: ItemId,
        port: usize,
    },
    HandleFlagSet {
        item: ItemId,
        handle: usize,
        flag: HandleFlag,
        value: bool,
        old: bool,
    },
    LineFlagSet {
        item: ItemId,
        flag: LineFlag,
        value: bool,
        old: bool,
    },
    /// A reported-but-not-fatal condition; see [`DiagnosticKind`].
    Diagnostic {
        kind: DiagnosticKind,
        constraint: Option<ConstraintId>,
        item: Option<ItemId>,
    },
}

impl Event {
    /// The reverter: maps an event to the event that undoes it.
    ///
    /// Assignments swap old and new, `add` maps to `remove`, a reparent
    /// maps to a reparent back to the previous parent and index, and a
    /// connect maps to a disconnect. `ItemRemoved` has no inverse (a boxed
    /// item cannot travel inside a value event) and diagnostics are not
    /// mutations, so both return `None`.
    pub fn inverse(&self) -> Option<Event> {
        match *self {
            Event::VariableSet { var, value, old } => Some(Event::VariableSet {
                var,
                value: old,
                old: value,
            }),
            Event::MatrixSet { item, matrix, old } => Some(Event::MatrixSet {
                item,
                matrix: old,
                old: matrix,
            }),
            Event::ItemAdded {
                item,
                parent,
                index,
            } => Some(Event::ItemRemoved {
                item,
                parent,
                index,
            }),
            Event::ItemRemoved { .. } => None,
            Event::ItemReparented {
                item,
                parent,
                index,
                old_parent,
                old_index,
            } => Some(Event::ItemReparented {
                item,
                parent: old_parent,
                index: old_index,
                old_parent: parent,
                old_index: index,
            }),
            Event::HandleConnected {
                item,
                handle,
                connected,
                port,
            } => Some(Event::HandleDisconnected {
                item,
                handle,
                connected,
                port,
            }),
            Event::HandleDisconnected {
                item,
                handle,
                connected,
                port,
            } => Some(Event::HandleConnected {
                item,
                handle,
                connected,
                port,
            }),
            Event::HandleFlagSet {
                item,
                handle,
                flag,
                value,
                old,
            } => Some(Event::HandleFlagSet {
                item,
                handle,
                flag,
                value: old,
                old: value,
            }),
            Event::LineFlagSet {
                item,
                flag,
                value,
                old,
            } => Some(Event::LineFlagSet {
                item,
                flag,
                value: old,
                old: value,
            }),
            Event::Diagnostic { .. } => None,
        }
    }
}

/// Token returned when registering an observer or subscriber, used to
/// remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Callback = Box<dyn FnMut(&Event)>;

/// The notification channel all mutators report through.
///
/// Two callback sets are kept: *observers* receive every event before the
/// mutation commits, *subscribers* receive the reverter-produced inverse of
/// each event that has one. The bus is owned by the canvas and lives as
/// long as it does; the engine never clears either set.
#[derive(Default)]
pub struct EventBus {
    observers: Vec<(ObserverId, Callback)>,
    subscribers: Vec<(ObserverId, Callback)>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> ObserverId {
        self.next_id += 1;
        ObserverId(self.next_id)
    }

    /// Registers an observer for pre-commit events.
    pub fn observe(&mut self, callback: impl FnMut(&Event) + 'static) -> ObserverId {
        let id = self.next_id();
        self.observers.push((id, Box::new(callback)));
        id
    }

    /// Registers a subscriber for reverter-produced inverse events.
    pub fn subscribe(&mut self, callback: impl FnMut(&Event) + 'static) -> ObserverId {
        let id = self.next_id();
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Removes an observer; returns whether it was registered.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    /// Removes a subscriber; returns whether it was registered.
    pub fn remove_subscriber(&mut self, id: ObserverId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(oid, _)| *oid != id);
        self.subscribers.len() != before
    }

    /// Delivers `event` to every observer, then its inverse (if any) to
    /// every subscriber. Called by mutators before they commit.
    pub(crate) fn emit(&mut self, event: &Event) {
        for (_, callback) in &mut self.observers {
            callback(event);
        }
        if let Some(inverse) = event.inverse() {
            for (_, callback) in &mut self.subscribers {
                callback(&inverse);
            }
        }
    }
}
