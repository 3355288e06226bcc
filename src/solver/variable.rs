use crate::event::{Event, EventBus};
use crate::item::ItemId;
use crate::matrix::Matrix;
use crate::numeric::EPSILON;
use ahash::AHashMap;
use smallvec::{SmallVec, smallvec};

/// Solver priorities. Higher strengths dominate: when a constraint must
/// adjust one of its operands, it picks the weakest.
pub mod strength {
    pub const VERY_WEAK: u32 = 0;
    pub const WEAK: u32 = 10;
    pub const NORMAL: u32 = 20;
    pub const STRONG: u32 = 30;
    pub const VERY_STRONG: u32 = 40;
    /// Variables at this strength are never chosen as solve targets.
    pub const REQUIRED: u32 = 100;
}

/// Handle to a variable in the solver's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) u32);

/// An ordered pair of variables representing a 2D point. Copying a
/// `Position` copies the handles, not the values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub x: VarId,
    pub y: VarId,
}

/// Which component of a projected position a projection variable exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum VarKind {
    Plain,
    /// A variable-shaped facade over one axis of `base`, viewed through the
    /// item-to-canvas matrix of `item`; see
    /// [`VarPool::project`](crate::solver::variable::VarPool::project).
    Projection {
        base: Position,
        axis: Axis,
        item: ItemId,
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct VarEntry {
    pub(crate) kind: VarKind,
    /// Current value. Meaningful for plain variables only; projections
    /// compute theirs on every read.
    pub(crate) value: f64,
    pub(crate) strength: u32,
    /// Monotonically increasing write serial, bumped on every material
    /// assignment. The solver breaks strength ties toward the variable
    /// written least recently.
    pub(crate) serial: u64,
}

/// Owns every variable the solver works with: plain scalars, projection
/// facades and the item-to-canvas matrix cache the projections read
/// through.
///
/// Variables are never freed; ids stay valid for the life of the pool.
#[derive(Default)]
pub struct VarPool {
    pub(crate) entries: Vec<VarEntry>,
    /// Item-to-canvas matrices, refreshed by the update pipeline.
    pub(crate) matrices: AHashMap<ItemId, Matrix>,
    /// Projections reading through each item's matrix.
    pub(crate) projections_by_item: AHashMap<ItemId, Vec<VarId>>,
    /// Projections layered over each plain base variable.
    pub(crate) projections_by_base: AHashMap<VarId, SmallVec<[VarId; 2]>>,
    /// Plain variables materially written since the log was last drained;
    /// the update pipeline uses it to find items moved by the solver.
    changed_log: Vec<VarId>,
    next_serial: u64,
}

impl VarPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, entry: VarEntry) -> VarId {
        let id = VarId(self.entries.len() as u32);
        self.entries.push(entry);
        id
    }

    pub(crate) fn entry(&self, var: VarId) -> &VarEntry {
        &self.entries[var.0 as usize]
    }

    fn bump_serial(&mut self) -> u64 {
        self.next_serial += 1;
        self.next_serial
    }

    /// Allocates a plain variable.
    pub fn variable(&mut self, value: f64, strength: u32) -> VarId {
        self.push(VarEntry {
            kind: VarKind::Plain,
            value,
            strength,
            serial: 0,
        })
    }

    /// Allocates a position: a pair of plain variables of equal strength.
    pub fn position(&mut self, (x, y): (f64, f64), strength: u32) -> Position {
        Position {
            x: self.variable(x, strength),
            y: self.variable(y, strength),
        }
    }

    /// Current value. Projections are computed on every read, never cached.
    pub fn value(&self, var: VarId) -> f64 {
        let entry = self.entry(var);
        match entry.kind {
            VarKind::Plain => entry.value,
            VarKind::Projection { base, axis, item } => self.projected_value(base, axis, item),
        }
    }

    /// Both components of a position.
    pub fn point(&self, pos: Position) -> (f64, f64) {
        (self.value(pos.x), self.value(pos.y))
    }

    /// Strength of a variable; a projection mirrors the base variable of
    /// its axis.
    pub fn strength(&self, var: VarId) -> u32 {
        let entry = self.entry(var);
        match entry.kind {
            VarKind::Plain => entry.strength,
            VarKind::Projection { base, axis, .. } => match axis {
                Axis::X => self.entry(base.x).strength,
                Axis::Y => self.entry(base.y).strength,
            },
        }
    }

    /// Write serial of a variable; a projection mirrors its base axis.
    pub(crate) fn serial(&self, var: VarId) -> u64 {
        let entry = self.entry(var);
        match entry.kind {
            VarKind::Plain => entry.serial,
            VarKind::Projection { base, axis, .. } => match axis {
                Axis::X => self.entry(base.x).serial,
                Axis::Y => self.entry(base.y).serial,
            },
        }
    }

    /// Changes the strength of a plain variable. The owner must detach the
    /// variable from any constraints first; strengths are read live during
    /// solving, so changing one mid-solve shifts target choice.
    pub fn set_strength(&mut self, var: VarId, strength: u32) {
        let entry = &mut self.entries[var.0 as usize];
        debug_assert!(matches!(entry.kind, VarKind::Plain));
        entry.strength = strength;
    }

    /// Assigns `value` to `var`, emitting a [`Event::VariableSet`] per
    /// materially changed plain variable before committing it.
    ///
    /// Returns the plain variables that actually changed: the variable
    /// itself, or for a projection the base components reached through the
    /// inverse matrix. An assignment within [`EPSILON`] of the current
    /// value performs no observation and changes nothing.
    pub fn set_value(
        &mut self,
        bus: &mut EventBus,
        var: VarId,
        value: f64,
    ) -> SmallVec<[VarId; 2]> {
        match self.entry(var).kind {
            VarKind::Plain => match self.set_plain(bus, var, value) {
                Some(changed) => smallvec![changed],
                None => smallvec![],
            },
            VarKind::Projection { base, axis, item } => {
                self.write_projection(bus, base, axis, item, value)
            }
        }
    }

    /// Assigns both components of a position independently.
    pub fn set_point(
        &mut self,
        bus: &mut EventBus,
        pos: Position,
        (x, y): (f64, f64),
    ) -> SmallVec<[VarId; 2]> {
        let mut changed = self.set_value(bus, pos.x, x);
        changed.extend(self.set_value(bus, pos.y, y));
        changed
    }

    pub(crate) fn set_plain(
        &mut self,
        bus: &mut EventBus,
        var: VarId,
        value: f64,
    ) -> Option<VarId> {
        let old = self.entry(var).value;
        if (value - old).abs() <= EPSILON {
            return None;
        }
        bus.emit(&Event::VariableSet { var, value, old });
        let serial = self.bump_serial();
        let entry = &mut self.entries[var.0 as usize];
        entry.value = value;
        entry.serial = serial;
        self.changed_log.push(var);
        Some(var)
    }

    /// Drains the changed-variable log.
    pub(crate) fn take_changed(&mut self) -> Vec<VarId> {
        std::mem::take(&mut self.changed_log)
    }
}
