//! Connection endpoints: handles (the movable points of an item) and
//! ports (the regions other items' handles can be glued to).

use crate::event::HandleFlag;
use crate::geometry::distance_segment_point;
use crate::item::ItemId;
use crate::solver::Solver;
use crate::solver::constraint::Constraint;
use crate::solver::variable::Position;

/// A movable point on an item.
///
/// The position is a pair of pool variables in item-local coordinates.
/// Flags are mutated through the canvas so the change is observed.
#[derive(Debug, Clone, Copy)]
pub struct Handle {
    pub pos: Position,
    connectable: bool,
    movable: bool,
    visible: bool,
}

impl Handle {
    pub fn new(pos: Position) -> Self {
        Self {
            pos,
            connectable: false,
            movable: true,
            visible: true,
        }
    }

    pub fn connectable(mut self, connectable: bool) -> Self {
        self.connectable = connectable;
        self
    }

    pub fn is_connectable(&self) -> bool {
        self.connectable
    }

    pub fn is_movable(&self) -> bool {
        self.movable
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn flag(&self, flag: HandleFlag) -> bool {
        match flag {
            HandleFlag::Connectable => self.connectable,
            HandleFlag::Movable => self.movable,
            HandleFlag::Visible => self.visible,
        }
    }

    pub(crate) fn set_flag(&mut self, flag: HandleFlag, value: bool) {
        match flag {
            HandleFlag::Connectable => self.connectable = value,
            HandleFlag::Movable => self.movable = value,
            HandleFlag::Visible => self.visible = value,
        }
    }
}

/// A port anchored at a single position.
#[derive(Debug, Clone, Copy)]
pub struct PointPort {
    pub pos: Position,
}

/// A port spanning the segment between two positions. Line ports usually
/// share their positions with the owning item's handles, so they follow
/// the handles without any syncing.
#[derive(Debug, Clone, Copy)]
pub struct LinePort {
    pub start: Position,
    pub end: Position,
}

/// A connectable region on an item.
#[derive(Debug, Clone, Copy)]
pub enum Port {
    Point(PointPort),
    Line(LinePort),
}

impl Port {
    /// The closest point of the port to `(x, y)` and its distance, both in
    /// the owning item's local coordinates.
    pub fn glue(&self, solver: &Solver, (x, y): (f64, f64)) -> ((f64, f64), f64) {
        match self {
            Port::Point(port) => {
                let pos = solver.point(port.pos);
                let distance = (pos.0 - x).hypot(pos.1 - y);
                (pos, distance)
            }
            Port::Line(port) => {
                let (distance, foot) = distance_segment_point(
                    solver.point(port.start),
                    solver.point(port.end),
                    (x, y),
                );
                (foot, distance)
            }
        }
    }

    /// Builds the constraint that pins `handle_pos` (local to `item`) to
    /// this port (local to `connected`) in common coordinates. Both sides
    /// are lifted into canvas space through projection variables; the
    /// registry adds the result to the solver.
    pub fn constraint(
        &self,
        solver: &mut Solver,
        item: ItemId,
        handle_pos: Position,
        connected: ItemId,
    ) -> Constraint {
        let handle = solver.project(handle_pos, item);
        match self {
            Port::Point(port) => {
                let source = solver.project(port.pos, connected);
                Constraint::PositionEqual {
                    source,
                    target: handle,
                }
            }
            Port::Line(port) => {
                let start = solver.project(port.start, connected);
                let end = solver.project(port.end, connected);
                Constraint::Line {
                    point: handle,
                    start,
                    end,
                }
            }
        }
    }
}
