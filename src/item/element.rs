use crate::connector::{Handle, LinePort, Port};
use crate::event::EventBus;
use crate::geometry::distance_rectangle_point;
use crate::item::{Item, ItemId};
use crate::solver::constraint::Constraint;
use crate::solver::variable::{Position, VarId, strength};
use crate::solver::{ConstraintId, Solver};
use std::any::Any;

/// A rectangular item.
///
/// Four corner handles and four edge line ports. Internal constraints keep
/// the corners rectangular and enforce the minimum size; since
/// normalization pins the north-west corner to the local origin, the
/// south-east corner's coordinates are the width and height, and the
/// minimum sizes are plain lower bounds on them.
pub struct Element {
    handles: Vec<Handle>,
    ports: Vec<Port>,
    constraints: Vec<ConstraintId>,
    min_width: VarId,
    min_height: VarId,
}

impl Element {
    pub const NW: usize = 0;
    pub const NE: usize = 1;
    pub const SE: usize = 2;
    pub const SW: usize = 3;

    /// Creates an element of the given size with its north-west corner at
    /// the local origin. Constraints are registered when the element is
    /// added to a canvas.
    pub fn new(solver: &mut Solver, width: f64, height: f64) -> Self {
        let nw = solver.position((0.0, 0.0), strength::NORMAL);
        let ne = solver.position((width, 0.0), strength::NORMAL);
        let se = solver.position((width, height), strength::NORMAL);
        let sw = solver.position((0.0, height), strength::NORMAL);
        let handles = vec![
            Handle::new(nw).connectable(true),
            Handle::new(ne).connectable(true),
            Handle::new(se).connectable(true),
            Handle::new(sw).connectable(true),
        ];
        // Edge ports in top, right, bottom, left order, sharing the corner
        // variables.
        let ports = vec![
            Port::Line(LinePort { start: nw, end: ne }),
            Port::Line(LinePort { start: ne, end: se }),
            Port::Line(LinePort { start: se, end: sw }),
            Port::Line(LinePort { start: sw, end: nw }),
        ];
        Self {
            handles,
            ports,
            constraints: Vec::new(),
            min_width: solver.variable(10.0, strength::STRONG),
            min_height: solver.variable(10.0, strength::STRONG),
        }
    }

    pub const PORT_TOP: usize = 0;
    pub const PORT_RIGHT: usize = 1;
    pub const PORT_BOTTOM: usize = 2;
    pub const PORT_LEFT: usize = 3;

    fn corner(&self, index: usize) -> Position {
        self.handles[index].pos
    }

    pub fn width(&self, solver: &Solver) -> f64 {
        solver.value(self.corner(Self::SE).x) - solver.value(self.corner(Self::NW).x)
    }

    pub fn height(&self, solver: &Solver) -> f64 {
        solver.value(self.corner(Self::SE).y) - solver.value(self.corner(Self::NW).y)
    }

    /// Resizes by moving the south-east corner; the rectangularity
    /// constraints carry the other corners along on the next solve.
    pub fn set_width(&self, solver: &mut Solver, bus: &mut EventBus, width: f64) {
        let x = solver.value(self.corner(Self::NW).x) + width;
        let se = self.corner(Self::SE);
        solver.set_value(bus, se.x, x);
    }

    pub fn set_height(&self, solver: &mut Solver, bus: &mut EventBus, height: f64) {
        let y = solver.value(self.corner(Self::NW).y) + height;
        let se = self.corner(Self::SE);
        solver.set_value(bus, se.y, y);
    }

    pub fn min_width(&self, solver: &Solver) -> f64 {
        solver.value(self.min_width)
    }

    pub fn min_height(&self, solver: &Solver) -> f64 {
        solver.value(self.min_height)
    }

    pub fn set_min_width(&self, solver: &mut Solver, bus: &mut EventBus, value: f64) {
        solver.set_value(bus, self.min_width, value);
    }

    pub fn set_min_height(&self, solver: &mut Solver, bus: &mut EventBus, value: f64) {
        solver.set_value(bus, self.min_height, value);
    }
}

impl Item for Element {
    fn setup(&mut self, _id: ItemId, solver: &mut Solver) {
        let (nw, ne, se, sw) = (
            self.corner(Self::NW),
            self.corner(Self::NE),
            self.corner(Self::SE),
            self.corner(Self::SW),
        );
        self.constraints = vec![
            // Rectangularity: horizontal top and bottom, vertical left and
            // right.
            solver.add_constraint(Constraint::Equality { a: nw.y, b: ne.y }),
            solver.add_constraint(Constraint::Equality { a: sw.y, b: se.y }),
            solver.add_constraint(Constraint::Equality { a: nw.x, b: sw.x }),
            solver.add_constraint(Constraint::Equality { a: ne.x, b: se.x }),
            solver.add_constraint(Constraint::LessThan {
                smaller: self.min_width,
                bigger: se.x,
            }),
            solver.add_constraint(Constraint::LessThan {
                smaller: self.min_height,
                bigger: se.y,
            }),
        ];
    }

    fn teardown(&mut self, solver: &mut Solver) {
        for constraint in self.constraints.drain(..) {
            let _ = solver.remove_constraint(constraint);
        }
    }

    fn handles(&self) -> &[Handle] {
        &self.handles
    }

    fn handles_mut(&mut self) -> &mut [Handle] {
        &mut self.handles
    }

    fn ports(&self) -> &[Port] {
        &self.ports
    }

    fn constraints(&self) -> &[ConstraintId] {
        &self.constraints
    }

    fn point(&self, solver: &Solver, x: f64, y: f64) -> f64 {
        let (ox, oy) = solver.point(self.corner(Self::NW));
        distance_rectangle_point(
            (ox, oy, self.width(solver), self.height(solver)),
            (x, y),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
