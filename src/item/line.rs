use crate::connector::{Handle, LinePort, Port};
use crate::error::VellumError;
use crate::geometry::distance_segment_point;
use crate::item::{Item, ItemId, UpdateContext};
use crate::solver::constraint::Constraint;
use crate::solver::variable::strength;
use crate::solver::{ConstraintId, Solver};
use std::any::Any;

/// A polyline of two or more handles, with one line port per segment.
///
/// Ports share the handle variables, so they follow the handles without
/// syncing. With the `orthogonal` flag set, internal equality constraints
/// keep the segments alternately axis-aligned; `horizontal` makes the
/// first segment horizontal instead of vertical. Flag changes take effect
/// at the next update cycle, when `pre_update` rebuilds the constraints.
pub struct Line {
    handles: Vec<Handle>,
    ports: Vec<Port>,
    constraints: Vec<ConstraintId>,
    orthogonal: bool,
    horizontal: bool,
    stale_constraints: bool,
}

impl Line {
    /// Creates a two-handle line from the local origin to `(10, 10)`.
    pub fn new(solver: &mut Solver) -> Self {
        let head = solver.position((0.0, 0.0), strength::NORMAL);
        let tail = solver.position((10.0, 10.0), strength::NORMAL);
        let mut line = Self {
            handles: vec![
                Handle::new(head).connectable(true),
                Handle::new(tail).connectable(true),
            ],
            ports: Vec::new(),
            constraints: Vec::new(),
            orthogonal: false,
            horizontal: false,
            stale_constraints: false,
        };
        line.rebuild_ports();
        line
    }

    pub fn head(&self) -> &Handle {
        &self.handles[0]
    }

    pub fn tail(&self) -> &Handle {
        &self.handles[self.handles.len() - 1]
    }

    pub fn is_orthogonal(&self) -> bool {
        self.orthogonal
    }

    pub fn is_horizontal(&self) -> bool {
        self.horizontal
    }

    /// Flag setters are crate-internal: hosts go through the canvas, which
    /// emits the observable event and schedules the rebuild.
    pub(crate) fn set_orthogonal_flag(&mut self, value: bool) {
        self.orthogonal = value;
        self.stale_constraints = true;
    }

    pub(crate) fn set_horizontal_flag(&mut self, value: bool) {
        self.horizontal = value;
        self.stale_constraints = true;
    }

    /// Inserts a handle before segment position `index` (clamped), at the
    /// given local coordinates.
    pub fn insert_handle(&mut self, solver: &mut Solver, index: usize, point: (f64, f64)) {
        let index = index.min(self.handles.len());
        let pos = solver.position(point, strength::NORMAL);
        self.handles.insert(index, Handle::new(pos).connectable(true));
        self.rebuild_ports();
        self.stale_constraints = true;
    }

    /// Removes a handle; a line keeps at least two.
    pub fn remove_handle(&mut self, index: usize) -> Result<(), VellumError> {
        if index >= self.handles.len() || self.handles.len() <= 2 {
            return Err(VellumError::UnknownHandle(index));
        }
        self.handles.remove(index);
        self.rebuild_ports();
        self.stale_constraints = true;
        Ok(())
    }

    fn rebuild_ports(&mut self) {
        self.ports = self
            .handles
            .windows(2)
            .map(|pair| {
                Port::Line(LinePort {
                    start: pair[0].pos,
                    end: pair[1].pos,
                })
            })
            .collect();
    }

    fn rebuild_constraints(&mut self, solver: &mut Solver) {
        for constraint in self.constraints.drain(..) {
            let _ = solver.remove_constraint(constraint);
        }
        if !self.orthogonal {
            return;
        }
        // An orthogonal line needs an elbow; give a bare segment one at
        // its midpoint.
        if self.handles.len() == 2 {
            let (x0, y0) = solver.point(self.handles[0].pos);
            let (x1, y1) = solver.point(self.handles[1].pos);
            self.insert_handle(solver, 1, ((x0 + x1) / 2.0, (y0 + y1) / 2.0));
        }
        let parity = usize::from(self.horizontal);
        self.constraints = self
            .handles
            .windows(2)
            .enumerate()
            .map(|(segment, pair)| {
                let (p0, p1) = (pair[0].pos, pair[1].pos);
                if segment % 2 == parity {
                    solver.add_constraint(Constraint::Equality { a: p0.x, b: p1.x })
                } else {
                    solver.add_constraint(Constraint::Equality { a: p0.y, b: p1.y })
                }
            })
            .collect();
    }
}

impl Item for Line {
    fn setup(&mut self, _id: ItemId, solver: &mut Solver) {
        self.rebuild_constraints(solver);
        self.stale_constraints = false;
    }

    fn teardown(&mut self, solver: &mut Solver) {
        for constraint in self.constraints.drain(..) {
            let _ = solver.remove_constraint(constraint);
        }
    }

    fn pre_update(&mut self, ctx: &mut UpdateContext<'_>) -> Result<(), VellumError> {
        if self.stale_constraints {
            self.rebuild_constraints(ctx.solver);
            self.stale_constraints = false;
        }
        Ok(())
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
        self.handles
            .windows(2)
            .map(|pair| {
                let (distance, _) = distance_segment_point(
                    solver.point(pair[0].pos),
                    solver.point(pair[1].pos),
                    (x, y),
                );
                distance
            })
            .fold(f64::INFINITY, f64::min)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
