//! Projection variables: variable-shaped facades that read and write an
//! underlying local-space position through an item's item-to-canvas
//! matrix. From the solver's point of view a projection is just another
//! variable whose value happens to depend on (and update) another one.

use crate::event::{DiagnosticKind, Event, EventBus};
use crate::item::ItemId;
use crate::matrix::Matrix;
use crate::numeric::EPSILON;
use crate::solver::variable::{Axis, Position, VarEntry, VarId, VarKind, VarPool};
use smallvec::SmallVec;

impl VarPool {
    /// Allocates a projected position over `base`: two projection
    /// variables exposing the common-space coordinates of `base` as seen
    /// through the item-to-canvas matrix of `item`. The base components
    /// must be plain variables; projections do not nest.
    pub fn project(&mut self, base: Position, item: ItemId) -> Position {
        debug_assert!(matches!(self.entry(base.x).kind, VarKind::Plain));
        debug_assert!(matches!(self.entry(base.y).kind, VarKind::Plain));
        let mut component = |axis| {
            self.push(VarEntry {
                kind: VarKind::Projection { base, axis, item },
                value: 0.0,
                strength: 0,
                serial: 0,
            })
        };
        let projected = Position {
            x: component(Axis::X),
            y: component(Axis::Y),
        };
        self.projections_by_item
            .entry(item)
            .or_default()
            .extend([projected.x, projected.y]);
        for base_component in [base.x, base.y] {
            self.projections_by_base
                .entry(base_component)
                .or_default()
                .extend([projected.x, projected.y]);
        }
        projected
    }

    /// Read-through: `M_i2c * local`, selecting one axis. Recomputed on
    /// every read, never cached.
    pub(crate) fn projected_value(&self, base: Position, axis: Axis, item: ItemId) -> f64 {
        let local = (self.entry(base.x).value, self.entry(base.y).value);
        let (cx, cy) = self.i2c(item).transform_point(local);
        match axis {
            Axis::X => cx,
            Axis::Y => cy,
        }
    }

    /// Write-through: combine the written component with the other axis's
    /// current common-space value, map through the inverse of `M_i2c` and assign both
    /// base variables. A singular matrix drops the write, logs it and
    /// emits a diagnostic event.
    pub(crate) fn write_projection(
        &mut self,
        bus: &mut EventBus,
        base: Position,
        axis: Axis,
        item: ItemId,
        value: f64,
    ) -> SmallVec<[VarId; 2]> {
        let matrix = self.i2c(item);
        let local = (self.entry(base.x).value, self.entry(base.y).value);
        let (cx, cy) = matrix.transform_point(local);
        let current = match axis {
            Axis::X => cx,
            Axis::Y => cy,
        };
        if (value - current).abs() <= EPSILON {
            return SmallVec::new();
        }
        let common = match axis {
            Axis::X => (value, cy),
            Axis::Y => (cx, value),
        };
        let Ok(inverse) = matrix.invert() else {
            tracing::warn!(?item, "projection write dropped: singular item matrix");
            bus.emit(&Event::Diagnostic {
                kind: DiagnosticKind::SingularMatrix,
                constraint: None,
                item: Some(item),
            });
            return SmallVec::new();
        };
        let (lx, ly) = inverse.transform_point(common);
        let mut changed = SmallVec::new();
        changed.extend(self.set_plain(bus, base.x, lx));
        changed.extend(self.set_plain(bus, base.y, ly));
        changed
    }

    /// Projection variables layered over the plain variable `base`.
    /// Writes to the base make these facades report new values, so their
    /// dependent constraints must be re-enqueued alongside the base's own.
    pub(crate) fn projections_over(&self, base: VarId) -> &[VarId] {
        self.projections_by_base
            .get(&base)
            .map(|vars| vars.as_slice())
            .unwrap_or(&[])
    }

    /// Projection variables bound to `item`'s matrix. The update pipeline
    /// dirties these after refreshing the matrix cache.
    pub(crate) fn projections_of(&self, item: ItemId) -> &[VarId] {
        self.projections_by_item
            .get(&item)
            .map(|vars| vars.as_slice())
            .unwrap_or(&[])
    }

    /// The cached item-to-canvas matrix for `item`; identity until the
    /// update pipeline first refreshes it.
    pub fn i2c(&self, item: ItemId) -> Matrix {
        self.matrices.get(&item).copied().unwrap_or_default()
    }

    /// Replaces the cached item-to-canvas matrix for `item`.
    pub(crate) fn set_i2c(&mut self, item: ItemId, matrix: Matrix) {
        self.matrices.insert(item, matrix);
    }

    /// Drops cached state tied to `item` when it leaves the canvas.
    pub(crate) fn forget_item(&mut self, item: ItemId) {
        self.matrices.remove(&item);
        self.projections_by_item.remove(&item);
    }
}
