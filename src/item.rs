pub mod element;
pub mod line;

use crate::connector::{Handle, Port};
use crate::error::VellumError;
use crate::event::EventBus;
use crate::solver::{ConstraintId, Solver};
use std::any::Any;

/// Stable identifier of an item in the canvas. Items never hold references
/// to each other; everything that relates items (the tree, connections,
/// projections) is keyed by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub(crate) u64);

/// Measurement handle passed to the update hooks, typically used to
/// compute text extents. The engine itself never interprets drawing calls;
/// hosts plug in whatever their drawing backend provides.
pub trait Measurer {
    /// Returns `(width, height)` of `text` in canvas units.
    fn text_extents(&self, text: &str) -> (f64, f64);
}

/// Default measurer: everything has zero extent.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMeasurer;

impl Measurer for NullMeasurer {
    fn text_extents(&self, _text: &str) -> (f64, f64) {
        (0.0, 0.0)
    }
}

/// A host view. The canvas calls this whenever a mutation dirties items so
/// the view can schedule a redraw.
pub trait View {
    fn request_update(&mut self, items: &[ItemId], matrix_only: bool);
}

/// Context handed to [`Item::pre_update`] and [`Item::post_update`].
pub struct UpdateContext<'a> {
    /// The item being updated.
    pub item: ItemId,
    pub solver: &'a mut Solver,
    pub bus: &'a mut EventBus,
    pub measurer: &'a dyn Measurer,
    requests: Vec<ItemId>,
}

impl<'a> UpdateContext<'a> {
    pub(crate) fn new(
        item: ItemId,
        solver: &'a mut Solver,
        bus: &'a mut EventBus,
        measurer: &'a dyn Measurer,
    ) -> Self {
        Self {
            item,
            solver,
            bus,
            measurer,
            requests: Vec::new(),
        }
    }

    /// Requests an update for another item (or this one again); the
    /// request joins the dirty set of the running update cycle.
    pub fn request_update(&mut self, item: ItemId) {
        self.requests.push(item);
    }

    pub(crate) fn take_requests(&mut self) -> Vec<ItemId> {
        std::mem::take(&mut self.requests)
    }
}

/// Something placed in the item tree.
///
/// An item owns its handles, its ports and a private set of internal
/// constraints. Its local matrix lives in the canvas (so matrix mutations
/// can be observed); constraint registration happens in [`Item::setup`]
/// when the item joins a canvas and is undone in [`Item::teardown`].
pub trait Item: Any {
    /// Called when the item is added to a canvas. Implementations register
    /// their internal constraints here.
    fn setup(&mut self, id: ItemId, solver: &mut Solver) {
        let _ = (id, solver);
    }

    /// Called when the item is removed. The default removes every internal
    /// constraint.
    fn teardown(&mut self, solver: &mut Solver) {
        for constraint in self.constraints() {
            let _ = solver.remove_constraint(*constraint);
        }
    }

    fn handles(&self) -> &[Handle];

    fn handles_mut(&mut self) -> &mut [Handle];

    fn ports(&self) -> &[Port];

    /// Internally-owned constraints (rectangularity, orthogonality and the like).
    fn constraints(&self) -> &[ConstraintId] {
        &[]
    }

    /// Distance from `(x, y)` (item-local) to the item's shape.
    fn point(&self, solver: &Solver, x: f64, y: f64) -> f64;

    /// First hook of the update cycle, before matrices are refreshed and
    /// constraints solved.
    fn pre_update(&mut self, ctx: &mut UpdateContext<'_>) -> Result<(), VellumError> {
        let _ = ctx;
        Ok(())
    }

    /// Last hook of the update cycle, after solving and normalization.
    fn post_update(&mut self, ctx: &mut UpdateContext<'_>) -> Result<(), VellumError> {
        let _ = ctx;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
