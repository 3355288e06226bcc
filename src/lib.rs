//! Vellum is the geometry core of a diagramming tool: an incremental,
//! constraint-based engine that keeps a forest of transformed items
//! mathematically consistent while handles are dragged, elements are
//! reshaped and lines are connected across independent coordinate systems.
//! A strength-aware solver resolves declarative constraints lazily to a
//! fixed point; projection variables carry positions between item-local
//! and canvas coordinates through affine matrices; and the canvas's update
//! pipeline orchestrates hooks, matrix maintenance, solving and
//! normalization. Drawing, windowing and interaction tooling are host
//! concerns: the engine exposes events, views and measurement seams for
//! them and nothing more.

pub mod canvas;
pub mod connections;
pub mod connector;
pub mod error;
pub mod event;
pub mod geometry;
pub mod item;
pub mod matrix;
pub mod numeric;
pub mod solver;
pub mod tree;

pub mod prelude {
    pub use crate::canvas::Canvas;
    pub use crate::connections::{Connection, Connections};
    pub use crate::connector::{Handle, LinePort, PointPort, Port};
    pub use crate::error::VellumError;
    pub use crate::event::{DiagnosticKind, Event, EventBus, HandleFlag, LineFlag};
    pub use crate::item::element::Element;
    pub use crate::item::line::Line;
    pub use crate::item::{Item, ItemId, Measurer, UpdateContext, View};
    pub use crate::matrix::Matrix;
    pub use crate::solver::constraint::Constraint;
    pub use crate::solver::variable::{Position, VarId, strength};
    pub use crate::solver::{ConstraintId, Solver};
}
