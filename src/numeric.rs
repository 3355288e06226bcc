//! Numeric tolerances and iteration budgets, kept in one place so every
//! component agrees on what "equal" and "too long" mean.

/// Absolute tolerance for comparing variable values. Assignments that move a
/// variable by no more than this are not observed and do not dirty the solver.
pub const EPSILON: f64 = 1e-9;

/// Convergence tolerance for the bisection stage of the equation constraint.
pub const BISECTION_TOLERANCE: f64 = 1e-10;

/// Maximum bisection iterations for the equation constraint.
pub(crate) const BISECTION_MAX_ITERATIONS: usize = 100;

/// Number of times the bracket half-width is doubled while searching for a
/// sign change before the equation constraint gives up.
pub(crate) const BRACKET_DOUBLINGS: usize = 32;

/// Determinant magnitude below which an affine matrix is treated as singular.
pub(crate) const DETERMINANT_FLOOR: f64 = 1e-12;

/// Constraint-solve budget for a single `solve()` pass.
pub(crate) const SOLVE_BUDGET: usize = 1000;

/// How many times one constraint may be re-enqueued within a single
/// `solve()` pass before further enqueues are suppressed.
pub(crate) const REQUEUE_CAP: u32 = 100;
