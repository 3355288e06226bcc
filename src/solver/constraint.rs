use crate::error::VellumError;
use crate::event::EventBus;
use crate::geometry::distance_segment_point;
use crate::numeric::{BISECTION_MAX_ITERATIONS, BISECTION_TOLERANCE, BRACKET_DOUBLINGS, EPSILON};
use crate::solver::variable::{Position, VarId, VarPool, strength};
use smallvec::{SmallVec, smallvec};
use std::fmt;

/// Callable for the [`Constraint::Equation`] kind: evaluated with the
/// current operand values, a root (`f = 0`) is what the constraint
/// maintains.
pub type EquationFn = Box<dyn Fn(&[f64]) -> f64>;

/// A declarative relation over a fixed, ordered set of variables.
///
/// Each kind knows how to adjust a single *target* operand so the relation
/// holds given the current values of the others, and how to measure its
/// residual. Constraints are stateless across resolutions; all state lives
/// in the variable pool.
///
/// Operands may be projection variables, in which case writes land on the
/// underlying local-space variables through the item matrix.
pub enum Constraint {
    /// `a = b`.
    Equality { a: VarId, b: VarId },
    /// `smaller <= bigger`; only adjusts when violated, exact equality
    /// performs no write.
    LessThan { smaller: VarId, bigger: VarId },
    /// `center = (a + b) / 2`.
    Center { center: VarId, a: VarId, b: VarId },
    /// `var = a + ratio * (b - a)` for a fixed `ratio` in `[0, 1]`.
    Balance {
        var: VarId,
        a: VarId,
        b: VarId,
        ratio: f64,
    },
    /// `f(operands...) = 0`, solved numerically for the target by bracketed
    /// bisection.
    Equation {
        operands: Vec<VarId>,
        f: EquationFn,
    },
    /// `point` lies on the segment `start`..`end`: the point is projected
    /// onto the closest position on the segment.
    Line {
        point: Position,
        start: Position,
        end: Position,
    },
    /// `target` coincides with `source`, component-wise.
    PositionEqual { source: Position, target: Position },
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Equality { a, b } => f
                .debug_struct("Equality")
                .field("a", a)
                .field("b", b)
                .finish(),
            Constraint::LessThan { smaller, bigger } => f
                .debug_struct("LessThan")
                .field("smaller", smaller)
                .field("bigger", bigger)
                .finish(),
            Constraint::Center { center, a, b } => f
                .debug_struct("Center")
                .field("center", center)
                .field("a", a)
                .field("b", b)
                .finish(),
            Constraint::Balance { var, a, b, ratio } => f
                .debug_struct("Balance")
                .field("var", var)
                .field("a", a)
                .field("b", b)
                .field("ratio", ratio)
                .finish(),
            Constraint::Equation { operands, .. } => f
                .debug_struct("Equation")
                .field("operands", operands)
                .finish_non_exhaustive(),
            Constraint::Line { point, start, end } => f
                .debug_struct("Line")
                .field("point", point)
                .field("start", start)
                .field("end", end)
                .finish(),
            Constraint::PositionEqual { source, target } => f
                .debug_struct("PositionEqual")
                .field("source", source)
                .field("target", target)
                .finish(),
        }
    }
}

impl Constraint {
    /// The ordered operand list the solver indexes and picks targets from.
    pub fn operands(&self) -> SmallVec<[VarId; 6]> {
        match self {
            Constraint::Equality { a, b } => smallvec![*a, *b],
            Constraint::LessThan { smaller, bigger } => smallvec![*smaller, *bigger],
            Constraint::Center { center, a, b } => smallvec![*center, *a, *b],
            Constraint::Balance { var, a, b, .. } => smallvec![*var, *a, *b],
            Constraint::Equation { operands, .. } => SmallVec::from_slice(operands),
            Constraint::Line { point, start, end } => {
                smallvec![point.x, point.y, start.x, start.y, end.x, end.y]
            }
            Constraint::PositionEqual { source, target } => {
                smallvec![source.x, source.y, target.x, target.y]
            }
        }
    }

    /// How far the relation currently is from holding.
    pub fn residual(&self, pool: &VarPool) -> f64 {
        match self {
            Constraint::Equality { a, b } => (pool.value(*a) - pool.value(*b)).abs(),
            Constraint::LessThan { smaller, bigger } => {
                (pool.value(*smaller) - pool.value(*bigger)).max(0.0)
            }
            Constraint::Center { center, a, b } => {
                (pool.value(*center) - (pool.value(*a) + pool.value(*b)) / 2.0).abs()
            }
            Constraint::Balance { var, a, b, ratio } => {
                let (a, b) = (pool.value(*a), pool.value(*b));
                (pool.value(*var) - (a + ratio * (b - a))).abs()
            }
            Constraint::Equation { operands, f } => {
                let values: Vec<f64> = operands.iter().map(|v| pool.value(*v)).collect();
                f(&values).abs()
            }
            Constraint::Line { point, start, end } => {
                let (distance, _) =
                    distance_segment_point(pool.point(*start), pool.point(*end), pool.point(*point));
                distance
            }
            Constraint::PositionEqual { source, target } => {
                let (sx, sy) = pool.point(*source);
                let (tx, ty) = pool.point(*target);
                (sx - tx).hypot(sy - ty)
            }
        }
    }

    /// Adjusts `target` so the relation holds given the current values of
    /// the other operands. Returns the plain variables that materially
    /// changed (writes through projections report the underlying local
    /// variables).
    ///
    /// The position-shaped kinds ([`Constraint::Line`],
    /// [`Constraint::PositionEqual`]) always adjust their designated point
    /// whichever of its components was nominated; projecting a segment
    /// onto a point has no meaning. A designated point with a `REQUIRED`
    /// component is pinned: nothing is written, and the solver reports the
    /// constraint as unresolvable if the relation does not already hold.
    pub(crate) fn solve_for(
        &self,
        target: VarId,
        pool: &mut VarPool,
        bus: &mut EventBus,
    ) -> Result<SmallVec<[VarId; 4]>, VellumError> {
        let mut changed: SmallVec<[VarId; 4]> = SmallVec::new();
        match self {
            Constraint::Equality { a, b } => {
                let other = if target == *a { *b } else { *a };
                let value = pool.value(other);
                changed.extend(pool.set_value(bus, target, value));
            }
            Constraint::LessThan { smaller, bigger } => {
                let (s, b) = (pool.value(*smaller), pool.value(*bigger));
                if s > b {
                    let value = if target == *smaller { b } else { s };
                    changed.extend(pool.set_value(bus, target, value));
                }
            }
            Constraint::Center { center, a, b } => {
                let value = if target == *center {
                    (pool.value(*a) + pool.value(*b)) / 2.0
                } else if target == *a {
                    2.0 * pool.value(*center) - pool.value(*b)
                } else {
                    2.0 * pool.value(*center) - pool.value(*a)
                };
                changed.extend(pool.set_value(bus, target, value));
            }
            Constraint::Balance { var, a, b, ratio } => {
                let w = *ratio;
                let value = if target == *var {
                    let (va, vb) = (pool.value(*a), pool.value(*b));
                    va + w * (vb - va)
                } else if target == *a {
                    if (1.0 - w).abs() <= EPSILON {
                        return Ok(changed);
                    }
                    (pool.value(*var) - w * pool.value(*b)) / (1.0 - w)
                } else {
                    if w.abs() <= EPSILON {
                        return Ok(changed);
                    }
                    (pool.value(*var) - (1.0 - w) * pool.value(*a)) / w
                };
                changed.extend(pool.set_value(bus, target, value));
            }
            Constraint::Equation { operands, f } => {
                let root = solve_equation(pool, operands, f, target)?;
                changed.extend(pool.set_value(bus, target, root));
            }
            Constraint::Line { point, start, end } => {
                if is_pinned(pool, *point) {
                    return Ok(changed);
                }
                let (_, foot) =
                    distance_segment_point(pool.point(*start), pool.point(*end), pool.point(*point));
                changed.extend(pool.set_point(bus, *point, foot));
            }
            Constraint::PositionEqual { source, target } => {
                if is_pinned(pool, *target) {
                    return Ok(changed);
                }
                let value = pool.point(*source);
                changed.extend(pool.set_point(bus, *target, value));
            }
        }
        Ok(changed)
    }
}

/// A position with a `REQUIRED` component may never be written.
fn is_pinned(pool: &VarPool, pos: Position) -> bool {
    pool.strength(pos.x) >= strength::REQUIRED || pool.strength(pos.y) >= strength::REQUIRED
}

/// Finds a root of `f` in the target operand by bracket expansion and
/// bisection.
///
/// The bracket starts at `[t - h, t + h]` around the target's current
/// value and `h` doubles until the endpoints straddle a sign change, up to
/// [`BRACKET_DOUBLINGS`] doublings. Bisection then narrows to
/// [`BISECTION_TOLERANCE`] or [`BISECTION_MAX_ITERATIONS`] iterations,
/// whichever comes first.
fn solve_equation(
    pool: &VarPool,
    operands: &[VarId],
    f: &EquationFn,
    target: VarId,
) -> Result<f64, VellumError> {
    let mut values: Vec<f64> = operands.iter().map(|v| pool.value(*v)).collect();
    let index = operands
        .iter()
        .position(|v| *v == target)
        .ok_or(VellumError::NonConvergentEquation)?;
    let t0 = values[index];

    let mut eval = move |x: f64| {
        values[index] = x;
        f(&values)
    };

    let f0 = eval(t0);
    if f0.abs() <= BISECTION_TOLERANCE {
        return Ok(t0);
    }

    // Expand the bracket until one half straddles a sign change.
    let mut h = 0.1;
    let mut bracket = None;
    for _ in 0..BRACKET_DOUBLINGS {
        let (lo, hi) = (t0 - h, t0 + h);
        let (flo, fhi) = (eval(lo), eval(hi));
        if flo == 0.0 {
            return Ok(lo);
        }
        if fhi == 0.0 {
            return Ok(hi);
        }
        if flo * f0 < 0.0 {
            bracket = Some((lo, t0, flo));
            break;
        }
        if f0 * fhi < 0.0 {
            bracket = Some((t0, hi, f0));
            break;
        }
        h *= 2.0;
    }
    let (mut lo, mut hi, mut flo) = bracket.ok_or(VellumError::NonConvergentEquation)?;

    for _ in 0..BISECTION_MAX_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        let fm = eval(mid);
        if fm.abs() <= BISECTION_TOLERANCE || 0.5 * (hi - lo) <= BISECTION_TOLERANCE {
            return Ok(mid);
        }
        if flo * fm < 0.0 {
            hi = mid;
        } else {
            lo = mid;
            flo = fm;
        }
    }
    Ok(0.5 * (lo + hi))
}
