pub mod constraint;
pub mod projection;
pub mod variable;

use crate::error::VellumError;
use crate::event::{DiagnosticKind, Event, EventBus};
use crate::item::ItemId;
use crate::numeric::{EPSILON, REQUEUE_CAP, SOLVE_BUDGET};
use ahash::AHashMap;
use self::constraint::Constraint;
use self::variable::{Position, VarId, VarPool, strength};
use smallvec::SmallVec;
use std::collections::VecDeque;

/// Handle to a constraint registered with the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(u64);

struct ConstraintEntry {
    constraint: Constraint,
    /// Cached operand list; the operand set of a registered constraint is
    /// fixed.
    operands: SmallVec<[VarId; 6]>,
    /// Needs re-resolution.
    dirty: bool,
    /// Currently sitting in the FIFO queue.
    queued: bool,
    /// Enqueues within the current `solve()` pass.
    enqueues: u32,
    /// Hit the re-enqueue cap within the current `solve()` pass.
    suppressed: bool,
}

/// Maintains the truth of a set of constraints over a pool of variables,
/// resolving lazily on demand.
///
/// Mutations mark variables dirty; every constraint referencing a dirty
/// variable is enqueued, and [`Solver::solve`] drains the queue to a fixed
/// point. Per dirty constraint the solver picks the weakest operand as the
/// target (ties broken toward the least recently written; `REQUIRED`
/// variables are never picked) and asks the constraint to adjust it.
/// Writes that materially change a variable re-enqueue the *other*
/// constraints referencing it.
#[derive(Default)]
pub struct Solver {
    pool: VarPool,
    constraints: AHashMap<ConstraintId, ConstraintEntry>,
    by_var: AHashMap<VarId, SmallVec<[ConstraintId; 4]>>,
    queue: VecDeque<ConstraintId>,
    next_id: u64,
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The variable pool backing this solver.
    pub fn pool(&self) -> &VarPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut VarPool {
        &mut self.pool
    }

    /// Allocates a plain variable; see [`VarPool::variable`].
    pub fn variable(&mut self, value: f64, strength: u32) -> VarId {
        self.pool.variable(value, strength)
    }

    /// Allocates a position; see [`VarPool::position`].
    pub fn position(&mut self, point: (f64, f64), strength: u32) -> Position {
        self.pool.position(point, strength)
    }

    /// Allocates a projected position; see [`VarPool::project`].
    pub fn project(&mut self, base: Position, item: ItemId) -> Position {
        self.pool.project(base, item)
    }

    /// Current value of a variable.
    pub fn value(&self, var: VarId) -> f64 {
        self.pool.value(var)
    }

    /// Current value of both components of a position.
    pub fn point(&self, pos: Position) -> (f64, f64) {
        self.pool.point(pos)
    }

    /// Assigns a variable and enqueues the constraints that depend on
    /// whatever actually changed.
    pub fn set_value(&mut self, bus: &mut EventBus, var: VarId, value: f64) {
        let changed = self.pool.set_value(bus, var, value);
        for var in changed {
            self.enqueue_dependents(var, None);
        }
    }

    /// Assigns both components of a position.
    pub fn set_point(&mut self, bus: &mut EventBus, pos: Position, point: (f64, f64)) {
        let changed = self.pool.set_point(bus, pos, point);
        for var in changed {
            self.enqueue_dependents(var, None);
        }
    }

    /// Registers a constraint, indexes its operands and marks it dirty.
    pub fn add_constraint(&mut self, constraint: Constraint) -> ConstraintId {
        self.next_id += 1;
        let id = ConstraintId(self.next_id);
        let operands = constraint.operands();
        for operand in &operands {
            let deps = self.by_var.entry(*operand).or_default();
            if !deps.contains(&id) {
                deps.push(id);
            }
        }
        self.constraints.insert(
            id,
            ConstraintEntry {
                constraint,
                operands,
                dirty: true,
                queued: true,
                enqueues: 0,
                suppressed: false,
            },
        );
        self.queue.push_back(id);
        id
    }

    /// Removes a constraint and its operand index entries. Operands left
    /// without any referencing constraint are no longer tracked.
    pub fn remove_constraint(&mut self, id: ConstraintId) -> Result<(), VellumError> {
        let entry = self
            .constraints
            .remove(&id)
            .ok_or(VellumError::UnknownConstraint)?;
        for operand in &entry.operands {
            if let Some(deps) = self.by_var.get_mut(operand) {
                deps.retain(|dep| *dep != id);
                if deps.is_empty() {
                    self.by_var.remove(operand);
                }
            }
        }
        // Stale queue entries are skipped when popped.
        Ok(())
    }

    /// The registered constraint behind an id, if still present.
    pub fn constraint(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.get(&id).map(|entry| &entry.constraint)
    }

    pub fn has_constraint(&self, id: ConstraintId) -> bool {
        self.constraints.contains_key(&id)
    }

    /// Number of registered constraints.
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Residual of a registered constraint.
    pub fn residual(&self, id: ConstraintId) -> Option<f64> {
        self.constraints
            .get(&id)
            .map(|entry| entry.constraint.residual(&self.pool))
    }

    /// Marks `var` dirty: every constraint referring to it (directly or
    /// through a projection facade) is enqueued.
    pub fn request_resolve(&mut self, var: VarId) {
        self.enqueue_dependents(var, None);
    }

    /// Enqueues the constraints referencing `var` or any projection over
    /// it, except `skip` (the constraint that just wrote the variable).
    fn enqueue_dependents(&mut self, var: VarId, skip: Option<ConstraintId>) {
        let mut affected: SmallVec<[ConstraintId; 8]> = SmallVec::new();
        let mut collect = |ids: Option<&SmallVec<[ConstraintId; 4]>>| {
            if let Some(ids) = ids {
                for id in ids {
                    if Some(*id) != skip && !affected.contains(id) {
                        affected.push(*id);
                    }
                }
            }
        };
        collect(self.by_var.get(&var));
        for projection in self.pool.projections_over(var) {
            collect(self.by_var.get(projection));
        }
        for id in affected {
            self.enqueue(id);
        }
    }

    fn enqueue(&mut self, id: ConstraintId) {
        let Some(entry) = self.constraints.get_mut(&id) else {
            return;
        };
        entry.dirty = true;
        if entry.queued {
            return;
        }
        if entry.enqueues >= REQUEUE_CAP {
            if !entry.suppressed {
                entry.suppressed = true;
                tracing::warn!(?id, cap = REQUEUE_CAP, "constraint re-enqueue suppressed");
            }
            return;
        }
        entry.enqueues += 1;
        entry.queued = true;
        self.queue.push_back(id);
    }

    /// Picks the solve target: the operand with the lowest strength, ties
    /// broken by the lowest write serial. `REQUIRED` operands are never
    /// targets.
    fn choose_target(pool: &VarPool, operands: &[VarId]) -> Option<VarId> {
        operands
            .iter()
            .copied()
            .filter(|var| pool.strength(*var) < strength::REQUIRED)
            .min_by_key(|var| (pool.strength(*var), pool.serial(*var)))
    }

    /// Drains the dirty-constraint queue to a fixed point.
    ///
    /// Bounded by a per-pass budget of constraint-solves and a per-pass
    /// re-enqueue cap per constraint. On exhaustion the pass halts and
    /// every constraint still dirty, queued or suppressed is reported via
    /// [`VellumError::UnresolvableConstraints`]; variable state is left as
    /// last written and the call may be re-issued. At a fixed point a
    /// second call performs no writes.
    pub fn solve(&mut self, bus: &mut EventBus) -> Result<(), VellumError> {
        for entry in self.constraints.values_mut() {
            entry.enqueues = 0;
            entry.suppressed = false;
        }
        // Dirty leftovers of a previously halted pass re-enter the queue.
        let mut stragglers: Vec<ConstraintId> = Vec::new();
        for (id, entry) in &self.constraints {
            if entry.dirty && !entry.queued {
                stragglers.push(*id);
            }
        }
        stragglers.sort_unstable();
        for id in stragglers {
            if let Some(entry) = self.constraints.get_mut(&id) {
                entry.queued = true;
                entry.enqueues = 1;
                self.queue.push_back(id);
            }
        }

        let mut solves = 0usize;
        let mut non_convergent: Vec<ConstraintId> = Vec::new();
        while let Some(id) = self.queue.pop_front() {
            let Some(entry) = self.constraints.get_mut(&id) else {
                continue; // removed while queued
            };
            entry.queued = false;
            if !entry.dirty {
                continue;
            }
            if solves >= SOLVE_BUDGET {
                entry.queued = true;
                self.queue.push_front(id);
                tracing::warn!(budget = SOLVE_BUDGET, "solve budget exceeded, halting pass");
                bus.emit(&Event::Diagnostic {
                    kind: DiagnosticKind::SolveBudgetExceeded,
                    constraint: Some(id),
                    item: None,
                });
                break;
            }
            solves += 1;
            entry.dirty = false;

            let target = Self::choose_target(&self.pool, &entry.operands);
            let outcome = match target {
                Some(target) => {
                    tracing::trace!(?id, ?target, "solving constraint");
                    entry.constraint.solve_for(target, &mut self.pool, bus)
                }
                None => {
                    // All operands REQUIRED: nothing may move. Violations
                    // are reported, satisfied constraints are dropped.
                    if entry.constraint.residual(&self.pool) > EPSILON {
                        entry.dirty = true;
                    }
                    Ok(SmallVec::new())
                }
            };
            match outcome {
                Ok(changed) => {
                    if changed.is_empty() {
                        // Nothing moved: either the relation already held,
                        // or it cannot be enforced (a pinned point, a
                        // dropped projection write). Violations are
                        // reported at the end of the pass.
                        if let Some(entry) = self.constraints.get_mut(&id)
                            && entry.constraint.residual(&self.pool) > EPSILON
                        {
                            entry.dirty = true;
                        }
                    }
                    for var in changed {
                        self.enqueue_dependents(var, Some(id));
                    }
                }
                Err(VellumError::NonConvergentEquation) => {
                    if let Some(entry) = self.constraints.get_mut(&id) {
                        entry.dirty = true;
                    }
                    non_convergent.push(id);
                    tracing::warn!(?id, "equation constraint failed to bracket a root");
                    bus.emit(&Event::Diagnostic {
                        kind: DiagnosticKind::NonConvergentEquation,
                        constraint: Some(id),
                        item: None,
                    });
                }
                Err(other) => return Err(other),
            }
        }

        let mut unresolved: Vec<ConstraintId> = self
            .constraints
            .iter()
            .filter(|(_, entry)| entry.dirty || entry.queued || entry.suppressed)
            .map(|(id, _)| *id)
            .collect();
        let mut suppressed: Vec<ConstraintId> = self
            .constraints
            .iter()
            .filter(|(_, entry)| entry.suppressed)
            .map(|(id, _)| *id)
            .collect();
        suppressed.sort_unstable();
        for id in suppressed {
            bus.emit(&Event::Diagnostic {
                kind: DiagnosticKind::RequeueSuppressed,
                constraint: Some(id),
                item: None,
            });
        }
        unresolved.extend(non_convergent);
        unresolved.sort_unstable();
        unresolved.dedup();
        if unresolved.is_empty() {
            tracing::debug!(solves, "solve pass converged");
            Ok(())
        } else {
            tracing::debug!(solves, pending = unresolved.len(), "solve pass halted");
            Err(VellumError::UnresolvableConstraints(unresolved))
        }
    }
}
