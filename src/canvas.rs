use crate::connections::{Connections, DisconnectCallback};
use crate::error::VellumError;
use crate::event::{Event, EventBus, HandleFlag, LineFlag, ObserverId};
use crate::item::line::Line;
use crate::item::{Item, ItemId, Measurer, NullMeasurer, UpdateContext, View};
use crate::matrix::Matrix;
use crate::numeric::EPSILON;
use crate::solver::variable::{Position, VarId};
use crate::solver::{ConstraintId, Solver};
use crate::tree::Tree;
use ahash::{AHashMap, AHashSet};

/// The model: an ordered forest of items together with the solver that
/// keeps them consistent, the connections registry and the event bus.
///
/// All mutation runs through the canvas so that each operation emits its
/// observable event before committing, dirties the right items and
/// notifies registered views. The host triggers [`Canvas::update`] to
/// bring everything back to a consistent state.
pub struct Canvas {
    items: AHashMap<ItemId, Box<dyn Item>>,
    /// Per-item local matrices (item to parent space).
    matrices: AHashMap<ItemId, Matrix>,
    tree: Tree,
    solver: Solver,
    connections: Connections,
    bus: EventBus,
    views: Vec<Box<dyn View>>,
    dirty_items: AHashSet<ItemId>,
    dirty_matrices: AHashSet<ItemId>,
    measurer: Box<dyn Measurer>,
    updating: bool,
    next_item_id: u64,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Canvas {
    pub fn new() -> Self {
        Self {
            items: AHashMap::new(),
            matrices: AHashMap::new(),
            tree: Tree::new(),
            solver: Solver::new(),
            connections: Connections::new(),
            bus: EventBus::new(),
            views: Vec::new(),
            dirty_items: AHashSet::new(),
            dirty_matrices: AHashSet::new(),
            measurer: Box::new(NullMeasurer),
            updating: false,
            next_item_id: 0,
        }
    }

    // --- accessors -----------------------------------------------------

    pub fn solver(&self) -> &Solver {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut Solver {
        &mut self.solver
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    /// All item ids in tree (depth-first) order.
    pub fn items(&self) -> Vec<ItemId> {
        self.tree.order()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn item(&self, id: ItemId) -> Result<&dyn Item, VellumError> {
        self.items
            .get(&id)
            .map(|item| item.as_ref())
            .ok_or(VellumError::UnknownItem)
    }

    /// Typed access to a concrete item.
    pub fn item_of<T: Item>(&self, id: ItemId) -> Result<&T, VellumError> {
        self.item(id)?
            .as_any()
            .downcast_ref::<T>()
            .ok_or(VellumError::UnknownItem)
    }

    /// Runs `f` with mutable typed access to an item plus the solver and
    /// the event bus, the pieces item mutators need.
    pub fn with_item<T: Item, R>(
        &mut self,
        id: ItemId,
        f: impl FnOnce(&mut T, &mut Solver, &mut EventBus) -> R,
    ) -> Result<R, VellumError> {
        let item = self.items.get_mut(&id).ok_or(VellumError::UnknownItem)?;
        let concrete = item
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(VellumError::UnknownItem)?;
        Ok(f(concrete, &mut self.solver, &mut self.bus))
    }

    pub fn set_measurer(&mut self, measurer: Box<dyn Measurer>) {
        self.measurer = measurer;
    }

    pub fn register_view(&mut self, view: Box<dyn View>) {
        self.views.push(view);
    }

    /// Registers an observer for pre-commit events.
    pub fn add_observer(&mut self, callback: impl FnMut(&Event) + 'static) -> ObserverId {
        self.bus.observe(callback)
    }

    /// Registers a subscriber for reverter-produced inverse events.
    pub fn add_subscriber(&mut self, callback: impl FnMut(&Event) + 'static) -> ObserverId {
        self.bus.subscribe(callback)
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        self.bus.remove_observer(id)
    }

    pub fn remove_subscriber(&mut self, id: ObserverId) -> bool {
        self.bus.remove_subscriber(id)
    }

    // --- tree mutation -------------------------------------------------

    /// Adds an item at the end of `parent`'s children (or the roots).
    pub fn add(&mut self, item: impl Item, parent: Option<ItemId>) -> Result<ItemId, VellumError> {
        self.add_at(item, parent, None)
    }

    /// Adds an item at a specific sibling position.
    pub fn add_at(
        &mut self,
        item: impl Item,
        parent: Option<ItemId>,
        index: Option<usize>,
    ) -> Result<ItemId, VellumError> {
        if let Some(parent) = parent
            && !self.tree.contains(parent)
        {
            return Err(VellumError::UnknownItem);
        }
        self.next_item_id += 1;
        let id = ItemId(self.next_item_id);
        let siblings = self.tree.children(parent).len();
        let index = index.unwrap_or(siblings).min(siblings);
        self.bus.emit(&Event::ItemAdded {
            item: id,
            parent,
            index,
        });
        self.tree.add(id, parent, Some(index))?;
        let mut item: Box<dyn Item> = Box::new(item);
        item.setup(id, &mut self.solver);
        self.items.insert(id, item);
        self.matrices.insert(id, Matrix::identity());
        // Seed the i2c cache so projections created before the first
        // update read a sensible matrix.
        let i2c = match parent {
            None => Matrix::identity(),
            Some(parent) => self.solver.pool().i2c(parent),
        };
        self.solver.pool_mut().set_i2c(id, i2c);
        self.request_update(id)?;
        Ok(id)
    }

    /// Removes an item and, recursively, its descendants. Every connection
    /// in which a removed item takes part, on either side, is broken
    /// first, each disconnect callback running exactly once.
    pub fn remove(&mut self, id: ItemId) -> Result<(), VellumError> {
        if !self.tree.contains(id) {
            return Err(VellumError::UnknownItem);
        }
        let mut order = self.tree.descendants(id);
        order.reverse(); // leaves first
        order.push(id);
        for target in order {
            self.connections
                .disconnect_item(&mut self.solver, &mut self.bus, target);
            let parent = self.tree.parent(target);
            let index = self.tree.index_of(target).unwrap_or(0);
            self.bus.emit(&Event::ItemRemoved {
                item: target,
                parent,
                index,
            });
            if let Some(mut item) = self.items.remove(&target) {
                item.teardown(&mut self.solver);
            }
            let _ = self.tree.remove_leaf(target);
            self.matrices.remove(&target);
            self.solver.pool_mut().forget_item(target);
            self.dirty_items.remove(&target);
            self.dirty_matrices.remove(&target);
        }
        Ok(())
    }

    /// Moves an item (and its subtree) under a new parent. The emitted
    /// event records the previous parent and sibling index, so replaying
    /// its inverse restores the original position.
    pub fn reparent(
        &mut self,
        id: ItemId,
        parent: Option<ItemId>,
        index: Option<usize>,
    ) -> Result<(), VellumError> {
        if !self.tree.contains(id) {
            return Err(VellumError::UnknownItem);
        }
        if let Some(parent) = parent {
            if !self.tree.contains(parent) {
                return Err(VellumError::UnknownItem);
            }
            if parent == id || self.tree.ancestors(parent).contains(&id) {
                return Err(VellumError::CyclicReparent);
            }
        }
        let old_parent = self.tree.parent(id);
        let old_index = self.tree.index_of(id).ok_or(VellumError::UnknownItem)?;
        let mut slots = self.tree.children(parent).len();
        if old_parent == parent {
            slots -= 1;
        }
        let index = index.unwrap_or(slots).min(slots);
        self.bus.emit(&Event::ItemReparented {
            item: id,
            parent,
            index,
            old_parent,
            old_index,
        });
        self.tree.reparent(id, parent, Some(index))?;
        // The whole subtree's canvas-to-item matrices are stale now.
        self.dirty_matrices.insert(id);
        self.request_update(id)
    }

    // --- matrices ------------------------------------------------------

    /// The item's local (item-to-parent) matrix.
    pub fn matrix(&self, id: ItemId) -> Result<Matrix, VellumError> {
        self.matrices
            .get(&id)
            .copied()
            .ok_or(VellumError::UnknownItem)
    }

    /// The item's cached item-to-canvas matrix.
    pub fn matrix_i2c(&self, id: ItemId) -> Matrix {
        self.solver.pool().i2c(id)
    }

    /// Replaces the item's local matrix, emitting the change before it
    /// commits and scheduling a matrix refresh.
    pub fn set_matrix(&mut self, id: ItemId, matrix: Matrix) -> Result<(), VellumError> {
        let old = self.matrix(id)?;
        if matrix == old {
            return Ok(());
        }
        self.bus.emit(&Event::MatrixSet {
            item: id,
            matrix,
            old,
        });
        self.matrices.insert(id, matrix);
        self.dirty_matrices.insert(id);
        self.dirty_items.insert(id);
        self.notify_views(&[id], true);
        Ok(())
    }

    /// Edits the item's local matrix in place.
    pub fn transform(
        &mut self,
        id: ItemId,
        f: impl FnOnce(&mut Matrix),
    ) -> Result<(), VellumError> {
        let mut matrix = self.matrix(id)?;
        f(&mut matrix);
        self.set_matrix(id, matrix)
    }

    /// Translates the item in its parent's space.
    pub fn translate(&mut self, id: ItemId, dx: f64, dy: f64) -> Result<(), VellumError> {
        self.transform(id, |matrix| matrix.translate(dx, dy))
    }

    // --- variables and handles -----------------------------------------

    /// Assigns a variable through the canvas, so the event bus sees it.
    pub fn set_var(&mut self, var: VarId, value: f64) {
        self.solver.set_value(&mut self.bus, var, value);
    }

    /// Moves a handle to `point` in item-local coordinates and requests
    /// an update.
    pub fn move_handle(
        &mut self,
        item: ItemId,
        handle: usize,
        point: (f64, f64),
    ) -> Result<(), VellumError> {
        let pos = self.handle_pos(item, handle)?;
        self.solver.set_point(&mut self.bus, pos, point);
        self.request_update(item)
    }

    fn handle_pos(&self, item: ItemId, handle: usize) -> Result<Position, VellumError> {
        Ok(self
            .item(item)?
            .handles()
            .get(handle)
            .ok_or(VellumError::UnknownHandle(handle))?
            .pos)
    }

    /// Sets a handle flag, emitting [`Event::HandleFlagSet`] with the
    /// previous value. Setting a flag to its current value is a no-op.
    pub fn set_handle_flag(
        &mut self,
        item: ItemId,
        handle: usize,
        flag: HandleFlag,
        value: bool,
    ) -> Result<(), VellumError> {
        let old = self
            .item(item)?
            .handles()
            .get(handle)
            .ok_or(VellumError::UnknownHandle(handle))?
            .flag(flag);
        if old == value {
            return Ok(());
        }
        self.bus.emit(&Event::HandleFlagSet {
            item,
            handle,
            flag,
            value,
            old,
        });
        if let Some(owner) = self.items.get_mut(&item)
            && let Some(handle) = owner.handles_mut().get_mut(handle)
        {
            handle.set_flag(flag, value);
        }
        Ok(())
    }

    /// Toggles a [`Line`]'s orthogonal flag. The internal constraints are
    /// rebuilt during the next update cycle.
    pub fn set_orthogonal(&mut self, item: ItemId, value: bool) -> Result<(), VellumError> {
        self.set_line_flag(item, LineFlag::Orthogonal, value)
    }

    /// Toggles a [`Line`]'s horizontal flag (first segment horizontal).
    pub fn set_horizontal(&mut self, item: ItemId, value: bool) -> Result<(), VellumError> {
        self.set_line_flag(item, LineFlag::Horizontal, value)
    }

    fn set_line_flag(
        &mut self,
        item: ItemId,
        flag: LineFlag,
        value: bool,
    ) -> Result<(), VellumError> {
        let line = self
            .items
            .get_mut(&item)
            .ok_or(VellumError::UnknownItem)?
            .as_any_mut()
            .downcast_mut::<Line>()
            .ok_or(VellumError::UnknownItem)?;
        let old = match flag {
            LineFlag::Orthogonal => line.is_orthogonal(),
            LineFlag::Horizontal => line.is_horizontal(),
        };
        if old == value {
            return Ok(());
        }
        self.bus.emit(&Event::LineFlagSet {
            item,
            flag,
            value,
            old,
        });
        match flag {
            LineFlag::Orthogonal => line.set_orthogonal_flag(value),
            LineFlag::Horizontal => line.set_horizontal_flag(value),
        }
        self.request_update(item)
    }

    // --- connections ---------------------------------------------------

    /// Finds the port of `connected` closest to a handle of `item`,
    /// returning the port index and the glue distance in `connected`'s
    /// local space.
    pub fn glue(
        &self,
        item: ItemId,
        handle: usize,
        connected: ItemId,
    ) -> Result<(usize, f64), VellumError> {
        let pos = self.handle_pos(item, handle)?;
        let common = self.matrix_i2c(item).transform_point(self.solver.point(pos));
        let local = self.matrix_i2c(connected).invert()?.transform_point(common);
        let target = self.item(connected)?;
        let mut best: Option<(usize, f64)> = None;
        for (index, port) in target.ports().iter().enumerate() {
            let (_, distance) = port.glue(&self.solver, local);
            if best.is_none_or(|(_, closest)| distance < closest) {
                best = Some((index, distance));
            }
        }
        best.ok_or(VellumError::UnknownPort(0))
    }

    /// Glues `handle` of `item` to `port` of `connected`: builds the
    /// pinning constraint in common coordinates and registers the
    /// connection. A handle holds at most one connection; connecting an
    /// already-connected handle is rejected without side effect.
    pub fn connect(
        &mut self,
        item: ItemId,
        handle: usize,
        connected: ItemId,
        port: usize,
        callback: Option<DisconnectCallback>,
    ) -> Result<ConstraintId, VellumError> {
        let handle_pos = self.handle_pos(item, handle)?;
        let port_shape = *self
            .item(connected)?
            .ports()
            .get(port)
            .ok_or(VellumError::UnknownPort(port))?;
        if self.connections.get_connection(item, handle).is_some() {
            return Err(VellumError::DuplicateConnection { item, handle });
        }
        let constraint = port_shape.constraint(&mut self.solver, item, handle_pos, connected);
        let id = self.connections.connect(
            &mut self.solver,
            &mut self.bus,
            item,
            handle,
            connected,
            port,
            constraint,
            callback,
        )?;
        self.dirty_items.insert(item);
        self.notify_views(&[item], false);
        Ok(id)
    }

    /// Like [`Canvas::connect`], but picks the nearest port of `connected`.
    pub fn connect_nearest(
        &mut self,
        item: ItemId,
        handle: usize,
        connected: ItemId,
        callback: Option<DisconnectCallback>,
    ) -> Result<ConstraintId, VellumError> {
        let (port, _) = self.glue(item, handle, connected)?;
        self.connect(item, handle, connected, port, callback)
    }

    /// Breaks the connection held by `handle` of `item`.
    pub fn disconnect(&mut self, item: ItemId, handle: usize) -> Result<(), VellumError> {
        self.connections
            .disconnect(&mut self.solver, &mut self.bus, item, handle)
    }

    // --- update pipeline -----------------------------------------------

    /// Flags an item for the next update cycle and notifies views.
    pub fn request_update(&mut self, id: ItemId) -> Result<(), VellumError> {
        if !self.items.contains_key(&id) {
            return Err(VellumError::UnknownItem);
        }
        self.dirty_items.insert(id);
        self.notify_views(&[id], false);
        Ok(())
    }

    /// Flags an item for a matrix-only refresh.
    pub fn request_matrix_update(&mut self, id: ItemId) -> Result<(), VellumError> {
        if !self.items.contains_key(&id) {
            return Err(VellumError::UnknownItem);
        }
        self.dirty_matrices.insert(id);
        self.notify_views(&[id], true);
        Ok(())
    }

    fn notify_views(&mut self, items: &[ItemId], matrix_only: bool) {
        for view in &mut self.views {
            view.request_update(items, matrix_only);
        }
    }

    /// Runs the update cycle: pre-update hooks, matrix refresh, constraint
    /// resolution, normalization, a second refresh for normalized items
    /// and post-update hooks.
    ///
    /// Afterwards every registered constraint holds within tolerance or
    /// was reported via the returned error, every item's item-to-canvas
    /// matrix is current and the dirty sets are empty. Re-entering from an
    /// observer callback is rejected.
    pub fn update(&mut self) -> Result<(), VellumError> {
        if self.updating {
            return Err(VellumError::ReentrantUpdate);
        }
        self.updating = true;
        let result = self.run_update();
        self.updating = false;
        result
    }

    fn run_update(&mut self) -> Result<(), VellumError> {
        // 1. Pre-update, in tree order. Items may request further updates;
        // those join the dirty set and are processed in turn.
        let mut visited: AHashSet<ItemId> = AHashSet::new();
        loop {
            let batch: Vec<ItemId> = self
                .tree
                .order()
                .into_iter()
                .filter(|id| self.dirty_items.contains(id) && !visited.contains(id))
                .collect();
            if batch.is_empty() {
                break;
            }
            for id in batch {
                visited.insert(id);
                for request in self.call_pre_update(id) {
                    if self.items.contains_key(&request) {
                        self.dirty_items.insert(request);
                    }
                }
            }
        }

        // 2. Refresh stale item-to-canvas matrices and dirty every
        // constraint reading through them.
        let stale: Vec<ItemId> = self.dirty_matrices.drain().collect();
        self.refresh_matrices(&stale);

        // 3. Resolve.
        let solved = self.solver.solve(&mut self.bus);

        // Items the solver moved join the dirty set for normalization and
        // post-update.
        self.absorb_solver_motion();

        // 4. + 5. Normalize off-origin items, refresh their matrices and
        // drain the compensating writes (they resolve to no-ops).
        let normalized = self.normalize();
        if !normalized.is_empty() {
            self.refresh_matrices(&normalized);
            let _ = self.solver.solve(&mut self.bus);
        }

        // 6. Post-update in tree order.
        let batch: Vec<ItemId> = self
            .tree
            .order()
            .into_iter()
            .filter(|id| self.dirty_items.contains(id))
            .collect();
        for id in batch {
            self.call_post_update(id);
        }

        self.dirty_items.clear();
        self.dirty_matrices.clear();
        self.solver.pool_mut().take_changed();
        solved
    }

    fn call_pre_update(&mut self, id: ItemId) -> Vec<ItemId> {
        let Some(item) = self.items.get_mut(&id) else {
            return Vec::new();
        };
        let mut ctx = UpdateContext::new(id, &mut self.solver, &mut self.bus, self.measurer.as_ref());
        match item.pre_update(&mut ctx) {
            Ok(()) => ctx.take_requests(),
            Err(error) => {
                tracing::warn!(?id, %error, "pre_update failed; item marked clean");
                self.dirty_items.remove(&id);
                Vec::new()
            }
        }
    }

    fn call_post_update(&mut self, id: ItemId) {
        let Some(item) = self.items.get_mut(&id) else {
            return;
        };
        let mut ctx = UpdateContext::new(id, &mut self.solver, &mut self.bus, self.measurer.as_ref());
        if let Err(error) = item.post_update(&mut ctx) {
            tracing::warn!(?id, %error, "post_update failed");
        }
    }

    /// Recomputes the item-to-canvas matrix of every listed item and its
    /// descendants as the composition from the root, then re-enqueues every
    /// constraint referencing a projection bound to a refreshed matrix.
    fn refresh_matrices(&mut self, changed: &[ItemId]) {
        let mut stale: AHashSet<ItemId> = AHashSet::new();
        for id in changed {
            if !self.items.contains_key(id) {
                continue;
            }
            stale.insert(*id);
            stale.extend(self.tree.descendants(*id));
        }
        if stale.is_empty() {
            return;
        }
        for id in self.tree.order() {
            if !stale.contains(&id) {
                continue;
            }
            let parent_i2c = match self.tree.parent(id) {
                None => Matrix::identity(),
                Some(parent) => self.solver.pool().i2c(parent),
            };
            let local = self.matrices.get(&id).copied().unwrap_or_default();
            self.solver.pool_mut().set_i2c(id, parent_i2c.composed(&local));
            let projections: Vec<VarId> = self.solver.pool().projections_of(id).to_vec();
            for projection in projections {
                self.solver.request_resolve(projection);
            }
        }
    }

    /// Adds every item whose handle variables the solver wrote to the
    /// dirty set.
    fn absorb_solver_motion(&mut self) {
        let changed: AHashSet<VarId> = self.solver.pool_mut().take_changed().into_iter().collect();
        if changed.is_empty() {
            return;
        }
        for id in self.tree.order() {
            if self.dirty_items.contains(&id) {
                continue;
            }
            let Some(item) = self.items.get(&id) else {
                continue;
            };
            let moved = item
                .handles()
                .iter()
                .any(|handle| changed.contains(&handle.pos.x) || changed.contains(&handle.pos.y));
            if moved {
                self.dirty_items.insert(id);
            }
        }
    }

    /// Pins every dirty item's first handle to its local origin by
    /// shifting the offset into the item's matrix and moving all handles
    /// back. Returns the items whose matrices changed.
    fn normalize(&mut self) -> Vec<ItemId> {
        let mut normalized = Vec::new();
        for id in self.tree.order() {
            if !self.dirty_items.contains(&id) {
                continue;
            }
            let Some(item) = self.items.get(&id) else {
                continue;
            };
            let Some(first) = item.handles().first() else {
                continue;
            };
            let (dx, dy) = self.solver.point(first.pos);
            if dx.abs() <= EPSILON && dy.abs() <= EPSILON {
                continue;
            }
            let positions: Vec<Position> =
                item.handles().iter().map(|handle| handle.pos).collect();
            let old = self.matrices.get(&id).copied().unwrap_or_default();
            let mut matrix = old;
            matrix.translate(dx, dy);
            self.bus.emit(&Event::MatrixSet {
                item: id,
                matrix,
                old,
            });
            self.matrices.insert(id, matrix);
            for pos in positions {
                let (x, y) = self.solver.point(pos);
                self.solver.set_point(&mut self.bus, pos, (x - dx, y - dy));
            }
            normalized.push(id);
        }
        normalized
    }

    // --- event replay --------------------------------------------------

    /// Executes an event as an operation, the replay half of the undo
    /// contract: record inverse events from a subscriber, then apply them
    /// in reverse order to roll back.
    ///
    /// `ItemAdded` cannot be applied (the item payload cannot travel in a
    /// value event) and is rejected with [`VellumError::UnknownItem`];
    /// diagnostics apply as no-ops.
    pub fn apply(&mut self, event: &Event) -> Result<(), VellumError> {
        match event {
            Event::VariableSet { var, value, .. } => {
                self.solver.set_value(&mut self.bus, *var, *value);
                Ok(())
            }
            Event::MatrixSet { item, matrix, .. } => self.set_matrix(*item, *matrix),
            Event::ItemAdded { .. } => Err(VellumError::UnknownItem),
            Event::ItemRemoved { item, .. } => self.remove(*item),
            Event::ItemReparented {
                item,
                parent,
                index,
                ..
            } => self.reparent(*item, *parent, Some(*index)),
            Event::HandleConnected {
                item,
                handle,
                connected,
                port,
            } => self
                .connect(*item, *handle, *connected, *port, None)
                .map(|_| ()),
            Event::HandleDisconnected { item, handle, .. } => self.disconnect(*item, *handle),
            Event::HandleFlagSet {
                item,
                handle,
                flag,
                value,
                ..
            } => self.set_handle_flag(*item, *handle, *flag, *value),
            Event::LineFlagSet {
                item, flag, value, ..
            } => self.set_line_flag(*item, *flag, *value),
            Event::Diagnostic { .. } => Ok(()),
        }
    }
}
