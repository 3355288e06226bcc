use crate::error::VellumError;
use crate::event::{Event, EventBus};
use crate::item::ItemId;
use crate::solver::constraint::Constraint;
use crate::solver::{ConstraintId, Solver};
use ahash::AHashMap;
use std::collections::BTreeMap;

/// Host callback invoked exactly once when a connection is broken. Must be
/// idempotent from the host's point of view; the registry guarantees the
/// single invocation.
pub type DisconnectCallback = Box<dyn FnMut()>;

/// One glued handle: `(item, handle)` pinned to `port` of `connected`
/// under `constraint`.
pub struct Connection {
    pub item: ItemId,
    pub handle: usize,
    pub connected: ItemId,
    pub port: usize,
    pub constraint: ConstraintId,
    callback: Option<DisconnectCallback>,
}

/// Registry of every connection on the canvas.
///
/// Connections live here and only here, keyed by item id; items carry no
/// back-pointers, so breaking every link of a removed item is a pure
/// registry operation. At most one record exists per `(item, handle)`.
#[derive(Default)]
pub struct Connections {
    records: BTreeMap<(ItemId, usize), Connection>,
    /// Reverse index: records in which an item is the connected side.
    by_connected: AHashMap<ItemId, Vec<(ItemId, usize)>>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The record gluing `handle` of `item`, if any.
    pub fn get_connection(&self, item: ItemId, handle: usize) -> Option<&Connection> {
        self.records.get(&(item, handle))
    }

    /// Records in which `item` is the connecting side, handle order.
    pub fn connections_of(&self, item: ItemId) -> impl Iterator<Item = &Connection> {
        self.records
            .range((item, 0)..=(item, usize::MAX))
            .map(|(_, record)| record)
    }

    /// Constraints anchored to `item`, for prioritized resolution.
    pub fn solvable_constraints(&self, item: ItemId) -> Vec<ConstraintId> {
        self.connections_of(item)
            .map(|record| record.constraint)
            .collect()
    }

    /// Registers the constraint with the solver and records the
    /// connection. A handle can hold one connection at a time; callers
    /// must disconnect before re-connecting.
    #[allow(clippy::too_many_arguments)]
    pub fn connect(
        &mut self,
        solver: &mut Solver,
        bus: &mut EventBus,
        item: ItemId,
        handle: usize,
        connected: ItemId,
        port: usize,
        constraint: Constraint,
        callback: Option<DisconnectCallback>,
    ) -> Result<ConstraintId, VellumError> {
        if self.records.contains_key(&(item, handle)) {
            return Err(VellumError::DuplicateConnection { item, handle });
        }
        bus.emit(&Event::HandleConnected {
            item,
            handle,
            connected,
            port,
        });
        let constraint = solver.add_constraint(constraint);
        self.records.insert(
            (item, handle),
            Connection {
                item,
                handle,
                connected,
                port,
                constraint,
                callback,
            },
        );
        self.by_connected
            .entry(connected)
            .or_default()
            .push((item, handle));
        Ok(constraint)
    }

    /// Breaks the connection of `handle` on `item`: the constraint leaves
    /// the solver, the disconnect callback runs exactly once and the
    /// record is dropped.
    pub fn disconnect(
        &mut self,
        solver: &mut Solver,
        bus: &mut EventBus,
        item: ItemId,
        handle: usize,
    ) -> Result<(), VellumError> {
        let (connected, port) = match self.records.get(&(item, handle)) {
            Some(record) => (record.connected, record.port),
            None => return Err(VellumError::UnknownItem),
        };
        bus.emit(&Event::HandleDisconnected {
            item,
            handle,
            connected,
            port,
        });
        let Some(mut record) = self.records.remove(&(item, handle)) else {
            return Err(VellumError::UnknownItem);
        };
        if let Some(reverse) = self.by_connected.get_mut(&record.connected) {
            reverse.retain(|key| *key != (item, handle));
            if reverse.is_empty() {
                self.by_connected.remove(&record.connected);
            }
        }
        let _ = solver.remove_constraint(record.constraint);
        if let Some(mut callback) = record.callback.take() {
            callback();
        }
        Ok(())
    }

    /// Breaks every connection in which `item` takes part, on either side.
    /// Called by the canvas when an item leaves the tree.
    pub(crate) fn disconnect_item(
        &mut self,
        solver: &mut Solver,
        bus: &mut EventBus,
        item: ItemId,
    ) {
        let mut keys: Vec<(ItemId, usize)> = self
            .records
            .range((item, 0)..=(item, usize::MAX))
            .map(|(key, _)| *key)
            .collect();
        if let Some(reverse) = self.by_connected.get(&item) {
            keys.extend(reverse.iter().copied());
        }
        keys.sort_unstable();
        keys.dedup();
        for (record_item, handle) in keys {
            let _ = self.disconnect(solver, bus, record_item, handle);
        }
    }
}
