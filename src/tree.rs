use crate::error::VellumError;
use crate::item::ItemId;
use ahash::{AHashMap, AHashSet};

/// An ordered forest of item ids.
///
/// Siblings keep their insertion order and iteration is depth-first and
/// stable, which is the canonical order everything else (update passes,
/// matrix composition, rendering hosts) relies on. The tree stores ids
/// only; items themselves live in the canvas store.
#[derive(Default)]
pub struct Tree {
    roots: Vec<ItemId>,
    children: AHashMap<ItemId, Vec<ItemId>>,
    parents: AHashMap<ItemId, ItemId>,
    nodes: AHashSet<ItemId>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, item: ItemId) -> bool {
        self.nodes.contains(&item)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent(&self, item: ItemId) -> Option<ItemId> {
        self.parents.get(&item).copied()
    }

    /// Direct children of `item` in sibling order. `None` lists the roots.
    pub fn children(&self, item: Option<ItemId>) -> &[ItemId] {
        match item {
            None => &self.roots,
            Some(id) => self
                .children
                .get(&id)
                .map(|children| children.as_slice())
                .unwrap_or(&[]),
        }
    }

    /// Position of `item` among its siblings.
    pub fn index_of(&self, item: ItemId) -> Option<usize> {
        if !self.contains(item) {
            return None;
        }
        self.children(self.parent(item))
            .iter()
            .position(|sibling| *sibling == item)
    }

    /// Ancestors of `item`, nearest first.
    pub fn ancestors(&self, item: ItemId) -> Vec<ItemId> {
        let mut chain = Vec::new();
        let mut current = item;
        while let Some(parent) = self.parent(current) {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// All ids in depth-first order.
    pub fn order(&self) -> Vec<ItemId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        for root in &self.roots {
            self.walk(*root, &mut order);
        }
        order
    }

    /// Descendants of `item` in depth-first order, excluding `item`.
    pub fn descendants(&self, item: ItemId) -> Vec<ItemId> {
        let mut order = Vec::new();
        for child in self.children(Some(item)) {
            self.walk(*child, &mut order);
        }
        order
    }

    fn walk(&self, item: ItemId, order: &mut Vec<ItemId>) {
        order.push(item);
        for child in self.children(Some(item)) {
            self.walk(*child, order);
        }
    }

    /// Inserts `item` under `parent` (or as a root) at `index`, clamped to
    /// the sibling count. Returns the actual index used.
    pub fn add(
        &mut self,
        item: ItemId,
        parent: Option<ItemId>,
        index: Option<usize>,
    ) -> Result<usize, VellumError> {
        if let Some(parent) = parent
            && !self.contains(parent)
        {
            return Err(VellumError::UnknownItem);
        }
        let siblings = match parent {
            None => &mut self.roots,
            Some(parent) => self.children.entry(parent).or_default(),
        };
        let index = index.unwrap_or(siblings.len()).min(siblings.len());
        siblings.insert(index, item);
        if let Some(parent) = parent {
            self.parents.insert(item, parent);
        }
        self.nodes.insert(item);
        Ok(index)
    }

    /// Removes a single node; the caller is responsible for removing its
    /// descendants first (the canvas does, leaves inward).
    pub(crate) fn remove_leaf(&mut self, item: ItemId) -> Result<(), VellumError> {
        if !self.contains(item) {
            return Err(VellumError::UnknownItem);
        }
        debug_assert!(self.children(Some(item)).is_empty());
        match self.parent(item) {
            None => self.roots.retain(|root| *root != item),
            Some(parent) => {
                if let Some(siblings) = self.children.get_mut(&parent) {
                    siblings.retain(|sibling| *sibling != item);
                }
            }
        }
        self.children.remove(&item);
        self.parents.remove(&item);
        self.nodes.remove(&item);
        Ok(())
    }

    /// Moves `item` under `parent` at `index`. Returns the previous
    /// `(parent, index)` pair. Reparenting an item under itself or one of
    /// its descendants is rejected.
    pub fn reparent(
        &mut self,
        item: ItemId,
        parent: Option<ItemId>,
        index: Option<usize>,
    ) -> Result<(Option<ItemId>, usize), VellumError> {
        if !self.contains(item) {
            return Err(VellumError::UnknownItem);
        }
        if let Some(parent) = parent {
            if !self.contains(parent) {
                return Err(VellumError::UnknownItem);
            }
            if parent == item || self.ancestors(parent).contains(&item) {
                return Err(VellumError::CyclicReparent);
            }
        }
        let old_parent = self.parent(item);
        let old_index = self
            .index_of(item)
            .ok_or(VellumError::UnknownItem)?;
        match old_parent {
            None => {
                self.roots.retain(|root| *root != item);
            }
            Some(old) => {
                if let Some(siblings) = self.children.get_mut(&old) {
                    siblings.retain(|sibling| *sibling != item);
                }
                self.parents.remove(&item);
            }
        }
        let siblings = match parent {
            None => &mut self.roots,
            Some(parent) => self.children.entry(parent).or_default(),
        };
        let index = index.unwrap_or(siblings.len()).min(siblings.len());
        siblings.insert(index, item);
        if let Some(parent) = parent {
            self.parents.insert(item, parent);
        }
        Ok((old_parent, old_index))
    }
}
