//! Node arena and id maps behind the [`Manager`](crate::manager::Manager).
//!
//! Every live unit has exactly one [`AssemblerNode`]; so does every child slot
//! that was attached but not constructed yet. Nodes sit in a slab and refer to
//! each other by key: a parent lists its children in its slot maps and owns
//! them, a child only remembers its parent's key.

pub mod activation;
pub mod lifecycle;

use std::{collections::HashMap, sync::Arc};

use indexmap::IndexMap;
use slab::Slab;

use crate::{
    consts::PROPS,
    prelude::{Collaborator, Result, RuntimeError},
    registry::{TypeName, TypeRecord},
    unit::{Dependency, Props, Unit, UnitId},
};

pub(crate) type NodeKey = usize;

pub(crate) struct ActiveChild {
    pub node: NodeKey,
    pub unit: Arc<Unit>,
}

pub(crate) struct AssemblerNode {
    pub type_name: TypeName,
    pub parent: Option<NodeKey>,
    /// Set once the node has been activated.
    pub unit: Option<UnitId>,
    pub active_children: IndexMap<TypeName, ActiveChild>,
    pub pending_children: IndexMap<TypeName, NodeKey>,
    pub supplied_params: HashMap<TypeName, Props>,
}

impl AssemblerNode {
    fn new(type_name: TypeName, parent: Option<NodeKey>) -> Self {
        Self {
            type_name,
            parent,
            unit: None,
            active_children: IndexMap::new(),
            pending_children: IndexMap::new(),
            supplied_params: HashMap::new(),
        }
    }

    pub fn occupies(&self, child: &str) -> bool {
        self.active_children.contains_key(child) || self.pending_children.contains_key(child)
    }

    /// Every dependency is either `PROPS` or an active sibling.
    pub fn can_activate(&self, record: &TypeRecord) -> bool {
        record
            .dependencies()
            .iter()
            .all(|dep| &**dep == PROPS || self.active_children.contains_key(dep))
    }

    pub fn missing(&self, record: &TypeRecord) -> Vec<TypeName> {
        record
            .dependencies()
            .iter()
            .filter(|dep| &***dep != PROPS && !self.active_children.contains_key(&***dep))
            .cloned()
            .collect()
    }

    /// Dependency values for `record` as a child of this node, in declared order.
    pub fn resolve(&self, record: &TypeRecord) -> Vec<Dependency> {
        record
            .dependencies()
            .iter()
            .map(|dep| match self.active_children.get(dep) {
                Some(active) if &**dep != PROPS => Dependency::Unit(active.unit.clone()),
                _ => Dependency::Props(
                    self.supplied_params
                        .get(record.name())
                        .cloned()
                        .unwrap_or_default(),
                ),
            })
            .collect()
    }
}

pub(crate) enum Slot {
    Created(NodeKey),
    Occupied,
}

/// Diagnostic view of a child slot that has not been constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalledChild {
    pub parent: UnitId,
    pub type_name: TypeName,
    /// Sibling types that are not active yet. Empty means the slot only waits for activation to run.
    pub missing: Vec<TypeName>,
}

#[derive(Default)]
pub(crate) struct Tree {
    nodes: Slab<AssemblerNode>,
    id_to_unit: HashMap<UnitId, Arc<Unit>>,
    id_to_node: HashMap<UnitId, NodeKey>,
}

impl Tree {
    pub fn node(&self, key: NodeKey) -> Option<&AssemblerNode> {
        self.nodes.get(key)
    }

    pub fn key_of(&self, id: &str) -> Option<NodeKey> {
        self.id_to_node.get(id).copied()
    }

    pub fn node_of(&self, id: &str) -> Option<&AssemblerNode> {
        self.key_of(id).and_then(|key| self.nodes.get(key))
    }

    pub fn unit(&self, id: &str) -> Option<&Arc<Unit>> {
        self.id_to_unit.get(id)
    }

    /// Unit held by the node at `key`, if it was activated.
    pub fn unit_at(&self, key: NodeKey) -> Option<&Arc<Unit>> {
        let id = self.nodes.get(key)?.unit.as_ref()?;
        self.id_to_unit.get(id)
    }

    pub fn len(&self) -> usize {
        self.id_to_unit.len()
    }

    pub fn insert_root(&mut self, unit: Arc<Unit>) -> Result<NodeKey> {
        self.ensure_fresh(unit.id(), unit.type_name())?;
        let mut node = AssemblerNode::new(unit.type_name().into(), None);
        node.unit = Some(unit.id().clone());
        let key = self.nodes.insert(node);
        self.id_to_node.insert(unit.id().clone(), key);
        self.id_to_unit.insert(unit.id().clone(), unit);
        Ok(key)
    }

    /// Reserve a pending slot for `child` under `parent`.
    pub fn attach(&mut self, parent: NodeKey, child: TypeName) -> Result<Slot> {
        let occupied = self
            .nodes
            .get(parent)
            .ok_or_else(|| missing_node(parent))?
            .occupies(&child);
        if occupied {
            return Ok(Slot::Occupied);
        }
        let key = self
            .nodes
            .insert(AssemblerNode::new(child.clone(), Some(parent)));
        self.nodes[parent].pending_children.insert(child, key);
        Ok(Slot::Created(key))
    }

    pub fn supply(&mut self, parent: NodeKey, child: TypeName, props: Props) -> Result<()> {
        let node = self
            .nodes
            .get_mut(parent)
            .ok_or_else(|| missing_node(parent))?;
        node.supplied_params.insert(child, props);
        Ok(())
    }

    /// Move the pending slot of `record` under `parent` to the active map.
    ///
    /// Returns `Ok(None)` when the slot no longer holds `key` or a dependency
    /// left the active map, which happens if either was destroyed while the
    /// unit was being built.
    pub fn promote(
        &mut self,
        parent: NodeKey,
        record: &TypeRecord,
        key: NodeKey,
        unit: Arc<Unit>,
    ) -> Result<Option<NodeKey>> {
        let child = record.name();
        let Some(parent_node) = self.nodes.get(parent) else {
            return Ok(None);
        };
        let still_pending = parent_node
            .pending_children
            .get(child)
            .is_some_and(|pending| *pending == key);
        if !still_pending || !parent_node.can_activate(record) {
            return Ok(None);
        }
        self.ensure_fresh(unit.id(), child)?;

        let parent_node = &mut self.nodes[parent];
        let (type_name, _) = parent_node
            .pending_children
            .shift_remove_entry(child)
            .ok_or_else(|| missing_node(key))?;
        parent_node.active_children.insert(
            type_name,
            ActiveChild {
                node: key,
                unit: unit.clone(),
            },
        );
        self.nodes[key].unit = Some(unit.id().clone());
        self.id_to_node.insert(unit.id().clone(), key);
        self.id_to_unit.insert(unit.id().clone(), unit);
        Ok(Some(key))
    }

    /// Remove the unit `id`, everything its node owns, and its slot in the parent.
    ///
    /// Removed units are returned parent first. Unknown ids remove nothing.
    pub fn remove(&mut self, id: &str) -> Vec<Arc<Unit>> {
        let Some(key) = self.key_of(id) else {
            return Vec::new();
        };

        let (parent, type_name) = {
            let node = &self.nodes[key];
            (node.parent, node.type_name.clone())
        };
        if let Some(parent_node) = parent.and_then(|p| self.nodes.get_mut(p)) {
            if parent_node
                .active_children
                .get(&type_name)
                .is_some_and(|a| a.node == key)
            {
                parent_node.active_children.shift_remove(&type_name);
            }
            if parent_node.pending_children.get(&type_name) == Some(&key) {
                parent_node.pending_children.shift_remove(&type_name);
            }
        }

        let mut removed = Vec::new();
        let mut stack = vec![key];
        while let Some(key) = stack.pop() {
            if !self.nodes.contains(key) {
                continue;
            }
            let node = self.nodes.remove(key);
            // Reversed so the first attached child is handled first.
            stack.extend(node.pending_children.values().rev().copied());
            stack.extend(node.active_children.values().rev().map(|a| a.node));
            if let Some(id) = node.unit {
                self.id_to_node.remove(&id);
                if let Some(unit) = self.id_to_unit.remove(&id) {
                    removed.push(unit);
                }
            }
        }
        removed
    }

    pub fn pending(&self, key: NodeKey) -> Vec<TypeName> {
        self.nodes
            .get(key)
            .map(|n| n.pending_children.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn stalled(&self, records: impl Fn(&str) -> Option<Arc<TypeRecord>>) -> Vec<StalledChild> {
        let mut stalled = Vec::new();
        for (_, node) in self.nodes.iter() {
            let Some(parent) = node.unit.as_ref() else {
                continue;
            };
            for type_name in node.pending_children.keys() {
                let missing = records(&**type_name)
                    .map(|record| node.missing(&record))
                    .unwrap_or_default();
                stalled.push(StalledChild {
                    parent: parent.clone(),
                    type_name: type_name.clone(),
                    missing,
                });
            }
        }
        stalled
    }

    /// Remove every root with its subtree, then anything left over.
    ///
    /// Removed units are returned parent first, root by root.
    pub fn drain(&mut self) -> Vec<Arc<Unit>> {
        let roots: Vec<UnitId> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .filter_map(|(_, node)| node.unit.clone())
            .collect();
        let mut removed = Vec::new();
        for root in roots {
            removed.extend(self.remove(root.as_str()));
        }
        removed.extend(self.id_to_unit.drain().map(|(_, unit)| unit));
        self.nodes.clear();
        self.id_to_node.clear();
        removed
    }

    fn ensure_fresh(&self, id: &UnitId, type_name: &str) -> Result<()> {
        if self.id_to_node.contains_key(id) || self.id_to_unit.contains_key(id) {
            return Err(RuntimeError::integration(
                Collaborator::Identity,
                type_name,
                format!("id {id} is already in use"),
            ));
        }
        Ok(())
    }

    /// Both id maps agree and every activated node sits in its parent's active map.
    #[cfg(test)]
    pub fn is_consistent(&self) -> bool {
        if self.id_to_unit.len() != self.id_to_node.len() {
            return false;
        }
        self.id_to_node.iter().all(|(id, key)| {
            let Some(node) = self.nodes.get(*key) else {
                return false;
            };
            if node.unit.as_ref() != Some(id) || !self.id_to_unit.contains_key(id) {
                return false;
            }
            match node.parent {
                None => true,
                Some(parent) => self.nodes.get(parent).is_some_and(|p| {
                    p.active_children
                        .get(&node.type_name)
                        .is_some_and(|a| a.node == *key)
                        && !p.pending_children.contains_key(&node.type_name)
                }),
            }
        })
    }
}

fn missing_node(key: NodeKey) -> RuntimeError {
    RuntimeError::InvalidState {
        expected: format!("assembler node {key}"),
        found: "nothing".into(),
    }
}
