//! Retained-mode scene graph
//!
//! Nodes live in a generational arena, so a key to a removed node resolves to
//! "not found" instead of aliasing a newer node.

use slotmap::{new_key_type, SlotMap};
use trellis_math::{mat4, Mat4, Vec3};
use crate::error::CoreError;
use crate::node::{NodeKind, SceneNode, Shape};
use crate::path;
use crate::value::Value;

new_key_type! {
    /// Generational key identifying a node in a [`SceneGraph`]
    pub struct NodeKey;
}

/// Counters for effective engine mutations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphStats {
    /// Property writes that actually changed a value
    pub property_writes: u64,
    /// Parent/child links created
    pub parent_changes: u64,
    /// Nodes disposed
    pub disposals: u64,
}

/// Container for all scene nodes
#[derive(Default)]
pub struct SceneGraph {
    nodes: SlotMap<NodeKey, SceneNode>,
    stats: GraphStats,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a detached node
    pub fn insert(&mut self, mut node: SceneNode) -> NodeKey {
        node.parent = None;
        node.children.clear();
        self.nodes.insert(node)
    }

    pub fn get(&self, key: NodeKey) -> Option<&SceneNode> {
        self.nodes.get(key)
    }

    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut SceneNode> {
        self.nodes.get_mut(key)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn stats(&self) -> GraphStats {
        self.stats
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeKey, &SceneNode)> {
        self.nodes.iter()
    }

    pub fn parent_of(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes.get(key).and_then(|n| n.parent)
    }

    /// Find the first node with the given name
    pub fn find_by_name(&self, name: &str) -> Option<NodeKey> {
        self.nodes.iter().find(|(_, n)| n.name == name).map(|(k, _)| k)
    }

    pub fn find_by_uuid(&self, uuid: &str) -> Option<NodeKey> {
        self.nodes.iter().find(|(_, n)| n.uuid == uuid).map(|(k, _)| k)
    }

    // --- Hierarchy ---

    /// Whether `ancestor` is `key` or one of its ancestors
    pub fn is_ancestor(&self, ancestor: NodeKey, key: NodeKey) -> bool {
        let mut current = Some(key);
        while let Some(k) = current {
            if k == ancestor {
                return true;
            }
            current = self.parent_of(k);
        }
        false
    }

    /// Parent `child` under `parent`, detaching it from any previous parent
    pub fn add_child(&mut self, parent: NodeKey, child: NodeKey) -> Result<(), CoreError> {
        let parent_node = self.nodes.get(parent).ok_or(CoreError::StaleNode)?;
        let child_node = self.nodes.get(child).ok_or(CoreError::StaleNode)?;
        if !parent_node.is_object() || !child_node.is_object() {
            return Err(CoreError::InvalidHierarchy(
                "only objects can be parented in the scene graph".to_string(),
            ));
        }
        if self.is_ancestor(child, parent) {
            return Err(CoreError::InvalidHierarchy(
                "a node cannot be parented under itself or its descendant".to_string(),
            ));
        }

        self.detach(child);
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(child);
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
        }
        self.stats.parent_changes += 1;
        Ok(())
    }

    /// Remove `child` from `parent`. No-op if it is not a child of `parent`.
    pub fn remove_child(&mut self, parent: NodeKey, child: NodeKey) {
        if self.parent_of(child) == Some(parent) {
            self.detach(child);
        }
    }

    /// Unlink a node from its parent (the node stays in the graph)
    pub fn detach(&mut self, child: NodeKey) {
        let Some(parent) = self.parent_of(child) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.retain(|k| *k != child);
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = None;
        }
    }

    /// Remove a node from the graph and release it
    ///
    /// Children are unlinked and kept. Returns the disposed node.
    pub fn dispose(&mut self, key: NodeKey) -> Option<SceneNode> {
        self.detach(key);
        let mut node = self.nodes.remove(key)?;
        for child in node.children.drain(..) {
            if let Some(c) = self.nodes.get_mut(child) {
                c.parent = None;
            }
        }
        node.disposed = true;
        self.stats.disposals += 1;
        log::trace!("Disposed node {} ({:?})", node.uuid, node.kind);
        Some(node)
    }

    /// Depth-first pre-order traversal
    pub fn traverse(&self, root: NodeKey, f: &mut dyn FnMut(NodeKey, &SceneNode)) {
        let Some(node) = self.nodes.get(root) else {
            return;
        };
        f(root, node);
        for child in &node.children {
            self.traverse(*child, f);
        }
    }

    // --- Transforms ---

    /// Matrix from the node's local space to world space
    pub fn world_matrix(&self, key: NodeKey) -> Mat4 {
        let mut matrix = mat4::IDENTITY;
        let mut current = Some(key);
        while let Some(k) = current {
            let Some(node) = self.nodes.get(k) else {
                break;
            };
            matrix = mat4::mul(node.local_matrix(), matrix);
            current = node.parent;
        }
        matrix
    }

    pub fn world_position(&self, key: NodeKey) -> Vec3 {
        mat4::translation(&self.world_matrix(key))
    }

    /// Bounds of a mesh: its own shape, or its attached geometry's
    pub fn mesh_shape(&self, key: NodeKey) -> Option<Shape> {
        let node = self.nodes.get(key)?;
        if !matches!(node.kind, NodeKind::Mesh) {
            return None;
        }
        node.shape.or_else(|| {
            let geometry = node.get_local(&["geometry"])?.as_node()?;
            self.nodes.get(geometry)?.shape
        })
    }

    // --- Properties ---

    /// Resolve the node that owns the final segment of `segments`
    ///
    /// Node references stored in `props` are followed, so `"material.color"`
    /// on a mesh writes to the attached material node.
    fn resolve<'p>(&self, key: NodeKey, segments: &'p [&'p str]) -> Option<(NodeKey, &'p [&'p str])> {
        let mut key = key;
        let mut rest = segments;
        loop {
            let node = self.nodes.get(key)?;
            let mut hop = None;
            for split in 1..rest.len() {
                if let Some(Value::Node(target)) = path::get(&node.props, &rest[..split]) {
                    hop = Some((*target, split));
                    break;
                }
            }
            match hop {
                Some((target, split)) => {
                    key = target;
                    rest = &rest[split..];
                }
                None => return Some((key, rest)),
            }
        }
    }

    /// Set a property by dotted path. Returns whether anything changed.
    pub fn set_prop(&mut self, key: NodeKey, path: &str, value: Value) -> Result<bool, CoreError> {
        let segments = path::split(path);
        let (owner, rest) = self.resolve(key, &segments).ok_or(CoreError::StaleNode)?;
        let node = self.nodes.get_mut(owner).ok_or(CoreError::StaleNode)?;
        let changed = node.set_local(rest, value)?;
        if changed {
            self.stats.property_writes += 1;
        }
        Ok(changed)
    }

    /// Read a property by dotted path, following node references
    pub fn get_prop(&self, key: NodeKey, path: &str) -> Option<Value> {
        let segments = path::split(path);
        let (owner, rest) = self.resolve(key, &segments)?;
        self.nodes.get(owner)?.get_local(rest)
    }

    /// Remove a dynamic property. Returns whether something was removed.
    pub fn remove_prop(&mut self, key: NodeKey, path: &str) -> bool {
        let segments = path::split(path);
        let Some((owner, rest)) = self.resolve(key, &segments) else {
            return false;
        };
        let removed = self.nodes.get_mut(owner).is_some_and(|n| n.remove_local(rest));
        if removed {
            self.stats.property_writes += 1;
        }
        removed
    }
}
