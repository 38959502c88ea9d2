//! Instance registry
//!
//! Out-of-band metadata for every node created by the reconciler, keyed by
//! node identity. Handler counts are propagated up the parent chain when
//! handlers change or a node is reparented, so picking never has to walk
//! the tree to find out whether a subtree is interactive.

use slotmap::SecondaryMap;
use crate::attach::Attached;
use crate::event::Handlers;
use crate::graph::NodeKey;
use crate::store::Store;
use crate::value::{Props, Value};

/// Metadata attached to one node
#[derive(Debug)]
pub struct LocalState {
    /// Store of the root (or portal) that owns the node
    pub store: Store,
    /// Catalogue name the node was created from; empty for primitives
    pub type_name: String,
    /// Constructor arguments, kept to rebuild defaults for removed props
    pub args: Vec<Value>,
    pub handlers: Handlers,
    /// Handlers registered on this node
    pub event_count: usize,
    /// Handlers registered on this node and all registered descendants
    pub subtree_count: usize,
    pub parent: Option<NodeKey>,
    /// Scene-graph children in declaration order
    pub objects: Vec<NodeKey>,
    /// Attached (non-parentable) children in declaration order
    pub non_objects: Vec<NodeKey>,
    pub memoized_props: Props,
    pub attached: Option<Attached>,
    /// Whether the node is released when its element is destroyed
    pub dispose: bool,
    pub primitive: bool,
}

impl LocalState {
    pub fn new(store: Store, type_name: impl Into<String>) -> Self {
        Self {
            store,
            type_name: type_name.into(),
            args: Vec::new(),
            handlers: Handlers::new(),
            event_count: 0,
            subtree_count: 0,
            parent: None,
            objects: Vec::new(),
            non_objects: Vec::new(),
            memoized_props: Props::new(),
            attached: None,
            dispose: true,
            primitive: false,
        }
    }
}

/// Node key to [`LocalState`] map
#[derive(Default)]
pub struct InstanceRegistry {
    states: SecondaryMap<NodeKey, LocalState>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `state` for `node`, replacing any previous state
    pub fn attach(&mut self, node: NodeKey, state: LocalState) {
        self.states.insert(node, state);
    }

    pub fn get(&self, node: NodeKey) -> Option<&LocalState> {
        self.states.get(node)
    }

    pub fn get_mut(&mut self, node: NodeKey) -> Option<&mut LocalState> {
        self.states.get_mut(node)
    }

    pub fn contains(&self, node: NodeKey) -> bool {
        self.states.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Unregister `node`. Unknown nodes are ignored.
    ///
    /// Ancestor counts are not adjusted here; callers clear handlers and
    /// unlink the node first.
    pub fn detach(&mut self, node: NodeKey) -> Option<LocalState> {
        self.states.remove(node)
    }

    /// Handlers registered directly on `node`
    pub fn event_count(&self, node: NodeKey) -> usize {
        self.states.get(node).map_or(0, |s| s.event_count)
    }

    /// Handlers registered on `node` or below it
    pub fn subtree_count(&self, node: NodeKey) -> usize {
        self.states.get(node).map_or(0, |s| s.subtree_count)
    }

    /// Replace the handlers of `node`, returning the previous set
    pub fn set_handlers(&mut self, node: NodeKey, handlers: Handlers) -> Option<Handlers> {
        let state = self.states.get_mut(node)?;
        let old_count = state.event_count;
        let new_count = handlers.len();
        let previous = std::mem::replace(&mut state.handlers, handlers);
        state.event_count = new_count;
        state.subtree_count = state.subtree_count + new_count - old_count;
        let parent = state.parent;
        self.propagate(parent, new_count as isize - old_count as isize);
        Some(previous)
    }

    /// Record `parent` as the registry parent of `child`
    ///
    /// The child's subtree count moves from the old ancestor chain to the
    /// new one.
    pub fn set_parent(&mut self, child: NodeKey, parent: Option<NodeKey>) {
        let Some(state) = self.states.get_mut(child) else {
            return;
        };
        let old_parent = std::mem::replace(&mut state.parent, parent);
        let count = state.subtree_count as isize;
        if old_parent == parent {
            return;
        }
        self.propagate(old_parent, -count);
        self.propagate(parent, count);
    }

    fn propagate(&mut self, start: Option<NodeKey>, delta: isize) {
        if delta == 0 {
            return;
        }
        let mut current = start;
        while let Some(key) = current {
            let Some(state) = self.states.get_mut(key) else {
                break;
            };
            state.subtree_count = state.subtree_count.saturating_add_signed(delta);
            current = state.parent;
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.states.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::graph::SceneGraph;
    use crate::node::SceneNode;
    use crate::store::tests::test_store;

    fn registered(graph: &mut SceneGraph, registry: &mut InstanceRegistry, store: &Store) -> NodeKey {
        let key = graph.insert(SceneNode::group());
        registry.attach(key, LocalState::new(store.clone(), "group"));
        key
    }

    #[test]
    fn test_attach_get_detach() {
        let (store, mut graph) = test_store();
        let mut registry = InstanceRegistry::new();
        let node = registered(&mut graph, &mut registry, &store);
        assert!(registry.get(node).is_some());
        assert!(registry.detach(node).is_some());
        assert!(registry.get(node).is_none());
        assert!(registry.detach(node).is_none());
    }

    #[test]
    fn test_handler_counts_propagate_to_ancestors() {
        let (store, mut graph) = test_store();
        let mut registry = InstanceRegistry::new();
        let root = registered(&mut graph, &mut registry, &store);
        let mid = registered(&mut graph, &mut registry, &store);
        let leaf = registered(&mut graph, &mut registry, &store);
        registry.set_parent(mid, Some(root));
        registry.set_parent(leaf, Some(mid));

        let handlers = Handlers::new()
            .on(EventKind::Click, |_| {})
            .on(EventKind::PointerOver, |_| {});
        registry.set_handlers(leaf, handlers);
        assert_eq!(registry.event_count(leaf), 2);
        assert_eq!(registry.event_count(mid), 0);
        assert_eq!(registry.subtree_count(mid), 2);
        assert_eq!(registry.subtree_count(root), 2);

        registry.set_handlers(leaf, Handlers::new());
        assert_eq!(registry.subtree_count(root), 0);
    }

    #[test]
    fn test_reparent_moves_counts() {
        let (store, mut graph) = test_store();
        let mut registry = InstanceRegistry::new();
        let a = registered(&mut graph, &mut registry, &store);
        let b = registered(&mut graph, &mut registry, &store);
        let leaf = registered(&mut graph, &mut registry, &store);
        registry.set_parent(leaf, Some(a));
        registry.set_handlers(leaf, Handlers::new().on(EventKind::Click, |_| {}));
        assert_eq!(registry.subtree_count(a), 1);

        registry.set_parent(leaf, Some(b));
        assert_eq!(registry.subtree_count(a), 0);
        assert_eq!(registry.subtree_count(b), 1);
    }
}
