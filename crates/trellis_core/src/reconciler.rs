//! Reconciler
//!
//! Turns declarative [`Element`] trees into scene-graph mutations: creating
//! nodes, applying and diffing props, parenting objects, attaching
//! non-object children to slots on their parent and tearing everything down
//! again.

use std::cell::RefCell;
use std::rc::Rc;
use crate::attach::{self, Attach, Attached};
use crate::catalogue::Catalogue;
use crate::error::CoreError;
use crate::event::{EventHandler, EventKind, Handlers, NativePointerEvent, ThreeEvent};
use crate::graph::{NodeKey, SceneGraph};
use crate::host::HostAdapter;
use crate::path;
use crate::registry::{InstanceRegistry, LocalState};
use crate::store::Store;
use crate::value::{Props, Value};

/// Shared single-threaded ownership
pub type Shared<T> = Rc<RefCell<T>>;

/// What an element instantiates
#[derive(Clone, Debug, PartialEq)]
pub enum ElementType {
    /// Look the name up in the catalogue
    Named(String),
    /// Adopt an existing node
    Primitive(NodeKey),
}

/// A declarative description of a node and its children
#[derive(Clone, Debug)]
pub struct Element {
    pub ty: ElementType,
    pub args: Vec<Value>,
    pub props: Props,
    pub handlers: Handlers,
    pub attach: Option<Attach>,
    /// Release the node when the element is destroyed; defaults to `true`
    /// for named elements and `false` for primitives
    pub dispose: Option<bool>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_type(ElementType::Named(name.into()))
    }

    pub fn primitive(node: NodeKey) -> Self {
        Self::with_type(ElementType::Primitive(node))
    }

    fn with_type(ty: ElementType) -> Self {
        Self {
            ty,
            args: Vec::new(),
            props: Props::new(),
            handlers: Handlers::new(),
            attach: None,
            dispose: None,
            children: Vec::new(),
        }
    }

    pub fn args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn prop(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(path.into(), value.into());
        self
    }

    pub fn on(mut self, kind: EventKind, handler: impl Fn(&mut ThreeEvent<'_>) + 'static) -> Self {
        self.handlers = self.handlers.on(kind, handler);
        self
    }

    pub fn on_missed(mut self, handler: impl Fn(&NativePointerEvent) + 'static) -> Self {
        self.handlers = self.handlers.on_missed(handler);
        self
    }

    pub fn handlers(mut self, handlers: Handlers) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn attach(mut self, attach: Attach) -> Self {
        self.attach = Some(attach);
        self
    }

    pub fn dispose(mut self, dispose: bool) -> Self {
        self.dispose = Some(dispose);
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }
}

/// Applies element trees to a scene graph and instance registry
pub struct Reconciler {
    graph: Shared<SceneGraph>,
    registry: Shared<InstanceRegistry>,
    catalogue: Catalogue,
    host: Rc<dyn HostAdapter>,
}

impl Reconciler {
    pub fn new(graph: Shared<SceneGraph>, registry: Shared<InstanceRegistry>, host: Rc<dyn HostAdapter>) -> Self {
        Self {
            graph,
            registry,
            catalogue: Catalogue::new(),
            host,
        }
    }

    pub fn with_catalogue(mut self, catalogue: Catalogue) -> Self {
        self.catalogue = catalogue;
        self
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    pub fn catalogue_mut(&mut self) -> &mut Catalogue {
        &mut self.catalogue
    }

    pub fn graph(&self) -> &Shared<SceneGraph> {
        &self.graph
    }

    pub fn registry(&self) -> &Shared<InstanceRegistry> {
        &self.registry
    }

    pub fn host(&self) -> &Rc<dyn HostAdapter> {
        &self.host
    }

    // --- Creation ---

    /// Create the node for `element` without its children
    pub fn create_instance(&self, store: &Store, element: &Element) -> Result<NodeKey, CoreError> {
        let (key, type_name, primitive) = match &element.ty {
            ElementType::Named(name) => {
                let node = self.catalogue.construct(name, &element.args)?;
                (self.graph.borrow_mut().insert(node), name.clone(), false)
            }
            ElementType::Primitive(key) => {
                if !self.graph.borrow().contains(*key) {
                    return Err(CoreError::StaleNode);
                }
                (*key, String::new(), true)
            }
        };

        let mut state = LocalState::new(store.clone(), type_name);
        state.args = element.args.clone();
        state.primitive = primitive;
        state.dispose = element.dispose.unwrap_or(!primitive);
        self.registry.borrow_mut().attach(key, state);

        if let Err(e) = self.update(key, &element.props) {
            log::warn!("Failed to apply initial props: {}", e);
            self.destroy(key);
            return Err(e);
        }
        self.set_handlers(key, element.handlers.clone());
        Ok(key)
    }

    /// Create `element` and its subtree, then insert it into `parent`
    ///
    /// A node is attached to its parent only after its own subtree is
    /// complete. On failure everything created so far is destroyed.
    pub fn mount(&self, store: &Store, element: &Element, parent: Option<NodeKey>) -> Result<NodeKey, CoreError> {
        let key = self.create_instance(store, element)?;
        for child in &element.children {
            if let Err(e) = self.mount(store, child, Some(key)) {
                self.destroy(key);
                return Err(e);
            }
        }
        if let Some(parent) = parent {
            if let Err(e) = self.insert_child(parent, key, element.attach.clone()) {
                self.destroy(key);
                return Err(e);
            }
        }
        Ok(key)
    }

    /// Mount `children` into `container` through a portal store
    pub fn mount_portal(&self, store: &Store, container: NodeKey, children: &[Element]) -> Result<Store, CoreError> {
        let portal = store.portal(container);
        for child in children {
            self.mount(&portal, child, Some(container))?;
        }
        Ok(portal)
    }

    // --- Hierarchy ---

    /// Insert `child` under `parent`: objects are parented, other nodes attach
    pub fn insert_child(&self, parent: NodeKey, child: NodeKey, attach: Option<Attach>) -> Result<(), CoreError> {
        let (is_object, default_slot) = {
            let graph = self.graph.borrow();
            let node = graph.get(child).ok_or(CoreError::StaleNode)?;
            (node.is_object(), node.kind.default_attach())
        };

        let attached = match attach {
            Some(Attach::Function(f)) => {
                let detach = f(&mut *self.graph.borrow_mut(), parent, child)?;
                Some(Attached::Custom { parent, detach })
            }
            Some(Attach::Path(slot)) => Some(attach::attach_path(&mut self.graph.borrow_mut(), parent, child, &slot)?),
            None | Some(Attach::Default) if is_object => {
                self.graph.borrow_mut().add_child(parent, child)?;
                None
            }
            None | Some(Attach::Default) => match default_slot {
                Some(slot) => Some(attach::attach_path(&mut self.graph.borrow_mut(), parent, child, slot)?),
                None => {
                    log::debug!("Non-object child has no attach target; keeping it unattached");
                    None
                }
            },
        };

        let store = {
            let mut registry = self.registry.borrow_mut();
            if let Some(state) = registry.get_mut(child) {
                state.attached = attached;
            }
            if let Some(state) = registry.get_mut(parent) {
                if is_object {
                    state.objects.push(child);
                } else {
                    state.non_objects.push(child);
                }
            }
            registry.set_parent(child, Some(parent));
            registry.get(child).map(|s| s.store.clone())
        };
        if let Some(store) = store {
            store.invalidate();
        }
        Ok(())
    }

    /// Undo `insert_child` without destroying the child
    fn unlink(&self, parent: NodeKey, child: NodeKey) -> Result<(), CoreError> {
        let attached = {
            let mut registry = self.registry.borrow_mut();
            if let Some(state) = registry.get_mut(parent) {
                state.objects.retain(|k| *k != child);
                state.non_objects.retain(|k| *k != child);
            }
            registry.set_parent(child, None);
            registry.get_mut(child).and_then(|s| s.attached.take())
        };
        let mut graph = self.graph.borrow_mut();
        graph.remove_child(parent, child);
        match attached {
            Some(attached) => attach::detach(&mut graph, attached),
            None => Ok(()),
        }
    }

    /// Remove `child` from `parent` and destroy it
    pub fn remove_child(&self, parent: NodeKey, child: NodeKey) -> Result<(), CoreError> {
        self.unlink(parent, child)?;
        self.destroy(child);
        Ok(())
    }

    /// Destroy `node` and its declared subtree
    ///
    /// Children go first; the node is unlinked from its parent, stripped
    /// from hover/capture/picking state, its teardown callbacks run, and it
    /// is released unless it opted out of disposal. Unknown nodes are
    /// ignored.
    pub fn destroy(&self, node: NodeKey) {
        let Some((children, parent, store)) = self.registry.borrow().get(node).map(|s| {
            let children: Vec<NodeKey> = s.objects.iter().chain(&s.non_objects).copied().collect();
            (children, s.parent, s.store.clone())
        }) else {
            return;
        };

        for child in children {
            self.destroy(child);
        }
        if let Some(parent) = parent {
            if let Err(e) = self.unlink(parent, node) {
                log::warn!("Failed to detach node during destroy: {}", e);
            }
        }

        store.remove_interactivity(node);
        self.host.destroyed(node);

        let state = {
            let mut registry = self.registry.borrow_mut();
            registry.set_handlers(node, Handlers::new());
            registry.detach(node)
        };
        let mut graph = self.graph.borrow_mut();
        match state {
            Some(state) if state.dispose => {
                graph.dispose(node);
            }
            _ => graph.detach(node),
        }
        drop(graph);
        store.invalidate();
    }

    /// Register teardown to run when `node` is destroyed
    pub fn on_destroy(&self, node: NodeKey, callback: impl FnOnce() + 'static) {
        self.host.on_destroy(node, Box::new(callback));
    }

    // --- Props ---

    /// Diff `props` against the last applied set and apply the difference
    ///
    /// Props equal to their memoized value are skipped; props that were
    /// dropped reset to the constructor default. Returns the number of
    /// effective writes.
    pub fn update(&self, node: NodeKey, props: &Props) -> Result<usize, CoreError> {
        let (changed, removed, type_name, args, store) = {
            let registry = self.registry.borrow();
            let state = registry.get(node).ok_or(CoreError::StaleNode)?;
            let changed: Vec<(String, Value)> = props
                .iter()
                .filter(|(k, v)| state.memoized_props.get(*k) != Some(*v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let removed: Vec<String> = state
                .memoized_props
                .keys()
                .filter(|k| !props.contains_key(*k))
                .cloned()
                .collect();
            (changed, removed, state.type_name.clone(), state.args.clone(), state.store.clone())
        };
        if changed.is_empty() && removed.is_empty() {
            return Ok(0);
        }

        let mut writes = 0;
        {
            let mut graph = self.graph.borrow_mut();
            for (path, value) in changed {
                if graph.set_prop(node, &path, value)? {
                    writes += 1;
                }
            }
            for path in removed {
                let default = if type_name.is_empty() {
                    None
                } else {
                    self.catalogue
                        .construct(&type_name, &args)
                        .ok()
                        .and_then(|d| d.get_local(&path::split(&path)))
                };
                let wrote = match default {
                    Some(value) => graph.set_prop(node, &path, value)?,
                    None => graph.remove_prop(node, &path),
                };
                if wrote {
                    writes += 1;
                }
            }
        }

        if let Some(state) = self.registry.borrow_mut().get_mut(node) {
            state.memoized_props = props.clone();
        }
        if writes > 0 {
            store.invalidate();
        }
        Ok(writes)
    }

    /// Replace the event handlers of `node`
    ///
    /// Objects with at least one handler become pickable.
    pub fn set_handlers(&self, node: NodeKey, handlers: Handlers) {
        let (count, store) = {
            let mut registry = self.registry.borrow_mut();
            if let Some(current) = registry.get(node) {
                if current.handlers.same_as(&handlers) {
                    return;
                }
            }
            if registry.set_handlers(node, handlers).is_none() {
                return;
            }
            let Some(state) = registry.get(node) else {
                return;
            };
            (state.event_count, state.store.clone())
        };
        let is_object = self.graph.borrow().get(node).is_some_and(|n| n.is_object());
        if count > 0 && is_object {
            store.add_interactivity(node);
        } else {
            store.internal_mut().interaction.retain(|k| *k != node);
        }
    }

    /// Handler registered on `node` for `kind`
    pub fn handler(&self, node: NodeKey, kind: EventKind) -> Option<EventHandler> {
        self.registry.borrow().get(node).and_then(|s| s.handlers.get(kind))
    }
}
