//! Host lifecycle adapter
//!
//! The UI host supplies mount/destroy notifications, an after-paint hook and
//! a batching boundary. [`FrameHost`] is the implementation used when the
//! frame loop itself is the host: after-paint callbacks are flushed by the
//! scheduler at the end of each tick.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use crate::graph::NodeKey;
use crate::reactive;

type Callback = Box<dyn FnOnce()>;

/// Lifecycle hooks provided by the UI host
pub trait HostAdapter {
    /// Run `callback` once the host has mounted
    fn on_mount(&self, callback: Box<dyn FnOnce()>);

    /// Register teardown for `owner`; it runs exactly once
    fn on_destroy(&self, owner: NodeKey, callback: Box<dyn FnOnce()>);

    /// Notify the host that `owner` was destroyed, running its teardown
    fn destroyed(&self, owner: NodeKey);

    /// Run `callback` after the next frame has been presented
    fn schedule_after_paint(&self, callback: Box<dyn FnOnce()>);

    /// Group reactive updates so dependents observe them once
    fn batch(&self, f: &mut dyn FnMut()) {
        reactive::batch(f);
    }
}

/// Host driven by the render loop
#[derive(Default)]
pub struct FrameHost {
    mounted: Cell<bool>,
    mount_queue: RefCell<Vec<Callback>>,
    teardown: RefCell<HashMap<NodeKey, Vec<Callback>>>,
    after_paint: RefCell<Vec<Callback>>,
}

impl FrameHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the host mounted and run queued mount callbacks
    pub fn mount(&self) {
        self.mounted.set(true);
        let queued = std::mem::take(&mut *self.mount_queue.borrow_mut());
        for callback in queued {
            callback();
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    /// Run callbacks scheduled before this call
    ///
    /// Callbacks scheduled while flushing run at the next flush.
    pub fn flush_after_paint(&self) -> usize {
        let queued = std::mem::take(&mut *self.after_paint.borrow_mut());
        let count = queued.len();
        for callback in queued {
            callback();
        }
        count
    }

    pub fn pending_after_paint(&self) -> usize {
        self.after_paint.borrow().len()
    }

    /// Run every outstanding teardown
    pub fn unmount(&self) {
        self.mounted.set(false);
        let all: Vec<Callback> = self.teardown.borrow_mut().drain().flat_map(|(_, v)| v).collect();
        for callback in all {
            callback();
        }
    }
}

impl HostAdapter for FrameHost {
    fn on_mount(&self, callback: Box<dyn FnOnce()>) {
        if self.mounted.get() {
            callback();
        } else {
            self.mount_queue.borrow_mut().push(callback);
        }
    }

    fn on_destroy(&self, owner: NodeKey, callback: Box<dyn FnOnce()>) {
        self.teardown.borrow_mut().entry(owner).or_default().push(callback);
    }

    fn destroyed(&self, owner: NodeKey) {
        let callbacks = self.teardown.borrow_mut().remove(&owner).unwrap_or_default();
        for callback in callbacks {
            callback();
        }
    }

    fn schedule_after_paint(&self, callback: Box<dyn FnOnce()>) {
        self.after_paint.borrow_mut().push(callback);
    }
}

impl Drop for FrameHost {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use slotmap::SlotMap;

    fn keys(n: usize) -> Vec<NodeKey> {
        let mut map: SlotMap<NodeKey, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_on_mount_queues_until_mounted() {
        let host = FrameHost::new();
        let ran = Rc::new(Cell::new(0));
        let r = ran.clone();
        host.on_mount(Box::new(move || r.set(r.get() + 1)));
        assert_eq!(ran.get(), 0);
        host.mount();
        assert_eq!(ran.get(), 1);

        let r = ran.clone();
        host.on_mount(Box::new(move || r.set(r.get() + 1)));
        assert_eq!(ran.get(), 2);
    }

    #[test]
    fn test_destroy_runs_exactly_once() {
        let host = FrameHost::new();
        let owner = keys(1)[0];
        let ran = Rc::new(Cell::new(0));
        let r = ran.clone();
        host.on_destroy(owner, Box::new(move || r.set(r.get() + 1)));
        host.destroyed(owner);
        host.destroyed(owner);
        host.unmount();
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn test_drop_runs_pending_teardown() {
        let owner = keys(1)[0];
        let ran = Rc::new(Cell::new(false));
        {
            let host = FrameHost::new();
            let r = ran.clone();
            host.on_destroy(owner, Box::new(move || r.set(true)));
        }
        assert!(ran.get());
    }

    #[test]
    fn test_after_paint_flush() {
        let host = Rc::new(FrameHost::new());
        let ran = Rc::new(Cell::new(0));
        let (r, h) = (ran.clone(), host.clone());
        host.schedule_after_paint(Box::new(move || {
            r.set(r.get() + 1);
            let r2 = r.clone();
            h.schedule_after_paint(Box::new(move || r2.set(r2.get() + 10)));
        }));
        assert_eq!(host.flush_after_paint(), 1);
        assert_eq!(ran.get(), 1);
        assert_eq!(host.pending_after_paint(), 1);
        host.flush_after_paint();
        assert_eq!(ran.get(), 11);
    }
}
