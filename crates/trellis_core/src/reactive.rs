//! Reactive value cells
//!
//! A [`ReactiveCell`] holds a value and notifies subscribers when it changes.
//! Inside [`batch`], notifications are deferred until the outermost batch
//! ends and each cell notifies at most once with its final value.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

thread_local! {
    static BATCH_DEPTH: Cell<u32> = const { Cell::new(0) };
    static PENDING: RefCell<Vec<Box<dyn FnOnce()>>> = const { RefCell::new(Vec::new()) };
}

/// Run `f` with change notifications deferred until it returns
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    BATCH_DEPTH.with(|depth| depth.set(depth.get() + 1));
    let result = f();
    let remaining = BATCH_DEPTH.with(|depth| {
        let d = depth.get().saturating_sub(1);
        depth.set(d);
        d
    });
    if remaining == 0 {
        flush();
    }
    result
}

pub fn is_batching() -> bool {
    BATCH_DEPTH.with(|depth| depth.get() > 0)
}

fn flush() {
    loop {
        let pending = PENDING.with(|p| std::mem::take(&mut *p.borrow_mut()));
        if pending.is_empty() {
            break;
        }
        for notify in pending {
            notify();
        }
    }
}

/// Identifies a cell subscription
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellSubscription(u64);

type Subscriber<T> = Rc<dyn Fn(&T)>;

struct CellInner<T> {
    value: RefCell<T>,
    subscribers: RefCell<Vec<(u64, Subscriber<T>)>>,
    next_id: Cell<u64>,
    queued: Cell<bool>,
}

/// A shared observable value
pub struct ReactiveCell<T> {
    inner: Rc<CellInner<T>>,
}

impl<T> Clone for ReactiveCell<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReactiveCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReactiveCell").field(&*self.inner.value.borrow()).finish()
    }
}

impl<T: Clone + PartialEq + 'static> ReactiveCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(CellInner {
                value: RefCell::new(value),
                subscribers: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
                queued: Cell::new(false),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Store `value`; subscribers run only if it differs from the current one
    pub fn set(&self, value: T) -> bool {
        if *self.inner.value.borrow() == value {
            return false;
        }
        *self.inner.value.borrow_mut() = value;
        self.notify();
        true
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut value = self.get();
        f(&mut value);
        self.set(value)
    }

    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> CellSubscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.subscribers.borrow_mut().push((id, Rc::new(f)));
        CellSubscription(id)
    }

    pub fn unsubscribe(&self, subscription: CellSubscription) -> bool {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(id, _)| *id != subscription.0);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    fn notify(&self) {
        if !is_batching() {
            self.emit();
            return;
        }
        if self.inner.queued.replace(true) {
            return;
        }
        let cell = self.clone();
        PENDING.with(|p| {
            p.borrow_mut().push(Box::new(move || {
                cell.inner.queued.set(false);
                cell.emit();
            }))
        });
    }

    fn emit(&self) {
        let value = self.get();
        let subscribers: Vec<Subscriber<T>> =
            self.inner.subscribers.borrow().iter().map(|(_, s)| s.clone()).collect();
        for subscriber in subscribers {
            subscriber(&value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_notifies_on_change_only() {
        let cell = ReactiveCell::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        cell.subscribe(move |v| sink.borrow_mut().push(*v));

        assert!(cell.set(2));
        assert!(!cell.set(2));
        assert!(cell.update(|v| *v += 1));
        assert_eq!(*seen.borrow(), vec![2, 3]);
    }

    #[test]
    fn test_unsubscribe() {
        let cell = ReactiveCell::new(0);
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let sub = cell.subscribe(move |_| c.set(c.get() + 1));
        cell.set(1);
        assert!(cell.unsubscribe(sub));
        cell.set(2);
        assert_eq!(count.get(), 1);
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn test_batch_coalesces_notifications() {
        let cell = ReactiveCell::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        cell.subscribe(move |v| sink.borrow_mut().push(*v));

        batch(|| {
            cell.set(1);
            cell.set(2);
            batch(|| cell.set(3));
            assert!(seen.borrow().is_empty());
        });
        assert_eq!(*seen.borrow(), vec![3]);
        assert!(!is_batching());
    }
}
