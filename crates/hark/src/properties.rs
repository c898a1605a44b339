#![forbid(unsafe_code)]

//! Keyed attribute store with per-path change notification.
//!
//! # Design
//!
//! [`Properties<V>`] holds named attribute values in shared,
//! reference-counted storage (`Rc<RefCell<..>>`). Writing a value that
//! differs from the current one (by `PartialEq`) notifies every live
//! subscriber of that path, in registration order.
//!
//! This is the attribute-change primitive the watcher consumes through
//! [`AttributeSource`]. Hosts with their own observation mechanism
//! implement that trait directly instead.
//!
//! # Performance
//!
//! | Operation     | Complexity                          |
//! |---------------|-------------------------------------|
//! | `get()`       | O(log P) where P = attributes       |
//! | `set()`       | O(log P + S) where S = subscribers  |
//! | `subscribe()` | O(1) amortized                      |
//!
//! # Failure Modes
//!
//! - **Subscriber leak**: guards stored forever keep their callbacks alive.
//!   Dead weak references are pruned lazily during notification.
//! - **Batch writes**: [`Properties::set_many`] applies every write first
//!   and then notifies once per changed path. A callback watching two of the
//!   changed paths runs twice; nothing coalesces across paths.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::subscription::Subscription;
use crate::watch::{AttributeSource, SourceId};

type CallbackRc = Rc<dyn Fn()>;
type CallbackWeak = Weak<dyn Fn()>;

struct PropertiesInner<V> {
    values: BTreeMap<String, V>,
    version: u64,
    /// (path, callback) in registration order. Dead entries are pruned on notify.
    subscribers: Vec<(String, CallbackWeak)>,
}

/// A shared set of named, version-tracked attribute values.
///
/// Cloning a `Properties` creates a new handle to the **same** state, with
/// the same [`SourceId`].
///
/// # Invariants
///
/// 1. `version` increments by exactly 1 per value-changing write.
/// 2. Writing a value equal to the current one is a no-op.
/// 3. Subscribers of a path are notified in registration order.
/// 4. Subscribers of other paths are never notified.
pub struct Properties<V> {
    id: SourceId,
    inner: Rc<RefCell<PropertiesInner<V>>>,
}

impl<V> Clone for Properties<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Properties<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Properties")
            .field("id", &self.id)
            .field("values", &inner.values)
            .field("version", &inner.version)
            .field("subscriber_count", &inner.subscribers.len())
            .finish()
    }
}

impl<V: Clone + PartialEq + 'static> Default for Properties<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + PartialEq + 'static> Properties<V> {
    /// Empty store at version 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: SourceId::new(),
            inner: Rc::new(RefCell::new(PropertiesInner {
                values: BTreeMap::new(),
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Store with initial values. Seeding does not count as a change.
    #[must_use]
    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        let props = Self::new();
        props
            .inner
            .borrow_mut()
            .values
            .extend(values.into_iter().map(|(k, v)| (k.into(), v)));
        props
    }

    /// Clone of the value at `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<V> {
        self.inner.borrow().values.get(path).cloned()
    }

    /// Access the value at `path` by reference.
    pub fn with<R>(&self, path: &str, f: impl FnOnce(Option<&V>) -> R) -> R {
        f(self.inner.borrow().values.get(path))
    }

    /// Write `value` at `path`. Returns whether it changed; subscribers of
    /// `path` are notified only then. A first write to a path is a change.
    pub fn set(&self, path: &str, value: V) -> bool {
        let changed = self.write(path, value);
        if changed {
            self.notify(path);
        }
        changed
    }

    /// Modify the value at `path` in place. No-op if the path is unset.
    pub fn update(&self, path: &str, f: impl FnOnce(&mut V)) -> bool {
        let changed = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let Some(slot) = inner.values.get_mut(path) else {
                return false;
            };
            let old = slot.clone();
            f(slot);
            if *slot != old {
                inner.version += 1;
                true
            } else {
                false
            }
        };
        if changed {
            self.notify(path);
        }
        changed
    }

    /// Apply several writes as one update, then notify once per changed
    /// path in write order. Returns the number of changed paths.
    pub fn set_many<I, K>(&self, writes: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        let mut changed = Vec::new();
        for (path, value) in writes {
            let path = path.into();
            if self.write(&path, value) && !changed.contains(&path) {
                changed.push(path);
            }
        }
        for path in &changed {
            self.notify(path);
        }
        changed.len()
    }

    /// Subscribe to changes of `path`. Dropping the returned guard
    /// unsubscribes.
    pub fn subscribe(&self, path: &str, callback: impl Fn() + 'static) -> Subscription {
        let strong: CallbackRc = Rc::new(callback);
        let weak = Rc::downgrade(&strong);
        self.inner
            .borrow_mut()
            .subscribers
            .push((path.to_owned(), weak));
        Subscription::new(strong)
    }

    /// Current version. Increments by 1 per value-changing write.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Registered subscribers across all paths, including dead ones not yet
    /// pruned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    fn write(&self, path: &str, value: V) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.values.get(path) == Some(&value) {
            return false;
        }
        inner.values.insert(path.to_owned(), value);
        inner.version += 1;
        true
    }

    /// Notify live subscribers of `path` and prune dead ones.
    fn notify(&self, path: &str) {
        // Collect first so no borrow is held while callbacks run.
        let callbacks: Vec<CallbackRc> = {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.retain(|(_, w)| w.strong_count() > 0);
            inner
                .subscribers
                .iter()
                .filter(|(p, _)| p == path)
                .filter_map(|(_, w)| w.upgrade())
                .collect()
        };
        for cb in &callbacks {
            cb();
        }
    }
}

impl<V: Clone + PartialEq + 'static> AttributeSource for Properties<V> {
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn subscribe_path(&self, path: &str, callback: Box<dyn Fn()>) -> Subscription {
        self.subscribe(path, move || callback())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, impl Fn() + 'static) {
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        (count, move || count_clone.set(count_clone.get() + 1))
    }

    #[test]
    fn get_set_basic() {
        let props = Properties::new();
        assert_eq!(props.get("selected"), None);
        assert!(props.set("selected", true));
        assert_eq!(props.get("selected"), Some(true));
        assert_eq!(props.version(), 1);
    }

    #[test]
    fn same_value_is_noop() {
        let props = Properties::with_values([("selected", false)]);
        assert_eq!(props.version(), 0);
        assert!(!props.set("selected", false));
        assert_eq!(props.version(), 0);
    }

    #[test]
    fn notifies_only_matching_path() {
        let props = Properties::with_values([("selected", false), ("highlighted", false)]);
        let (count, bump) = counter();
        let _sub = props.subscribe("selected", bump);

        props.set("highlighted", true);
        assert_eq!(count.get(), 0);

        props.set("selected", true);
        assert_eq!(count.get(), 1);

        props.set("selected", true);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn drop_unsubscribes_and_prunes() {
        let props = Properties::new();
        let (count, bump) = counter();
        let sub = props.subscribe("x", bump);
        let _other = props.subscribe("x", || {});
        props.set("x", 1);
        assert_eq!(count.get(), 1);

        drop(sub);
        assert_eq!(props.subscriber_count(), 2);
        props.set("x", 2);
        assert_eq!(count.get(), 1);
        assert_eq!(props.subscriber_count(), 1);
    }

    #[test]
    fn update_in_place() {
        let props = Properties::with_values([("items", vec![1, 2])]);
        let (count, bump) = counter();
        let _sub = props.subscribe("items", bump);

        assert!(props.update("items", |v| v.push(3)));
        assert_eq!(props.get("items"), Some(vec![1, 2, 3]));
        assert!(!props.update("items", |_| {}));
        assert!(!props.update("missing", |v| v.push(1)));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn set_many_notifies_per_changed_path() {
        let props = Properties::with_values([("a", 0), ("b", 0), ("c", 0)]);
        let (count, bump) = counter();
        let bump = Rc::new(bump);
        let b1 = Rc::clone(&bump);
        let b2 = Rc::clone(&bump);
        let _sa = props.subscribe("a", move || b1());
        let _sb = props.subscribe("b", move || b2());

        // "c" unchanged-watch, "b" unchanged value.
        let changed = props.set_many([("a", 1), ("b", 0), ("c", 5)]);
        assert_eq!(changed, 2);
        assert_eq!(count.get(), 1);

        let changed = props.set_many([("a", 2), ("b", 2)]);
        assert_eq!(changed, 2);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn values_visible_to_subscribers_after_batch() {
        let props = Properties::with_values([("w", 0), ("h", 0)]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let reader = props.clone();
        let _sub = props.subscribe("w", move || {
            seen_clone
                .borrow_mut()
                .push((reader.get("w"), reader.get("h")));
        });
        props.set_many([("w", 3), ("h", 4)]);
        assert_eq!(*seen.borrow(), vec![(Some(3), Some(4))]);
    }

    #[test]
    fn subscriber_may_write_reentrantly() {
        let props = Properties::with_values([("a", 0), ("b", 0)]);
        let writer = props.clone();
        let _sub = props.subscribe("a", move || {
            writer.set("b", 1);
        });
        props.set("a", 1);
        assert_eq!(props.get("b"), Some(1));
        assert_eq!(props.version(), 2);
    }

    #[test]
    fn notification_order_is_registration_order() {
        let props = Properties::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut subs = Vec::new();
        for tag in ['A', 'B', 'C'] {
            let log = Rc::clone(&log);
            subs.push(props.subscribe("x", move || log.borrow_mut().push(tag)));
        }
        props.set("x", 1);
        assert_eq!(*log.borrow(), vec!['A', 'B', 'C']);
    }

    #[test]
    fn debug_format() {
        let props = Properties::with_values([("x", 42)]);
        let dbg = format!("{props:?}");
        assert!(dbg.contains("Properties"));
        assert!(dbg.contains("42"));
    }

    #[test]
    fn each_store_is_its_own_source() {
        let a = Properties::<i32>::new();
        let b = Properties::<i32>::new();
        assert_ne!(a.source_id(), b.source_id());
        assert_eq!(a.clone().source_id(), a.source_id());
    }
}
