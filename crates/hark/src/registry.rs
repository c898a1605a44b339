#![forbid(unsafe_code)]

//! Per-object handler storage.
//!
//! # Design
//!
//! A [`HandlerRegistry`] maps an [`EventKey`] to the ordered list of
//! registrations for that key. Insertion order is invocation order.
//!
//! Registrations are stored as `Rc<Registration>` so a dispatch pass can
//! snapshot the list (cheap `Rc` clones) and release the registry borrow
//! before any callback runs. Removal flips the shared `active` flag, which
//! the in-flight snapshot observes, so a registration removed mid-pass is
//! skipped even though the snapshot still holds it.
//!
//! # Invariants
//!
//! 1. A key with no registrations has no entry.
//! 2. `HandlerId`s are never reused within one registry.
//! 3. Every registration leaving the registry is deactivated first.
//!
//! Mutating methods hand removed registrations back to the caller instead of
//! dropping them. Dropping a callback can drop the last handle of another
//! hub, whose teardown may call back into this one, so the caller drops them
//! only after its `RefCell` borrow has ended.

use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{EventError, Result};
use crate::events::ObjectId;
use crate::watch::SourceId;

/// Key a registration is stored under.
///
/// Custom events and attribute-change events live in separate namespaces, so
/// an event called `"selected"` never collides with a change of the
/// `selected` attribute. Change keys also carry the source, so the same path
/// watched on two sources yields two independent handler lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKey {
    /// A custom event fired with `trigger`.
    Named(String),
    /// The synthetic event dispatched when a watched attribute changes.
    Change { source: SourceId, path: String },
}

impl EventKey {
    /// Key for a custom event. Rejects empty names.
    pub fn named(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(EventError::EmptyEventName);
        }
        Ok(Self::Named(name.to_owned()))
    }

    /// Key for changes of `path` on `source`. Rejects empty paths.
    pub fn change(source: SourceId, path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(EventError::EmptyPath);
        }
        Ok(Self::Change {
            source,
            path: path.to_owned(),
        })
    }

    /// The event name or attribute path, without namespace.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) | Self::Change { path: name, .. } => name,
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Change { source, path } => write!(f, "change:{path}@{source}"),
        }
    }
}

/// Identity of one registration within a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Raw numeric value, stable for the lifetime of the hub.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Whether a registration survives its first invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Persistent,
    OnceOnly,
}

type PlainFn = Rc<dyn Fn()>;
type ContextFn = Rc<dyn Fn(Option<&dyn Any>)>;

/// A stored handler.
#[derive(Clone)]
pub(crate) enum Callback {
    Plain(PlainFn),
    WithContext(ContextFn),
}

impl Callback {
    pub(crate) fn plain(f: impl Fn() + 'static) -> Self {
        Self::Plain(Rc::new(f))
    }

    pub(crate) fn with_context(f: impl Fn(Option<&dyn Any>) + 'static) -> Self {
        Self::WithContext(Rc::new(f))
    }

    /// Zero-argument handlers ignore the context.
    pub(crate) fn invoke(&self, context: Option<&dyn Any>) {
        match self {
            Self::Plain(f) => f(),
            Self::WithContext(f) => f(context),
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Callback::Plain"),
            Self::WithContext(_) => f.write_str("Callback::WithContext"),
        }
    }
}

/// One entry in a handler list.
#[derive(Debug)]
pub(crate) struct Registration {
    id: HandlerId,
    callback: Callback,
    mode: Mode,
    owner: Option<ObjectId>,
    active: Cell<bool>,
}

impl Registration {
    pub(crate) fn id(&self) -> HandlerId {
        self.id
    }

    pub(crate) fn mode(&self) -> Mode {
        self.mode
    }

    pub(crate) fn owner(&self) -> Option<ObjectId> {
        self.owner
    }

    pub(crate) fn callback(&self) -> &Callback {
        &self.callback
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    fn deactivate(&self) {
        self.active.set(false);
    }
}

/// Event key → ordered registrations, for a single object.
#[derive(Debug, Default)]
pub(crate) struct HandlerRegistry {
    handlers: HashMap<EventKey, Vec<Rc<Registration>>>,
    next_id: u64,
}

impl HandlerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a registration and return its id.
    pub(crate) fn insert(
        &mut self,
        key: EventKey,
        callback: Callback,
        mode: Mode,
        owner: Option<ObjectId>,
    ) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.handlers.entry(key).or_default().push(Rc::new(Registration {
            id,
            callback,
            mode,
            owner,
            active: Cell::new(true),
        }));
        id
    }

    /// Clone of the current list for `key`, in invocation order.
    pub(crate) fn snapshot(&self, key: &EventKey) -> Vec<Rc<Registration>> {
        self.handlers.get(key).cloned().unwrap_or_default()
    }

    /// Remove one registration. `None` if it was not present.
    pub(crate) fn remove(&mut self, key: &EventKey, id: HandlerId) -> Option<Rc<Registration>> {
        let list = self.handlers.get_mut(key)?;
        let index = list.iter().position(|reg| reg.id == id)?;
        let removed = list.remove(index);
        removed.deactivate();
        if list.is_empty() {
            self.handlers.remove(key);
        }
        Some(removed)
    }

    /// Remove every registration for `key`.
    pub(crate) fn remove_all(&mut self, key: &EventKey) -> Vec<Rc<Registration>> {
        let removed = self.handlers.remove(key).unwrap_or_default();
        for reg in &removed {
            reg.deactivate();
        }
        removed
    }

    /// Drop the whole table. Returns what was removed.
    pub(crate) fn clear(&mut self) -> Vec<Rc<Registration>> {
        let removed: Vec<_> = self.handlers.drain().flat_map(|(_, list)| list).collect();
        for reg in &removed {
            reg.deactivate();
        }
        removed
    }

    pub(crate) fn len(&self, key: &EventKey) -> usize {
        self.handlers.get(key).map_or(0, Vec::len)
    }

    pub(crate) fn total(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    /// Keys with at least one registration, sorted.
    pub(crate) fn keys(&self) -> Vec<EventKey> {
        let mut keys: Vec<_> = self.handlers.keys().cloned().collect();
        keys.sort();
        keys
    }
}
