#![forbid(unsafe_code)]

//! Per-object event hub.
//!
//! # Design
//!
//! [`Events`] is the state one object carries to take part in event
//! dispatch: its handler registry, its attribute watches, its on-destroy
//! hooks and its lifecycle. A type gains the full operation set by holding
//! an `Events` and implementing [`Evented`](crate::Evented); nothing about
//! the type itself has to change.
//!
//! The hub is `Rc<RefCell<..>>` shared state. Cloning an `Events` creates a
//! new handle to the same hub, and the hub is destroyed either explicitly
//! with [`Events::destroy`] or when its last strong handle is dropped.
//! Handlers that need to reach their own object should capture a
//! [`WeakEvents`] from [`Events::downgrade`]; a strong handle captured in
//! the hub's own registry forms a cycle and the hub is then only torn down
//! by an explicit `destroy`.
//!
//! # Dispatch
//!
//! `trigger` snapshots the handler list and releases the borrow before any
//! handler runs, so handlers may register, remove, trigger (the same event
//! included) or destroy freely:
//!
//! - handlers added during a pass are not invoked by that pass;
//! - handlers removed during a pass are skipped;
//! - a once-only handler is removed *before* it is invoked, so a re-entrant
//!   trigger of the same event from inside it cannot fire it again.
//!
//! # Teardown
//!
//! Live → TearingDown → Destroyed, one way. On leaving `Live`:
//!
//! 1. the `on_destroy` callback runs (at most once);
//! 2. attribute watches are released;
//! 3. on-destroy hooks run, including the scoped-link hooks that remove
//!    handlers this object owns on other hubs;
//! 4. the registry is cleared.
//!
//! Registering on, or triggering, a hub that has left `Live` fails with
//! [`EventError::Destroyed`]. In particular a teardown callback cannot
//! trigger new events on the object being torn down.
//!
//! Only an explicit [`Events::destroy`] lets the `on_destroy` callback reach
//! the hub: a [`WeakEvents`] still upgrades and the registry is still
//! populated. When teardown runs because the last strong handle was
//! dropped, the hub is already unreachable; `upgrade` returns `None` and
//! the callback must work from what it captured.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{Span, debug, debug_span, trace, warn};

use crate::config::HarkConfig;
use crate::error::{EventError, Result};
use crate::registry::{Callback, EventKey, HandlerId, HandlerRegistry, Mode};
use crate::subscription::Subscription;
use crate::watch::{SourceId, WatchSet};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a hub is in its one-way lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Live,
    /// Teardown callbacks and hooks are running.
    TearingDown,
    Destroyed,
}

type Hook = Box<dyn FnOnce()>;

struct EventsInner {
    id: ObjectId,
    config: HarkConfig,
    state: Lifecycle,
    registry: HandlerRegistry,
    on_destroy: Option<Hook>,
    watches: WatchSet,
    destroy_hooks: Vec<Hook>,
    depth: usize,
}

impl EventsInner {
    fn ensure_live(&self) -> Result<()> {
        if self.state == Lifecycle::Live {
            Ok(())
        } else {
            Err(EventError::Destroyed { object: self.id })
        }
    }

    /// Leave `Live` and take everything teardown has to run.
    fn begin_teardown(&mut self) -> Option<Teardown> {
        if self.state != Lifecycle::Live {
            return None;
        }
        self.state = Lifecycle::TearingDown;
        Some(Teardown {
            on_destroy: self.on_destroy.take(),
            watches: mem::take(&mut self.watches),
            hooks: mem::take(&mut self.destroy_hooks),
        })
    }
}

impl Drop for EventsInner {
    fn drop(&mut self) {
        if let Some(teardown) = self.begin_teardown() {
            teardown.run(self.id);
        }
        self.state = Lifecycle::Destroyed;
        let dropped = self.registry.clear();
        trace!(object = %self.id, handlers = dropped.len(), "hub dropped");
    }
}

/// Steps 1-3 of teardown, run with no borrow of the hub held.
struct Teardown {
    on_destroy: Option<Hook>,
    watches: WatchSet,
    hooks: Vec<Hook>,
}

impl Teardown {
    fn run(self, object: ObjectId) {
        if let Some(callback) = self.on_destroy {
            trace!(%object, "running on_destroy");
            callback();
        }
        let watches = self.watches.release_all();
        let hooks = self.hooks.len();
        for hook in self.hooks {
            hook();
        }
        debug!(%object, watches, hooks, "teardown hooks finished");
    }
}

/// Restores the nesting depth when a dispatch pass ends, panics included.
struct DepthGuard<'a>(&'a RefCell<EventsInner>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.0.try_borrow_mut() {
            inner.depth = inner.depth.saturating_sub(1);
        }
    }
}

/// Handle to a per-object event hub.
#[derive(Clone)]
pub struct Events {
    inner: Rc<RefCell<EventsInner>>,
}

/// Non-owning handle to a hub. Never keeps the hub alive.
#[derive(Clone)]
pub struct WeakEvents {
    inner: Weak<RefCell<EventsInner>>,
    id: ObjectId,
}

impl WeakEvents {
    /// Strong handle if the hub still exists.
    #[must_use]
    pub fn upgrade(&self) -> Option<Events> {
        self.inner.upgrade().map(|inner| Events { inner })
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

impl fmt::Debug for WeakEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakEvents")
            .field("id", &self.id)
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Default for Events {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f
                .debug_struct("Events")
                .field("id", &inner.id)
                .field("state", &inner.state)
                .field("handlers", &inner.registry.total())
                .field("watches", &inner.watches.len())
                .finish(),
            Err(_) => f.debug_struct("Events").finish_non_exhaustive(),
        }
    }
}

impl Events {
    /// New live hub with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HarkConfig::default())
    }

    /// New live hub with the given configuration.
    ///
    /// A configuration that fails [`HarkConfig::validate`] is repaired with
    /// [`HarkConfig::normalized`] and each violation is logged at `warn`.
    #[must_use]
    pub fn with_config(config: HarkConfig) -> Self {
        let id = ObjectId::next();
        let config = match config.validate() {
            Ok(()) => config,
            Err(errors) => {
                for err in &errors {
                    warn!(object = %id, error = %err, "invalid hub config repaired");
                }
                config.normalized()
            }
        };
        trace!(object = %id, "hub created");
        Self {
            inner: Rc::new(RefCell::new(EventsInner {
                id,
                config,
                state: Lifecycle::Live,
                registry: HandlerRegistry::new(),
                on_destroy: None,
                watches: WatchSet::default(),
                destroy_hooks: Vec::new(),
                depth: 0,
            })),
        }
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.inner.borrow().id
    }

    #[must_use]
    pub fn config(&self) -> HarkConfig {
        self.inner.borrow().config.clone()
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakEvents {
        WeakEvents {
            inner: Rc::downgrade(&self.inner),
            id: self.id(),
        }
    }

    /// Whether both handles refer to the same hub.
    #[must_use]
    pub fn ptr_eq(&self, other: &Events) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.borrow().state
    }

    /// True once teardown has started.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.lifecycle() != Lifecycle::Live
    }

    // ── registration ──────────────────────────────────────────────────

    /// Run `handler` every time `event` is triggered.
    pub fn on(&self, event: &str, handler: impl Fn() + 'static) -> Result<HandlerId> {
        self.register(
            EventKey::named(event)?,
            Callback::plain(handler),
            Mode::Persistent,
            None,
        )
    }

    /// Run `handler` the next time `event` is triggered, then forget it.
    pub fn on_once(&self, event: &str, handler: impl Fn() + 'static) -> Result<HandlerId> {
        self.register(
            EventKey::named(event)?,
            Callback::plain(handler),
            Mode::OnceOnly,
            None,
        )
    }

    /// Run `handler` every time `event` is triggered, passing the trigger's
    /// context (`None` when triggered without one).
    pub fn on_with_context(
        &self,
        event: &str,
        handler: impl Fn(Option<&dyn Any>) + 'static,
    ) -> Result<HandlerId> {
        self.register(
            EventKey::named(event)?,
            Callback::with_context(handler),
            Mode::Persistent,
            None,
        )
    }

    /// Context-receiving variant of [`Events::on_once`].
    pub fn on_once_with_context(
        &self,
        event: &str,
        handler: impl Fn(Option<&dyn Any>) + 'static,
    ) -> Result<HandlerId> {
        self.register(
            EventKey::named(event)?,
            Callback::with_context(handler),
            Mode::OnceOnly,
            None,
        )
    }

    /// Remove one handler. `Ok(false)` if it was not registered (already
    /// fired, already removed, or never existed).
    pub fn off(&self, event: &str, id: HandlerId) -> Result<bool> {
        Ok(self.remove(&EventKey::named(event)?, id))
    }

    /// Remove every handler for `event`. Returns how many were removed.
    pub fn off_all(&self, event: &str) -> Result<usize> {
        let key = EventKey::named(event)?;
        let removed = self.inner.borrow_mut().registry.remove_all(&key);
        debug!(object = %self.id(), event = %key, removed = removed.len(), "removed all handlers");
        Ok(removed.len())
    }

    // ── dispatch ──────────────────────────────────────────────────────

    /// Fire `event`. Returns the number of handlers invoked; an event with
    /// no handlers is not an error.
    pub fn trigger(&self, event: &str) -> Result<usize> {
        self.dispatch(&EventKey::named(event)?, None)
    }

    /// Fire `event` with a context value, delivered unchanged to
    /// context-receiving handlers. Zero-argument handlers still run.
    pub fn trigger_with_context(&self, event: &str, context: &dyn Any) -> Result<usize> {
        self.dispatch(&EventKey::named(event)?, Some(context))
    }

    // ── introspection ─────────────────────────────────────────────────

    /// Handlers currently registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        EventKey::named(event).map_or(0, |key| self.inner.borrow().registry.len(&key))
    }

    #[must_use]
    pub fn has_handlers(&self, event: &str) -> bool {
        self.handler_count(event) > 0
    }

    /// Names of custom events with at least one handler, sorted.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        self.inner
            .borrow()
            .registry
            .keys()
            .into_iter()
            .filter_map(|key| match key {
                EventKey::Named(name) => Some(name),
                EventKey::Change { .. } => None,
            })
            .collect()
    }

    // ── lifecycle ─────────────────────────────────────────────────────

    /// Set the callback run first when this object is destroyed. Replaces
    /// any previous callback.
    pub fn set_on_destroy(&self, callback: impl FnOnce() + 'static) -> Result<()> {
        let previous = {
            let mut inner = self.inner.borrow_mut();
            inner.ensure_live()?;
            inner.on_destroy.replace(Box::new(callback))
        };
        drop(previous);
        Ok(())
    }

    /// Remove the on-destroy callback, if any.
    pub fn clear_on_destroy(&self) {
        let previous = self.inner.borrow_mut().on_destroy.take();
        drop(previous);
    }

    /// Register a hook to run when this object is destroyed, after its
    /// `on_destroy` callback and watch release.
    pub fn run_on_destroy(&self, hook: impl FnOnce() + 'static) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.ensure_live()?;
        inner.destroy_hooks.push(Box::new(hook));
        Ok(())
    }

    /// Tear this object down now. Idempotent.
    pub fn destroy(&self) {
        let (object, teardown) = {
            let mut inner = self.inner.borrow_mut();
            (inner.id, inner.begin_teardown())
        };
        let Some(teardown) = teardown else {
            trace!(%object, "destroy on a hub that is not live");
            return;
        };
        debug!(%object, "destroying");
        teardown.run(object);
        let dropped = {
            let mut inner = self.inner.borrow_mut();
            inner.state = Lifecycle::Destroyed;
            inner.registry.clear()
        };
        debug!(%object, handlers = dropped.len(), "destroyed");
        drop(dropped);
    }

    // ── crate internals ───────────────────────────────────────────────

    pub(crate) fn register(
        &self,
        key: EventKey,
        callback: Callback,
        mode: Mode,
        owner: Option<ObjectId>,
    ) -> Result<HandlerId> {
        let mut inner = self.inner.borrow_mut();
        if let Err(err) = inner.ensure_live() {
            drop(inner);
            drop(callback);
            return Err(err);
        }
        let id = inner.registry.insert(key.clone(), callback, mode, owner);
        debug!(object = %inner.id, event = %key, handler = %id, ?mode, ?owner, "registered");
        Ok(id)
    }

    /// Remove one registration if present. Never fails.
    pub(crate) fn remove(&self, key: &EventKey, id: HandlerId) -> bool {
        let removed = self.inner.borrow_mut().registry.remove(key, id);
        match removed {
            Some(reg) => {
                debug!(object = %self.id(), event = %key, handler = %id, owner = ?reg.owner(), "removed");
                true
            }
            None => {
                trace!(object = %self.id(), event = %key, handler = %id, "nothing to remove");
                false
            }
        }
    }

    pub(crate) fn dispatch(&self, key: &EventKey, context: Option<&dyn Any>) -> Result<usize> {
        let (object, snapshot, trace_dispatch) = {
            let mut inner = self.inner.borrow_mut();
            inner.ensure_live()?;
            let snapshot = inner.registry.snapshot(key);
            if snapshot.is_empty() {
                if inner.config.log_unhandled {
                    debug!(object = %inner.id, event = %key, "no handlers");
                } else {
                    trace!(object = %inner.id, event = %key, "no handlers");
                }
                return Ok(0);
            }
            if inner.depth >= inner.config.max_trigger_depth {
                return Err(EventError::DepthExceeded {
                    event: key.to_string(),
                    depth: inner.config.max_trigger_depth,
                });
            }
            inner.depth += 1;
            (inner.id, snapshot, inner.config.trace_dispatch)
        };
        let _depth = DepthGuard(&self.inner);

        let span = if trace_dispatch {
            debug_span!("trigger", %object, event = %key, handlers = snapshot.len())
        } else {
            Span::none()
        };
        let _entered = span.enter();

        let mut invoked = 0;
        for reg in &snapshot {
            if !reg.is_active() {
                continue;
            }
            if reg.mode() == Mode::OnceOnly {
                let removed = self.inner.borrow_mut().registry.remove(key, reg.id());
                drop(removed);
            }
            trace!(handler = %reg.id(), "invoking");
            reg.callback().invoke(context);
            invoked += 1;
        }
        Ok(invoked)
    }

    pub(crate) fn is_watching(&self, source: SourceId, path: &str) -> bool {
        self.inner.borrow().watches.contains(source, path)
    }

    pub(crate) fn add_watch(
        &self,
        source: SourceId,
        path: &str,
        subscription: Subscription,
    ) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if let Err(err) = inner.ensure_live() {
            drop(inner);
            drop(subscription);
            return Err(err);
        }
        inner.watches.insert(source, path, subscription);
        Ok(())
    }

    /// Release the subscription for (`source`, `path`) if `key` has no
    /// handlers left. Returns whether a subscription was released.
    pub(crate) fn release_watch_if_unused(
        &self,
        key: &EventKey,
        source: SourceId,
        path: &str,
    ) -> bool {
        let handle = {
            let mut inner = self.inner.borrow_mut();
            if inner.registry.len(key) > 0 {
                return false;
            }
            inner.watches.remove(source, path)
        };
        match handle {
            Some(mut handle) => {
                trace!(object = %self.id(), %source, path, "released unused watch");
                handle.release()
            }
            None => false,
        }
    }

    pub(crate) fn watched_paths_inner(&self) -> Vec<String> {
        self.inner.borrow().watches.paths()
    }
}
