#![forbid(unsafe_code)]

//! Attribute-change watching.
//!
//! A watch turns attribute-change notifications into ordinary dispatches.
//! The hub subscribes to a source at most once per path; every notification
//! for that (source, path) pair dispatches the synthetic
//! [`EventKey::Change`] event, so watch callbacks share ordering, once-only
//! and re-entrancy behavior with custom events.
//!
//! Sources are told apart by their [`SourceId`], not by address. One hub may
//! watch the same path on several sources; each pair has its own handler
//! list and its own subscription.
//!
//! Subscriptions belong to the observing hub and are released exactly once,
//! in step 2 of its teardown, or earlier when the last handler for the pair
//! is rolled back.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use crate::error::{EventError, Result};
use crate::events::Events;
use crate::registry::{Callback, EventKey, HandlerId, Mode};
use crate::subscription::Subscription;

/// Process-unique identity of an attribute source.
///
/// A source allocates one at construction and returns it from
/// [`AttributeSource::source_id`] for its whole life. Handles that share
/// state (clones of one [`Properties`](crate::Properties)) share the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    /// Allocate a fresh id.
    #[must_use]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src{}", self.0)
    }
}

/// The attribute-change primitive a watcher consumes.
///
/// Implementors call `callback` once per change notification for `path`
/// until the returned [`Subscription`] is dropped.
pub trait AttributeSource {
    /// Stable identity of this source. Two values returning the same id are
    /// treated as one source.
    fn source_id(&self) -> SourceId;

    fn subscribe_path(&self, path: &str, callback: Box<dyn Fn()>) -> Subscription;
}

type WatchKey = (SourceId, String);

/// Live subscriptions of one hub, keyed by (source, path).
#[derive(Debug, Default)]
pub(crate) struct WatchSet {
    entries: BTreeMap<WatchKey, WatchHandle>,
}

impl WatchSet {
    pub(crate) fn contains(&self, source: SourceId, path: &str) -> bool {
        self.entries.contains_key(&(source, path.to_owned()))
    }

    pub(crate) fn insert(&mut self, source: SourceId, path: &str, subscription: Subscription) {
        self.entries
            .insert((source, path.to_owned()), WatchHandle::new(subscription));
    }

    /// Take one entry out; the caller releases it outside any borrow.
    pub(crate) fn remove(&mut self, source: SourceId, path: &str) -> Option<WatchHandle> {
        self.entries.remove(&(source, path.to_owned()))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Watched paths across all sources, sorted, each listed once.
    pub(crate) fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.keys().map(|(_, p)| p.clone()).collect();
        paths.sort();
        paths.dedup();
        paths
    }

    /// Release every subscription. Returns how many were still held.
    pub(crate) fn release_all(self) -> usize {
        self.entries
            .into_values()
            .map(|mut handle| usize::from(handle.release()))
            .sum()
    }
}

#[derive(Debug)]
pub(crate) struct WatchHandle {
    subscription: Option<Subscription>,
}

impl WatchHandle {
    fn new(subscription: Subscription) -> Self {
        Self {
            subscription: Some(subscription),
        }
    }

    /// Drop the subscription. A second call is a no-op returning `false`.
    pub(crate) fn release(&mut self) -> bool {
        self.subscription.take().is_some()
    }
}

impl Events {
    /// Run `block` whenever `path` changes on `source`.
    pub fn on_change_of<S>(
        &self,
        source: &S,
        path: &str,
        block: impl Fn() + 'static,
    ) -> Result<HandlerId>
    where
        S: AttributeSource + ?Sized,
    {
        self.watch(source, path, Callback::plain(block), Mode::Persistent)
    }

    /// Run `block` the next time `path` changes on `source`, then forget it.
    pub fn on_change_of_once<S>(
        &self,
        source: &S,
        path: &str,
        block: impl Fn() + 'static,
    ) -> Result<HandlerId>
    where
        S: AttributeSource + ?Sized,
    {
        self.watch(source, path, Callback::plain(block), Mode::OnceOnly)
    }

    /// Run `block` whenever any of `paths` changes on `source`.
    ///
    /// The same callback is registered under every listed path (repeated
    /// paths count once), so it runs once per change notification received.
    /// All paths are validated before anything is registered, and a failure
    /// partway through rolls back the paths already registered by this call.
    pub fn on_change_of_any<S, I, P>(
        &self,
        source: &S,
        paths: I,
        block: impl Fn() + 'static,
    ) -> Result<Vec<HandlerId>>
    where
        S: AttributeSource + ?Sized,
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for path in paths {
            let path = path.as_ref();
            if path.is_empty() {
                return Err(EventError::EmptyPath);
            }
            if !unique.iter().any(|p| p == path) {
                unique.push(path.to_owned());
            }
        }
        if unique.is_empty() {
            return Err(EventError::EmptyPathList);
        }

        let source_id = source.source_id();
        let keys = unique
            .iter()
            .map(|path| EventKey::change(source_id, path))
            .collect::<Result<Vec<_>>>()?;
        let callback = Callback::plain(block);
        let mut registered: Vec<(EventKey, HandlerId)> = Vec::with_capacity(unique.len());
        for (path, key) in unique.iter().zip(keys) {
            match self.watch(source, path, callback.clone(), Mode::Persistent) {
                Ok(id) => registered.push((key, id)),
                Err(err) => {
                    for (key, id) in registered.iter().rev() {
                        self.unwatch(key, *id);
                    }
                    debug!(
                        object = %self.id(),
                        rolled_back = registered.len(),
                        error = %err,
                        "multi-path watch rolled back"
                    );
                    return Err(err);
                }
            }
        }
        Ok(registered.into_iter().map(|(_, id)| id).collect())
    }

    /// Attribute paths this hub currently holds subscriptions for.
    #[must_use]
    pub fn watched_paths(&self) -> Vec<String> {
        self.watched_paths_inner()
    }

    fn watch<S>(&self, source: &S, path: &str, callback: Callback, mode: Mode) -> Result<HandlerId>
    where
        S: AttributeSource + ?Sized,
    {
        let source_id = source.source_id();
        let key = EventKey::change(source_id, path)?;
        let id = self.register(key.clone(), callback, mode, None)?;
        if self.is_watching(source_id, path) {
            return Ok(id);
        }

        let weak = self.downgrade();
        let object = self.id();
        let dispatch_key = key.clone();
        let subscription = source.subscribe_path(
            path,
            Box::new(move || {
                let Some(events) = weak.upgrade() else {
                    trace!(%object, "change notification after hub dropped");
                    return;
                };
                if let Err(err) = events.dispatch(&dispatch_key, None) {
                    debug!(%object, error = %err, "change notification not dispatched");
                }
            }),
        );
        if let Err(err) = self.add_watch(source_id, path, subscription) {
            self.remove(&key, id);
            return Err(err);
        }
        debug!(%object, source = %source_id, path, "watching attribute");
        Ok(id)
    }

    /// Remove one watch handler and release the pair's subscription once no
    /// handler is left for it.
    fn unwatch(&self, key: &EventKey, id: HandlerId) {
        self.remove(key, id);
        if let EventKey::Change { source, path } = key {
            self.release_watch_if_unused(key, *source, path);
        }
    }
}
