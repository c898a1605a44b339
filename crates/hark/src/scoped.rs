#![forbid(unsafe_code)]

//! Registrations scoped to the lifetime of an owner object.
//!
//! `target.when(&owner, event, handler)` registers `handler` on `target`
//! and attaches a hook to `owner` through its on-destroy primitive. The
//! effective lifetime of the handler is the shorter of the two objects'
//! lifetimes:
//!
//! - owner destroyed first: the hook removes the handler from the target;
//! - target destroyed first: its registry is already gone, and the owner's
//!   hook finds nothing to remove.
//!
//! The link holds only a [`WeakEvents`] to the target and the owner's id.
//! Neither object keeps the other alive through it.

use std::any::Any;

use tracing::trace;

use crate::error::{EventError, Result};
use crate::events::{Events, ObjectId, WeakEvents};
use crate::registry::{Callback, EventKey, HandlerId, Mode};

/// Back-reference from an owner's teardown to one handler on a target.
#[derive(Debug)]
pub(crate) struct ScopedLink {
    target: WeakEvents,
    key: EventKey,
    handler: HandlerId,
    owner: ObjectId,
}

impl ScopedLink {
    /// Hook the link into `owner`'s teardown.
    pub(crate) fn attach(self, owner: &Events) -> Result<()> {
        owner.run_on_destroy(move || self.release())
    }

    /// Remove the handler if target and handler still exist.
    fn release(self) {
        match self.target.upgrade() {
            Some(target) => {
                if !target.remove(&self.key, self.handler) {
                    trace!(
                        owner = %self.owner,
                        target = %self.target.id(),
                        handler = %self.handler,
                        "scoped handler already gone"
                    );
                }
            }
            None => trace!(
                owner = %self.owner,
                target = %self.target.id(),
                "scoped target already destroyed"
            ),
        }
    }
}

impl Events {
    /// Run `handler` on every `event` of this object for as long as `owner`
    /// is alive.
    pub fn when(
        &self,
        owner: &Events,
        event: &str,
        handler: impl Fn() + 'static,
    ) -> Result<HandlerId> {
        self.register_scoped(
            owner,
            EventKey::named(event)?,
            Callback::plain(handler),
            Mode::Persistent,
        )
    }

    /// Context-receiving variant of [`Events::when`].
    pub fn when_with_context(
        &self,
        owner: &Events,
        event: &str,
        handler: impl Fn(Option<&dyn Any>) + 'static,
    ) -> Result<HandlerId> {
        self.register_scoped(
            owner,
            EventKey::named(event)?,
            Callback::with_context(handler),
            Mode::Persistent,
        )
    }

    fn register_scoped(
        &self,
        owner: &Events,
        key: EventKey,
        callback: Callback,
        mode: Mode,
    ) -> Result<HandlerId> {
        // Check the owner first so a dead owner leaves the target untouched.
        if owner.is_destroyed() {
            return Err(EventError::Destroyed { object: owner.id() });
        }
        let owner_id = owner.id();
        let handler = self.register(key.clone(), callback, mode, Some(owner_id))?;
        let link = ScopedLink {
            target: self.downgrade(),
            key: key.clone(),
            handler,
            owner: owner_id,
        };
        if let Err(err) = link.attach(owner) {
            self.remove(&key, handler);
            return Err(err);
        }
        Ok(handler)
    }
}
