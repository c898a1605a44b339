#![forbid(unsafe_code)]

//! Per-object events, one-shot and owner-scoped handlers, and attribute
//! watching.
//!
//! # Role
//! `hark` attaches an event hub to any object without changing the
//! object's type: the object holds an [`Events`] and implements
//! [`Evented`]. Through the hub it can
//!
//! - register handlers for named events and fire them, optionally with a
//!   context value ([`Events::on`], [`Events::trigger_with_context`]);
//! - register one-shot handlers that forget themselves after the first
//!   invocation ([`Events::on_once`]);
//! - register handlers that live only as long as some other object
//!   ([`Events::when`]);
//! - watch attribute paths of an [`AttributeSource`] and run a callback on
//!   each change ([`Events::on_change_of`], [`Events::on_change_of_any`]);
//! - run a callback when the object is destroyed
//!   ([`Events::set_on_destroy`]).
//!
//! # Threading
//! Hubs are `Rc<RefCell<..>>`-based and therefore neither `Send` nor
//! `Sync`. All registration, dispatch and teardown happen synchronously on
//! the owning thread; the compiler rejects cross-thread use.
//!
//! # Modules
//! - [`registry`]: event keys, handler ids, per-object handler storage.
//! - [`events`]: the hub, dispatch and teardown.
//! - [`watch`]: the attribute-source trait and watch registration.
//! - [`scoped`]: owner-scoped registration.
//! - [`properties`]: a reference attribute source.
//! - [`evented`]: capability traits for arbitrary types.
//! - [`config`], [`error`].

pub mod config;
pub mod error;
pub mod evented;
pub mod events;
pub mod properties;
pub mod registry;
pub mod scoped;
pub mod subscription;
pub mod watch;

pub use config::{ConfigError, HarkConfig, HarkConfigParse};
pub use error::{EventError, Result};
pub use evented::{Evented, EventedExt, ObservedExt};
pub use events::{Events, Lifecycle, ObjectId, WeakEvents};
pub use properties::Properties;
pub use registry::{EventKey, HandlerId, Mode};
pub use subscription::Subscription;
pub use watch::{AttributeSource, SourceId};
