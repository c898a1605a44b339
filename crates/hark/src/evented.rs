#![forbid(unsafe_code)]

//! Capability traits: give any type the hub operations.
//!
//! A type opts in by holding an [`Events`] and implementing [`Evented`].
//! The blanket [`EventedExt`] then provides `on`, `trigger`, `when` and the
//! rest as methods on the type itself. Types that are also an
//! [`AttributeSource`] get the watch operations through [`ObservedExt`],
//! which always observes `self`.
//!
//! ```
//! use hark::{Events, Evented, EventedExt};
//!
//! struct Earth {
//!     events: Events,
//! }
//!
//! impl Evented for Earth {
//!     fn events(&self) -> &Events {
//!         &self.events
//!     }
//! }
//!
//! let earth = Earth { events: Events::new() };
//! earth.on("shapeChanged", || println!("the earth has changed shape"))?;
//! earth.trigger("shapeChanged")?;
//! # Ok::<(), hark::EventError>(())
//! ```

use std::any::Any;

use crate::error::Result;
use crate::events::{Events, ObjectId};
use crate::registry::HandlerId;
use crate::watch::AttributeSource;

/// A type that carries an event hub.
pub trait Evented {
    fn events(&self) -> &Events;
}

impl Evented for Events {
    fn events(&self) -> &Events {
        self
    }
}

impl<T: Evented + ?Sized> Evented for std::rc::Rc<T> {
    fn events(&self) -> &Events {
        (**self).events()
    }
}

/// Hub operations on any [`Evented`] type.
pub trait EventedExt: Evented {
    fn on(&self, event: &str, handler: impl Fn() + 'static) -> Result<HandlerId> {
        self.events().on(event, handler)
    }

    fn on_once(&self, event: &str, handler: impl Fn() + 'static) -> Result<HandlerId> {
        self.events().on_once(event, handler)
    }

    fn on_with_context(
        &self,
        event: &str,
        handler: impl Fn(Option<&dyn Any>) + 'static,
    ) -> Result<HandlerId> {
        self.events().on_with_context(event, handler)
    }

    fn on_once_with_context(
        &self,
        event: &str,
        handler: impl Fn(Option<&dyn Any>) + 'static,
    ) -> Result<HandlerId> {
        self.events().on_once_with_context(event, handler)
    }

    /// Register on `self`, scoped to the lifetime of `owner`.
    fn when<O>(&self, owner: &O, event: &str, handler: impl Fn() + 'static) -> Result<HandlerId>
    where
        O: Evented + ?Sized,
    {
        self.events().when(owner.events(), event, handler)
    }

    fn when_with_context<O>(
        &self,
        owner: &O,
        event: &str,
        handler: impl Fn(Option<&dyn Any>) + 'static,
    ) -> Result<HandlerId>
    where
        O: Evented + ?Sized,
    {
        self.events().when_with_context(owner.events(), event, handler)
    }

    fn trigger(&self, event: &str) -> Result<usize> {
        self.events().trigger(event)
    }

    fn trigger_with_context(&self, event: &str, context: &dyn Any) -> Result<usize> {
        self.events().trigger_with_context(event, context)
    }

    fn off(&self, event: &str, id: HandlerId) -> Result<bool> {
        self.events().off(event, id)
    }

    fn set_on_destroy(&self, callback: impl FnOnce() + 'static) -> Result<()> {
        self.events().set_on_destroy(callback)
    }

    fn destroy(&self) {
        self.events().destroy();
    }

    fn object_id(&self) -> ObjectId {
        self.events().id()
    }
}

impl<T: Evented + ?Sized> EventedExt for T {}

/// Watch operations on a type that is its own attribute source.
pub trait ObservedExt: Evented + AttributeSource {
    fn on_change_of(&self, path: &str, block: impl Fn() + 'static) -> Result<HandlerId> {
        self.events().on_change_of(self, path, block)
    }

    fn on_change_of_once(&self, path: &str, block: impl Fn() + 'static) -> Result<HandlerId> {
        self.events().on_change_of_once(self, path, block)
    }

    fn on_change_of_any<I, P>(&self, paths: I, block: impl Fn() + 'static) -> Result<Vec<HandlerId>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        self.events().on_change_of_any(self, paths, block)
    }
}

impl<T: Evented + AttributeSource> ObservedExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::Properties;
    use crate::subscription::Subscription;
    use crate::watch::SourceId;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Checkbox {
        events: Events,
        props: Properties<bool>,
    }

    impl Checkbox {
        fn new() -> Self {
            Self {
                events: Events::new(),
                props: Properties::with_values([("selected", false), ("highlighted", false)]),
            }
        }
    }

    impl Evented for Checkbox {
        fn events(&self) -> &Events {
            &self.events
        }
    }

    impl AttributeSource for Checkbox {
        fn source_id(&self) -> SourceId {
            self.props.source_id()
        }

        fn subscribe_path(&self, path: &str, callback: Box<dyn Fn()>) -> Subscription {
            self.props.subscribe_path(path, callback)
        }
    }

    #[test]
    fn extension_methods_reach_the_hub() {
        let checkbox = Checkbox::new();
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        checkbox
            .on("toggled", move || count_clone.set(count_clone.get() + 1))
            .unwrap();
        checkbox.trigger("toggled").unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(checkbox.object_id(), checkbox.events.id());
    }

    #[test]
    fn observed_ext_watches_self() {
        let checkbox = Checkbox::new();
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        checkbox
            .on_change_of_any(["selected", "highlighted"], move || {
                count_clone.set(count_clone.get() + 1);
            })
            .unwrap();
        checkbox.props.set("selected", true);
        checkbox.props.set("highlighted", true);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn when_accepts_any_evented_owner() {
        let checkbox = Checkbox::new();
        let owner = Rc::new(Checkbox::new());
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        checkbox
            .when(&owner, "toggled", move || count_clone.set(count_clone.get() + 1))
            .unwrap();
        checkbox.trigger("toggled").unwrap();
        drop(owner);
        checkbox.trigger("toggled").unwrap();
        assert_eq!(count.get(), 1);
    }
}
