#![forbid(unsafe_code)]

//! RAII handle for an attribute-change subscription.

use std::any::Any;
use std::fmt;

/// Guard returned by an attribute source.
///
/// Dropping the `Subscription` ends delivery. Sources pick the mechanism:
/// [`Properties`](crate::Properties) keeps the strong half of a `Weak`
/// callback in the guard, hosts with an explicit unsubscribe call use
/// [`Subscription::on_drop`].
pub struct Subscription {
    _guard: Box<dyn Any>,
}

impl Subscription {
    /// Keep `guard` alive until the subscription is dropped.
    pub fn new(guard: impl Any) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }

    /// Run `unsubscribe` exactly once when the subscription is dropped.
    pub fn on_drop(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self::new(OnDrop(Some(Box::new(unsubscribe))))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

struct OnDrop(Option<Box<dyn FnOnce()>>);

impl Drop for OnDrop {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}
