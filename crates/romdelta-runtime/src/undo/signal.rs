#![forbid(unsafe_code)]

//! Edge-triggered "data changed" notification.
//!
//! A [`ChangeSignal`] fires at most once: the first call to
//! [`raise`](ChangeSignal::raise) flips the flag and dispatches to the single
//! subscriber, every later call is a no-op. Callers that prefer polling read
//! [`has_fired`](ChangeSignal::has_fired).

use std::fmt;

/// Callback run when the signal fires.
pub type SignalFn = Box<dyn FnOnce() + Send>;

/// One-shot notification with a single subscriber.
#[derive(Default)]
pub struct ChangeSignal {
    fired: bool,
    subscriber: Option<SignalFn>,
}

impl fmt::Debug for ChangeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSignal")
            .field("fired", &self.fired)
            .field("subscribed", &self.subscriber.is_some())
            .finish()
    }
}

impl ChangeSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal that starts in the given state with no subscriber.
    #[must_use]
    pub fn with_state(fired: bool) -> Self {
        Self {
            fired,
            subscriber: None,
        }
    }

    /// Register the callback to run when the signal fires.
    ///
    /// Replaces any earlier subscriber. If the signal already fired the
    /// callback is dropped without running.
    pub fn subscribe(&mut self, f: impl FnOnce() + Send + 'static) {
        if self.fired {
            return;
        }
        self.subscriber = Some(Box::new(f));
    }

    /// Fire the signal. Returns `true` only on the firing edge.
    pub fn raise(&mut self) -> bool {
        if self.fired {
            return false;
        }
        self.fired = true;
        if let Some(subscriber) = self.subscriber.take() {
            subscriber();
        }
        true
    }

    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.fired
    }
}
