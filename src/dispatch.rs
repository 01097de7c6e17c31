//! Listener registry (spec.md §4.8).
//!
//! A plain, unsynchronized registry: callers wrap it in the shared
//! `dispatch_lock` (see [`crate::monitor`]) rather than it locking itself,
//! so hold-thread and quality-thread delivery serialize through one lock as
//! spec.md §5 requires.

use crate::frame::SensorFrame;

pub type Listener = Box<dyn Fn(&SensorFrame) + Send + Sync>;

#[derive(Default)]
pub struct Dispatch {
    next_id: u32,
    listeners: Vec<(u32, Listener)>,
}

impl Dispatch {
    pub fn new() -> Dispatch {
        Dispatch::default()
    }

    /// Registers `listener`, returning an id usable with [`Self::remove`].
    pub fn add(&mut self, listener: Listener) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.listeners.push((id, listener));
        id
    }

    pub fn remove(&mut self, id: u32) {
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
    }

    /// Delivers `frame` to every registered listener, in insertion order. A
    /// panicking listener is caught and logged so it can't stop the rest of
    /// the registry from receiving the frame (spec.md §7).
    pub fn dispatch(&self, frame: &SensorFrame) {
        for (id, listener) in &self.listeners {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(frame)));
            if let Err(payload) = result {
                let message = payload
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("<non-string panic payload>");
                log::error!("listener {id} panicked during dispatch: {message}");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
