//! `onEvents`: an append-only mapping from event key to an ordered sequence
//! of callbacks, triggered in registration order.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::session::Session;

pub type Callback = Box<dyn Fn(&Session) + Send + Sync>;

#[derive(Default)]
pub struct EventRegistry {
    callbacks: Mutex<HashMap<String, Vec<Callback>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        EventRegistry::default()
    }

    /// Register `cb` to run on every future `trigger(key, ...)`. Never
    /// removes or reorders existing callbacks for `key`.
    pub fn on(&self, key: impl Into<String>, cb: Callback) {
        self.callbacks.lock().unwrap().entry(key.into()).or_default().push(cb);
    }

    /// Run every callback registered for `key`, in registration order.
    pub fn trigger(&self, key: &str, session: &Session) {
        if let Some(cbs) = self.callbacks.lock().unwrap().get(key) {
            for cb in cbs {
                cb(session);
            }
        }
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<_> = self.callbacks.lock().unwrap().keys().cloned().collect();
        f.debug_struct("EventRegistry").field("keys", &keys).finish()
    }
}
