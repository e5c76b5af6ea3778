//! Session-sticky routing: once a session's router binds a service to a
//! backend address, that binding is never replaced for the session's
//! lifetime.

use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct Router {
    bindings: RwLock<HashMap<String, String>>,
}

impl Router {
    pub fn new() -> Self {
        Router::default()
    }

    pub fn find(&self, service: &str) -> Option<String> {
        self.bindings.read().unwrap().get(service).cloned()
    }

    /// Bind `service` to `addr` if it isn't already bound. Returns the
    /// address now in effect for `service` — `addr` on first bind, the
    /// existing sticky address otherwise.
    pub fn bind(&self, service: &str, addr: &str) -> String {
        let mut bindings = self.bindings.write().unwrap();
        bindings.entry(service.to_string()).or_insert_with(|| addr.to_string()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_is_sticky_once_set() {
        let router = Router::new();
        assert_eq!(router.bind("Chat", "10.0.0.1:9002"), "10.0.0.1:9002");
        assert_eq!(router.bind("Chat", "10.0.0.2:9002"), "10.0.0.1:9002");
        assert_eq!(router.find("Chat").as_deref(), Some("10.0.0.1:9002"));
    }
}
