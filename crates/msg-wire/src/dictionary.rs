//! Route compression dictionary: `route -> code` and its inverse.
//!
//! The original source keeps this as process-wide global state written at
//! registration and at member join. Per the re-architecture notes, this
//! crate makes it an explicit value owned by whichever `Runtime` constructs
//! it, so tests can hold independent dictionaries side by side.

use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct RouteDictionary {
    forward: HashMap<String, u16>,
    backward: HashMap<u16, String>,
}

impl RouteDictionary {
    pub fn new() -> Self {
        RouteDictionary::default()
    }

    /// Assign or overwrite `route`'s compressed code. Overwriting a route
    /// that already had a different code also drops the stale reverse
    /// entry, keeping `forward`/`backward` consistent.
    pub fn insert(&mut self, route: String, code: u16) {
        if let Some(old_code) = self.forward.get(&route).copied() {
            if old_code != code {
                self.backward.remove(&old_code);
            }
        }
        self.backward.insert(code, route.clone());
        self.forward.insert(route, code);
    }

    pub fn code_for(&self, route: &str) -> Option<u16> {
        self.forward.get(route).copied()
    }

    pub fn route_for(&self, code: u16) -> Option<String> {
        self.backward.get(&code).cloned()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Snapshot suitable for pushing in a handshake ack or a member's
    /// `NewMember` announcement.
    pub fn snapshot(&self) -> HashMap<String, u16> {
        self.forward.clone()
    }

    /// Merge a peer's dictionary snapshot into this one (used when a member
    /// joins and advertises routes this node hasn't seen yet).
    pub fn merge(&mut self, other: &HashMap<String, u16>) {
        for (route, code) in other {
            self.insert(route.clone(), *code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_of_encode_is_identity() {
        let mut dict = RouteDictionary::new();
        dict.insert("Room.Join".to_string(), 1);
        dict.insert("Room.Leave".to_string(), 2);
        for (route, code) in dict.snapshot() {
            assert_eq!(dict.route_for(code).as_deref(), Some(route.as_str()));
        }
    }

    #[test]
    fn reinserting_a_route_under_a_new_code_drops_the_old_reverse_entry() {
        let mut dict = RouteDictionary::new();
        dict.insert("Room.Join".to_string(), 1);
        dict.insert("Room.Join".to_string(), 2);
        assert_eq!(dict.route_for(1), None);
        assert_eq!(dict.route_for(2).as_deref(), Some("Room.Join"));
        assert_eq!(dict.code_for("Room.Join"), Some(2));
    }
}
