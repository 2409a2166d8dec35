//! Point cache: a bidirectional name↔UUID map populated lazily from
//! `StoreSession::get_point_bindings` (spec.md §4.6, §9).
//!
//! Invariants: a later registration for a name replaces the prior UUID for
//! that name, and the driver never serves a UUID that isn't the most
//! recently registered one for its name — resolving a name always either
//! asks the upstream or returns the latest binding, never a stale one.
//! Concurrent misses on the same key may issue duplicate upstream lookups;
//! that's accepted as the cost of the simpler lock shape (§9).

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::sql::error::Result;
use crate::sql::session::StoreSession;

#[derive(Default)]
struct Bindings {
    by_name: HashMap<String, Uuid>,
    by_uuid: HashMap<Uuid, String>,
}

pub struct PointCache {
    bindings: RwLock<Bindings>,
}

impl PointCache {
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(Bindings::default()),
        }
    }

    /// Replaces any prior binding for `name` (and for the UUID it used to
    /// point at, if different) with the given pair.
    pub fn register(&self, name: &str, uuid: Uuid) {
        let mut bindings = self.bindings.write();
        if let Some(prior) = bindings.by_name.insert(name.to_string(), uuid) {
            if prior != uuid {
                bindings.by_uuid.remove(&prior);
            }
        }
        bindings.by_uuid.insert(uuid, name.to_string());
    }

    pub fn name_for(&self, uuid: Uuid) -> Option<String> {
        self.bindings.read().by_uuid.get(&uuid).cloned()
    }

    pub fn uuid_for(&self, name: &str) -> Option<Uuid> {
        self.bindings.read().by_name.get(name).copied()
    }

    /// Resolves `name`, querying the upstream session on a cache miss.
    pub fn resolve(&self, session: &mut dyn StoreSession, name: &str) -> Result<Option<Uuid>> {
        if let Some(uuid) = self.uuid_for(name) {
            return Ok(Some(uuid));
        }
        let resolved = session.get_point_bindings(std::slice::from_ref(&name.to_string()))?;
        for (n, u) in &resolved {
            self.register(n, *u);
        }
        Ok(resolved.into_iter().find(|(n, _)| n == name).map(|(_, u)| u))
    }
}

impl Default for PointCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::session::InMemorySession;

    #[test]
    fn registration_replaces_prior_uuid_for_the_same_name() {
        let cache = PointCache::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        cache.register("T.x", first);
        cache.register("T.x", second);

        assert_eq!(cache.uuid_for("T.x"), Some(second));
        assert_eq!(cache.name_for(second), Some("T.x".to_string()));
        assert_eq!(cache.name_for(first), None, "stale uuid must not resolve");
    }

    #[test]
    fn resolve_asks_upstream_only_on_a_miss() {
        let cache = PointCache::new();
        let mut session = InMemorySession::new(10);
        let uuid = Uuid::new_v4();
        session.register_point("T.x", uuid);

        assert_eq!(cache.resolve(&mut session, "T.x").unwrap(), Some(uuid));
        assert_eq!(cache.uuid_for("T.x"), Some(uuid));
        assert_eq!(cache.resolve(&mut session, "T.unknown").unwrap(), None);
    }
}
