//! Subscription caches.
//!
//! Both caches are sharded maps so concurrent readers never lose an
//! insert-if-absent. A container id in a `fetched` set means every row of
//! that container has been loaded, so a miss is an authoritative "no row".

use std::collections::HashMap;

use dashmap::{DashMap, DashSet};
use engage_core::{ContainerId, DiscussionId, Preference, UserId};

/// Container-level subscription flags per (user, container).
#[derive(Debug, Default)]
pub struct ContainerCache {
    entries: DashMap<(UserId, ContainerId), bool>,
    fetched: DashSet<ContainerId>,
}

impl ContainerCache {
    pub fn get(&self, user: UserId, container: ContainerId) -> Option<bool> {
        if let Some(subscribed) = self.entries.get(&(user, container)) {
            return Some(*subscribed);
        }
        self.fetched.contains(&container).then_some(false)
    }

    pub fn set(&self, user: UserId, container: ContainerId, subscribed: bool) {
        let _ = self.entries.insert((user, container), subscribed);
    }

    /// Set only when nothing is cached yet.
    pub fn set_if_absent(&self, user: UserId, container: ContainerId, subscribed: bool) {
        let _ = self.entries.entry((user, container)).or_insert(subscribed);
    }

    pub fn is_fetched(&self, container: ContainerId) -> bool {
        self.fetched.contains(&container)
    }

    pub fn mark_fetched(&self, container: ContainerId) {
        let _ = self.fetched.insert(container);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.fetched.clear();
    }
}

/// Raw discussion overrides per (user, container).
///
/// A map is either absent or holds every override of that user in that
/// container. Writes never create a partial map.
#[derive(Debug, Default)]
pub struct DiscussionCache {
    entries: DashMap<(UserId, ContainerId), HashMap<DiscussionId, Preference>>,
    fetched: DashSet<ContainerId>,
}

impl DiscussionCache {
    /// The user's overrides in the container, if known.
    pub fn get(&self, user: UserId, container: ContainerId) -> Option<HashMap<DiscussionId, Preference>> {
        if let Some(map) = self.entries.get(&(user, container)) {
            return Some(map.clone());
        }
        self.fetched.contains(&container).then(HashMap::new)
    }

    pub fn get_one(&self, user: UserId, container: ContainerId, discussion: DiscussionId) -> Option<Option<Preference>> {
        if let Some(map) = self.entries.get(&(user, container)) {
            return Some(map.get(&discussion).copied());
        }
        self.fetched.contains(&container).then_some(None)
    }

    /// Store the complete override map of one user.
    pub fn put(&self, user: UserId, container: ContainerId, map: HashMap<DiscussionId, Preference>) {
        let _ = self.entries.insert((user, container), map);
    }

    /// Replace every map of the container and mark it fetched.
    pub fn put_container(&self, container: ContainerId, maps: HashMap<UserId, HashMap<DiscussionId, Preference>>) {
        self.entries.retain(|(_, c), _| *c != container);
        for (user, map) in maps {
            let _ = self.entries.insert((user, container), map);
        }
        let _ = self.fetched.insert(container);
    }

    /// Record one override. Ignored when the user's map is unknown.
    pub fn set(&self, user: UserId, container: ContainerId, discussion: DiscussionId, preference: Preference) {
        if let Some(mut map) = self.entries.get_mut(&(user, container)) {
            let _ = map.insert(discussion, preference);
            return;
        }
        if self.fetched.contains(&container) {
            let _ = self
                .entries
                .insert((user, container), HashMap::from([(discussion, preference)]));
        }
    }

    pub fn remove(&self, user: UserId, container: ContainerId, discussion: DiscussionId) {
        if let Some(mut map) = self.entries.get_mut(&(user, container)) {
            let _ = map.remove(&discussion);
        }
    }

    /// Drop cached overrides matching `predicate`.
    pub fn remove_where(&self, user: UserId, container: ContainerId, predicate: impl Fn(&Preference) -> bool) {
        if let Some(mut map) = self.entries.get_mut(&(user, container)) {
            map.retain(|_, preference| !predicate(preference));
        }
    }

    pub fn is_fetched(&self, container: ContainerId) -> bool {
        self.fetched.contains(&container)
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.fetched.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
