//! Who is acting, what they may do, and who can see what.
//!
//! The engines perform no authorization of their own beyond the voting
//! rules. Capabilities arrive as plain booleans from the caller.

use std::collections::{HashMap, HashSet};

use engage_core::{Container, CourseId, Discussion, Post, PostId, UserId};

/// The user on whose behalf an operation runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub authenticated: bool,
    pub guest: bool,
}

impl Actor {
    /// A logged-in, non-guest user.
    pub const fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            authenticated: true,
            guest: false,
        }
    }

    pub const fn guest() -> Self {
        Self {
            user_id: UserId::new(0),
            authenticated: true,
            guest: true,
        }
    }

    pub const fn anonymous() -> Self {
        Self {
            user_id: UserId::new(0),
            authenticated: false,
            guest: false,
        }
    }

    /// Authenticated, not a guest, with a real id.
    pub fn is_real_user(&self) -> bool {
        self.authenticated && !self.guest && !self.user_id.is_unset()
    }
}

/// Capability checks resolved by the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub can_rate: bool,
    pub can_mark_solved: bool,
    pub can_manage_subscriptions: bool,
}

impl Capabilities {
    /// A student: may rate, nothing else.
    pub const fn student() -> Self {
        Self {
            can_rate: true,
            can_mark_solved: false,
            can_manage_subscriptions: false,
        }
    }

    pub const fn teacher() -> Self {
        Self {
            can_rate: true,
            can_mark_solved: true,
            can_manage_subscriptions: true,
        }
    }
}

/// Enrolment and visibility lookups used by mail dispatch.
pub trait Directory: Send + Sync {
    /// Users enrolled in the course, guests excluded.
    fn enrolled_users(&self, course: CourseId) -> Vec<UserId>;

    /// Whether `user` may see `post`.
    fn can_see_post(&self, user: UserId, post: &Post, discussion: &Discussion, container: &Container) -> bool;
}

/// In-memory [`Directory`]: explicit enrolments, every post visible unless
/// hidden for a user.
#[derive(Clone, Debug, Default)]
pub struct StaticDirectory {
    enrolled: HashMap<CourseId, Vec<UserId>>,
    hidden: HashSet<(UserId, PostId)>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn enroll(mut self, course: CourseId, users: impl IntoIterator<Item = UserId>) -> Self {
        let list = self.enrolled.entry(course).or_default();
        list.extend(users);
        list.sort_unstable();
        list.dedup();
        self
    }

    #[must_use]
    pub fn hide_post(mut self, user: UserId, post: PostId) -> Self {
        let _ = self.hidden.insert((user, post));
        self
    }
}

impl Directory for StaticDirectory {
    fn enrolled_users(&self, course: CourseId) -> Vec<UserId> {
        self.enrolled.get(&course).cloned().unwrap_or_default()
    }

    fn can_see_post(&self, user: UserId, post: &Post, _discussion: &Discussion, _container: &Container) -> bool {
        !self.hidden.contains(&(user, post.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_user_flags() {
        assert!(Actor::user(UserId::new(3)).is_real_user());
        assert!(!Actor::guest().is_real_user());
        assert!(!Actor::anonymous().is_real_user());
        assert!(!Actor::user(UserId::new(0)).is_real_user());
    }

    #[test]
    fn static_directory_dedups_and_sorts() {
        let course = CourseId::new(1);
        let dir = StaticDirectory::new()
            .enroll(course, [UserId::new(3), UserId::new(1)])
            .enroll(course, [UserId::new(1), UserId::new(2)]);
        assert_eq!(
            dir.enrolled_users(course),
            vec![UserId::new(1), UserId::new(2), UserId::new(3)]
        );
        assert!(dir.enrolled_users(CourseId::new(2)).is_empty());
    }
}
