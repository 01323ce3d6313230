//! Shared fixture for the engine's unit tests.

use std::sync::Arc;

use engage_core::{
    Container, CourseId, Discussion, DiscussionId, FixedClock, Post, PostId, Preference,
    SubscriptionMode, Timestamp, UserId,
};
use engage_store::{
    ContainerRepo, DiscussionRepo, DiscussionSubscriptionRepo, NewContainer, NewDiscussion,
    NewPost, PostRepo, Store,
};

use crate::context::EngineContext;

pub(crate) const NOW: Timestamp = 1_000_000_000;

pub(crate) struct Fixture {
    pub ctx: EngineContext,
    pub clock: Arc<FixedClock>,
    pub container: Container,
}

impl Fixture {
    pub fn new(mode: SubscriptionMode) -> Self {
        Self::with_container(NewContainer {
            subscription_mode: mode,
            ..NewContainer::in_course(CourseId::new(1))
        })
    }

    pub fn with_container(new: NewContainer) -> Self {
        let store = Store::in_memory().unwrap();
        let container = store.with_conn(|conn| ContainerRepo::insert(conn, &new)).unwrap();
        let clock = Arc::new(FixedClock::new(NOW));
        let ctx = EngineContext::new(store).with_clock(clock.clone());
        Self { ctx, clock, container }
    }

    pub fn container_in_course(&self, mode: SubscriptionMode) -> Container {
        self.add_container(NewContainer {
            subscription_mode: mode,
            ..NewContainer::in_course(self.container.course_id)
        })
    }

    pub fn add_container(&self, new: NewContainer) -> Container {
        self.ctx
            .store
            .with_conn(|conn| ContainerRepo::insert(conn, &new))
            .unwrap()
    }

    pub fn discussion(&self, starter: UserId) -> Discussion {
        self.discussion_in(&self.container, starter)
    }

    pub fn discussion_in(&self, container: &Container, starter: UserId) -> Discussion {
        self.ctx
            .store
            .with_conn(|conn| {
                DiscussionRepo::insert(
                    conn,
                    &NewDiscussion {
                        container_id: container.id,
                        name: "topic".into(),
                        starter_user_id: starter,
                        time_modified: NOW,
                    },
                )
            })
            .unwrap()
    }

    /// A post created at `created`. The first post of a discussion becomes
    /// its root.
    pub fn post_at(&self, discussion: &Discussion, parent: PostId, author: UserId, created: Timestamp) -> Post {
        self.ctx
            .store
            .with_conn(|conn| {
                let post = PostRepo::insert(
                    conn,
                    &NewPost {
                        discussion_id: discussion.id,
                        parent_id: parent,
                        user_id: author,
                        created,
                        message: "text".into(),
                    },
                )?;
                if parent.is_unset() {
                    let _ = DiscussionRepo::set_first_post(conn, discussion.id, post.id)?;
                }
                Ok::<_, engage_store::StoreError>(post)
            })
            .unwrap()
    }

    pub fn post(&self, discussion: &Discussion, parent: PostId, author: UserId) -> Post {
        self.post_at(discussion, parent, author, NOW)
    }

    /// Discussion overrides of `user` in the fixture container.
    pub fn overrides(&self, user: UserId) -> Vec<(DiscussionId, Preference)> {
        self.ctx
            .store
            .with_conn(|conn| DiscussionSubscriptionRepo::list_for_user(conn, self.container.id, user))
            .unwrap()
            .into_iter()
            .map(|row| (row.discussion_id, row.preference))
            .collect()
    }
}
