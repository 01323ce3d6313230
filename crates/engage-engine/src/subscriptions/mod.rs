//! Subscription Resolver.
//!
//! Answers "is this user a notification target for this container, or for
//! one discussion of it?" and applies subscribe/unsubscribe requests.
//!
//! Container subscriptions are rows; discussion subscriptions are overrides
//! against the container default. A user subscribed to the whole container
//! only gets a discussion row to opt out of it, and an unsubscribed user
//! only gets one to opt in. Both levels are cached per resolver instance,
//! which lives for one request or batch job.

pub mod cache;
pub mod resolve;

use std::collections::{BTreeSet, HashMap};

use engage_core::{
    Container, ContainerId, CourseId, Discussion, DiscussionId, EngagementEvent, EventKind,
    Preference, SubscriptionId, SubscriptionMode, UserId,
};
use engage_store::{ContainerRepo, ContainerSubscriptionRepo, DiscussionSubscriptionRepo};
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::context::EngineContext;
use crate::error::{EngineError, Result};
use crate::identity::Actor;

pub use cache::{ContainerCache, DiscussionCache};
pub use resolve::resolve;

/// Result of [`SubscriptionResolver::subscribe_user`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// The user was already effectively subscribed. Nothing was written.
    AlreadySubscribed,
    Subscribed(SubscriptionId),
}

#[derive(Debug)]
pub struct SubscriptionResolver {
    ctx: EngineContext,
    containers: ContainerCache,
    discussions: DiscussionCache,
}

impl SubscriptionResolver {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            containers: ContainerCache::default(),
            discussions: DiscussionCache::default(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Resolution
    // ─────────────────────────────────────────────────────────────────────

    /// Whether `user` is a notification target for the container, or for
    /// `discussion` inside it when given.
    pub fn is_subscribed(
        &self,
        user: UserId,
        container: &Container,
        discussion: Option<DiscussionId>,
    ) -> Result<bool> {
        if container.is_forced() {
            return Ok(true);
        }
        let container_subscribed = self.fetch_container_subscription(user, container.id)?;
        let discussion_override = match discussion {
            Some(discussion) => self
                .fetch_discussion_subscriptions(container.id, user)?
                .get(&discussion)
                .copied(),
            None => None,
        };
        Ok(resolve(false, container_subscribed, discussion_override))
    }

    /// Container-level flag, loading the single row on a miss.
    pub fn fetch_container_subscription(&self, user: UserId, container: ContainerId) -> Result<bool> {
        if let Some(subscribed) = self.containers.get(user, container) {
            return Ok(subscribed);
        }
        self.fill_subscription_cache(container, Some(user))?;
        Ok(self.containers.get(user, container).unwrap_or(false))
    }

    /// Load container subscriptions into the cache.
    ///
    /// With a user, loads that one row. Without, loads every row of the
    /// container in one query and marks it fully fetched. Does nothing once
    /// the container is fully fetched.
    #[instrument(skip_all, fields(container = container.get(), user = user.map(UserId::get)))]
    pub fn fill_subscription_cache(&self, container: ContainerId, user: Option<UserId>) -> Result<()> {
        if self.containers.is_fetched(container) {
            return Ok(());
        }
        match user {
            Some(user) => {
                let subscribed = self
                    .ctx
                    .store
                    .with_conn(|conn| ContainerSubscriptionRepo::exists(conn, user, container))?;
                self.containers.set_if_absent(user, container, subscribed);
            }
            None => {
                let users = self
                    .ctx
                    .store
                    .with_conn(|conn| ContainerSubscriptionRepo::list_users(conn, container))?;
                debug!(rows = users.len(), "container subscriptions loaded");
                for user in users {
                    self.containers.set(user, container, true);
                }
                self.containers.mark_fetched(container);
            }
        }
        Ok(())
    }

    /// Set the container-level flag of `user` for every non-forced container
    /// of the course in one query.
    #[instrument(skip_all, fields(course = course.get(), user = user.get()))]
    pub fn fill_subscription_cache_for_course(&self, course: CourseId, user: UserId) -> Result<()> {
        let flags = self
            .ctx
            .store
            .with_conn(|conn| ContainerSubscriptionRepo::course_flags(conn, course, user))?;
        debug!(rows = flags.len(), "course subscription flags loaded");
        for (container, subscribed) in flags {
            self.containers.set(user, container, subscribed);
        }
        Ok(())
    }

    /// Load discussion overrides into the cache: one user's, or every
    /// user's when `user` is `None` (marks the container fully fetched).
    #[instrument(skip_all, fields(container = container.get(), user = user.map(UserId::get)))]
    pub fn fill_discussion_subscription_cache(&self, container: ContainerId, user: Option<UserId>) -> Result<()> {
        if self.discussions.is_fetched(container) {
            return Ok(());
        }
        match user {
            Some(user) => {
                if self.discussions.get(user, container).is_some() {
                    return Ok(());
                }
                let rows = self
                    .ctx
                    .store
                    .with_conn(|conn| DiscussionSubscriptionRepo::list_for_user(conn, container, user))?;
                let map = rows.into_iter().map(|r| (r.discussion_id, r.preference)).collect();
                self.discussions.put(user, container, map);
            }
            None => {
                let rows = self
                    .ctx
                    .store
                    .with_conn(|conn| DiscussionSubscriptionRepo::list_for_container(conn, container))?;
                debug!(rows = rows.len(), "discussion subscriptions loaded");
                let mut maps: HashMap<UserId, HashMap<DiscussionId, Preference>> = HashMap::new();
                for row in rows {
                    let _ = maps
                        .entry(row.user_id)
                        .or_default()
                        .insert(row.discussion_id, row.preference);
                }
                self.discussions.put_container(container, maps);
            }
        }
        Ok(())
    }

    /// The user's discussion overrides in the container.
    pub fn fetch_discussion_subscriptions(
        &self,
        container: ContainerId,
        user: UserId,
    ) -> Result<HashMap<DiscussionId, Preference>> {
        if let Some(map) = self.discussions.get(user, container) {
            return Ok(map);
        }
        self.fill_discussion_subscription_cache(container, Some(user))?;
        Ok(self.discussions.get(user, container).unwrap_or_default())
    }

    /// Discussion override of one discussion, if any.
    pub fn discussion_preference(
        &self,
        user: UserId,
        container: ContainerId,
        discussion: DiscussionId,
    ) -> Result<Option<Preference>> {
        if let Some(preference) = self.discussions.get_one(user, container, discussion) {
            return Ok(preference);
        }
        Ok(self.fetch_discussion_subscriptions(container, user)?.get(&discussion).copied())
    }

    /// Enrolled users who receive notifications for the container.
    ///
    /// Forced containers reach every enrolled user. Otherwise container
    /// subscribers, plus users with an active discussion subscription when
    /// `include_discussions` is set, restricted to `enrolled`. Sorted by id.
    pub fn get_subscribed_users(
        &self,
        container: &Container,
        enrolled: &[UserId],
        include_discussions: bool,
    ) -> Result<Vec<UserId>> {
        let enrolled: BTreeSet<UserId> = enrolled.iter().copied().collect();
        if container.is_forced() {
            return Ok(enrolled.into_iter().collect());
        }
        let mut subscribed: BTreeSet<UserId> = self
            .ctx
            .store
            .with_conn(|conn| ContainerSubscriptionRepo::list_users(conn, container.id))?
            .into_iter()
            .collect();
        if include_discussions {
            let discussion_users = self
                .ctx
                .store
                .with_conn(|conn| DiscussionSubscriptionRepo::list_active_users(conn, container.id))?;
            subscribed.extend(discussion_users);
        }
        Ok(subscribed.intersection(&enrolled).copied().collect())
    }

    /// Non-forced containers of the courses the user could unsubscribe from.
    pub fn get_unsubscribable_containers(&self, user: UserId, courses: &[CourseId]) -> Result<Vec<ContainerId>> {
        Ok(self
            .ctx
            .store
            .with_conn(|conn| ContainerSubscriptionRepo::unsubscribable(conn, user, courses))?)
    }

    /// Whether the actor may choose to subscribe to the container.
    pub fn is_subscribable(&self, actor: &Actor, container: &Container) -> bool {
        actor.is_real_user() && !container.is_forced() && !container.subscription_disabled()
    }

    pub fn is_forced(&self, container: &Container) -> bool {
        container.is_forced()
    }

    pub fn subscription_disabled(&self, container: &Container) -> bool {
        container.subscription_disabled()
    }

    pub fn subscription_mode(&self, container: ContainerId) -> Result<SubscriptionMode> {
        self.ctx
            .store
            .with_conn(|conn| ContainerRepo::get(conn, container))?
            .map(|c| c.subscription_mode)
            .ok_or_else(|| EngineError::NotFound(container.to_string()))
    }

    pub fn set_subscription_mode(&self, container: ContainerId, mode: SubscriptionMode) -> Result<()> {
        let updated = self
            .ctx
            .store
            .with_conn(|conn| ContainerRepo::set_subscription_mode(conn, container, mode))?;
        if !updated {
            return Err(EngineError::NotFound(container.to_string()));
        }
        info!(container = container.get(), mode = %mode, "subscription mode changed");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Container-level changes
    // ─────────────────────────────────────────────────────────────────────

    /// Subscribe `user` to the whole container.
    ///
    /// When the user asked for it, their active discussion subscriptions in
    /// the container collapse into the container subscription. Opt-outs are
    /// kept.
    #[instrument(skip_all, fields(container = container.id.get(), user = user.get()))]
    pub fn subscribe_user(&self, user: UserId, container: &Container, user_requested: bool) -> Result<SubscribeOutcome> {
        if self.is_subscribed(user, container, None)? {
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }

        let (inserted, collapsed) = self.ctx.store.with_transaction(|conn| {
            let Some(id) = ContainerSubscriptionRepo::insert_if_absent(conn, user, container.id)? else {
                return Ok::<_, EngineError>((None, 0));
            };
            let collapsed = if user_requested {
                DiscussionSubscriptionRepo::delete_active_for_user(conn, container.id, user)?
            } else {
                0
            };
            Ok((Some(id), collapsed))
        })?;

        self.containers.set(user, container.id, true);
        let Some(id) = inserted else {
            return Ok(SubscribeOutcome::AlreadySubscribed);
        };
        if user_requested {
            self.discussions.remove_where(user, container.id, |p| p.is_subscribed());
        }
        info!(subscription = id.get(), collapsed, "user subscribed to container");

        self.ctx.emit(
            &EngagementEvent::new(EventKind::SubscriptionCreated, id.get(), container.id, self.ctx.now())
                .with_related_user(user)
                .with_other(json!({ "containerId": container.id })),
        )?;
        Ok(SubscribeOutcome::Subscribed(id))
    }

    /// Remove the container subscription of `user`. Always succeeds.
    ///
    /// When the user asked for it, their discussion opt-outs in the
    /// container go too, since there is no longer a container subscription
    /// to opt out of.
    #[instrument(skip_all, fields(container = container.id.get(), user = user.get()))]
    pub fn unsubscribe_user(&self, user: UserId, container: &Container, user_requested: bool) -> Result<bool> {
        let removed = self.ctx.store.with_transaction(|conn| {
            let Some(id) = ContainerSubscriptionRepo::delete(conn, user, container.id)? else {
                return Ok::<_, EngineError>(None);
            };
            if user_requested {
                let _ = DiscussionSubscriptionRepo::delete_unsubscribed_for_user(conn, container.id, user)?;
            }
            Ok(Some(id))
        })?;

        let Some(id) = removed else {
            self.containers.set(user, container.id, false);
            return Ok(true);
        };
        if user_requested {
            self.discussions.remove_where(user, container.id, |p| !p.is_subscribed());
        }
        self.containers.set(user, container.id, false);
        info!(subscription = id.get(), "user unsubscribed from container");

        self.ctx.emit(
            &EngagementEvent::new(EventKind::SubscriptionDeleted, id.get(), container.id, self.ctx.now())
                .with_related_user(user)
                .with_other(json!({ "containerId": container.id })),
        )?;
        Ok(true)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Discussion-level changes
    // ─────────────────────────────────────────────────────────────────────

    /// Opt `user` into one discussion. `false` when nothing changed.
    #[instrument(skip_all, fields(discussion = discussion.id.get(), user = user.get()))]
    pub fn subscribe_user_to_discussion(
        &self,
        user: UserId,
        discussion: &Discussion,
        container: &Container,
    ) -> Result<bool> {
        let existing = self
            .ctx
            .store
            .with_conn(|conn| DiscussionSubscriptionRepo::get(conn, user, discussion.id))?;
        if existing.is_some_and(|row| row.preference.is_subscribed()) {
            return Ok(false);
        }

        let object_id = if self.fetch_container_subscription(user, container.id)? {
            // Only an opt-out can separate a container subscriber from the discussion.
            let Some(row) = existing else {
                return Ok(false);
            };
            let _ = self
                .ctx
                .store
                .with_conn(|conn| DiscussionSubscriptionRepo::delete(conn, row.id))?;
            self.discussions.remove(user, container.id, discussion.id);
            row.id
        } else {
            let preference = Preference::SubscribedSince(self.ctx.now());
            let id = self.ctx.store.with_conn(|conn| match existing {
                Some(row) => {
                    let _ = DiscussionSubscriptionRepo::update_preference(conn, row.id, preference)?;
                    Ok::<_, EngineError>(row.id)
                }
                None => Ok(DiscussionSubscriptionRepo::insert(
                    conn,
                    user,
                    discussion.id,
                    container.id,
                    preference,
                )?),
            })?;
            self.discussions.set(user, container.id, discussion.id, preference);
            id
        };
        info!("user subscribed to discussion");

        self.ctx.emit(
            &EngagementEvent::new(
                EventKind::DiscussionSubscriptionCreated,
                object_id.get(),
                container.id,
                self.ctx.now(),
            )
            .with_related_user(user)
            .with_other(json!({ "containerId": container.id, "discussion": discussion.id })),
        )?;
        Ok(true)
    }

    /// Opt `user` out of one discussion. `false` when nothing changed.
    #[instrument(skip_all, fields(discussion = discussion.id.get(), user = user.get()))]
    pub fn unsubscribe_user_from_discussion(
        &self,
        user: UserId,
        discussion: &Discussion,
        container: &Container,
    ) -> Result<bool> {
        let existing = self
            .ctx
            .store
            .with_conn(|conn| DiscussionSubscriptionRepo::get(conn, user, discussion.id))?;
        if existing.is_some_and(|row| !row.preference.is_subscribed()) {
            return Ok(false);
        }

        let object_id = if self.fetch_container_subscription(user, container.id)? {
            let preference = Preference::ExplicitlyUnsubscribed;
            let id = self.ctx.store.with_conn(|conn| match existing {
                Some(row) => {
                    let _ = DiscussionSubscriptionRepo::update_preference(conn, row.id, preference)?;
                    Ok::<_, EngineError>(row.id)
                }
                None => Ok(DiscussionSubscriptionRepo::insert(
                    conn,
                    user,
                    discussion.id,
                    container.id,
                    preference,
                )?),
            })?;
            self.discussions.set(user, container.id, discussion.id, preference);
            id
        } else {
            let Some(row) = existing else {
                return Ok(false);
            };
            let _ = self
                .ctx
                .store
                .with_conn(|conn| DiscussionSubscriptionRepo::delete(conn, row.id))?;
            self.discussions.remove(user, container.id, discussion.id);
            row.id
        };
        info!("user unsubscribed from discussion");

        self.ctx.emit(
            &EngagementEvent::new(
                EventKind::DiscussionSubscriptionDeleted,
                object_id.get(),
                container.id,
                self.ctx.now(),
            )
            .with_related_user(user)
            .with_other(json!({ "containerId": container.id, "discussion": discussion.id })),
        )?;
        Ok(true)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Cache lifetime
    // ─────────────────────────────────────────────────────────────────────

    pub fn reset_container_cache(&self) {
        self.containers.clear();
    }

    pub fn reset_discussion_cache(&self) {
        self.discussions.clear();
    }

    pub fn reset(&self) {
        self.reset_container_cache();
        self.reset_discussion_cache();
    }

    pub fn container_cache(&self) -> &ContainerCache {
        &self.containers
    }

    pub fn discussion_cache(&self) -> &DiscussionCache {
        &self.discussions
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
