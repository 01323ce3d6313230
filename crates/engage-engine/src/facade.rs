//! One handle over the three engines, plus the jobs that span them.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use engage_core::{
    Container, ContainerId, Discussion, DiscussionId, MailedState, Post, PostId, Preference,
    SubscriptionMode, Timestamp, UserId,
};
use engage_store::{ContainerRepo, DiscussionRepo, PostRepo};
use tracing::{debug, info, instrument, warn};

use crate::context::EngineContext;
use crate::error::{EngineError, Result};
use crate::identity::{Capabilities, Directory};
use crate::ratings::ReputationEngine;
use crate::readtracking::ReadTracker;
use crate::subscriptions::{SubscribeOutcome, SubscriptionResolver};

const SECS_PER_HOUR: i64 = 3_600;

/// One notification to deliver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailItem {
    pub recipient: UserId,
    pub post_id: PostId,
    pub discussion_id: DiscussionId,
    pub container_id: ContainerId,
    pub author_id: UserId,
    pub author_reputation: i64,
}

/// Output of [`Engagement::plan_mail_dispatch`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MailBatch {
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    /// Pending posts created before `window_end` that were marked sent.
    pub marked_sent: usize,
    pub items: Vec<MailItem>,
    /// Posts whose discussion or container no longer exists.
    pub skipped: Vec<PostId>,
}

impl MailBatch {
    pub fn recipients_of(&self, post: PostId) -> Vec<UserId> {
        self.items
            .iter()
            .filter(|item| item.post_id == post)
            .map(|item| item.recipient)
            .collect()
    }
}

/// Engine handle for one request or batch job. Caches live as long as it.
#[derive(Debug)]
pub struct Engagement {
    ctx: EngineContext,
    pub subscriptions: SubscriptionResolver,
    pub ratings: ReputationEngine,
    pub reads: ReadTracker,
}

impl Engagement {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            subscriptions: SubscriptionResolver::new(ctx.clone()),
            ratings: ReputationEngine::new(ctx.clone()),
            reads: ReadTracker::new(ctx.clone()),
            ctx,
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn container(&self, id: ContainerId) -> Result<Container> {
        self.ctx
            .store
            .with_conn(|conn| ContainerRepo::get(conn, id))?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    pub fn discussion(&self, id: DiscussionId) -> Result<Discussion> {
        self.ctx
            .store
            .with_conn(|conn| DiscussionRepo::get(conn, id))?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    pub fn post(&self, id: PostId) -> Result<Post> {
        self.ctx
            .store
            .with_conn(|conn| PostRepo::get(conn, id))?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    /// Change a container's subscription mode on behalf of a manager.
    pub fn set_subscription_mode(
        &self,
        container: ContainerId,
        mode: SubscriptionMode,
        caps: Capabilities,
    ) -> Result<()> {
        if !caps.can_manage_subscriptions {
            return Err(EngineError::PermissionDenied("cannot manage subscriptions".into()));
        }
        self.subscriptions.set_subscription_mode(container, mode)?;
        self.subscriptions.reset();
        Ok(())
    }

    /// Creation hook for `Initial` containers: subscribe every given user.
    /// Returns how many subscriptions were created.
    #[instrument(skip_all, fields(container = container.id.get(), users = users.len()))]
    pub fn apply_initial_subscriptions(&self, container: &Container, users: &[UserId]) -> Result<usize> {
        if container.subscription_mode != SubscriptionMode::Initial {
            return Ok(0);
        }
        let mut created = 0;
        for &user in users {
            if let SubscribeOutcome::Subscribed(_) = self.subscriptions.subscribe_user(user, container, false)? {
                created += 1;
            }
        }
        info!(created, "initial subscriptions applied");
        Ok(created)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mail dispatch
    // ─────────────────────────────────────────────────────────────────────

    /// Work out who gets notified of which pending posts.
    ///
    /// The window ends `max_editing_time_secs` ago, so posts still open for
    /// editing wait for a later run, and reaches back `max_mailing_time_hours`.
    /// Every pending post created before the window end is marked sent.
    #[instrument(skip_all)]
    pub fn plan_mail_dispatch(&self, directory: &dyn Directory) -> Result<MailBatch> {
        let settings = &self.ctx.settings;
        let window_end = self.ctx.now() - settings.rating.max_editing_time_secs;
        let window_start = window_end - settings.mail.max_mailing_time_hours * SECS_PER_HOUR;

        let (posts, marked_sent) = self.ctx.store.with_transaction(|conn| {
            let posts = PostRepo::unmailed(conn, window_start, window_end)?;
            let marked = PostRepo::mark_pending_as_sent(conn, window_end)?;
            Ok::<_, EngineError>((posts, marked))
        })?;
        debug!(posts = posts.len(), marked_sent, "mail window loaded");

        let mut batch = MailBatch {
            window_start,
            window_end,
            marked_sent,
            ..MailBatch::default()
        };
        let mut discussions: HashMap<DiscussionId, Option<Discussion>> = HashMap::new();
        let mut containers: HashMap<ContainerId, Option<(Container, Vec<UserId>)>> = HashMap::new();
        let mut reputations: HashMap<(ContainerId, UserId), i64> = HashMap::new();

        for post in &posts {
            let discussion = match discussions.entry(post.discussion_id) {
                Entry::Occupied(found) => found.get().clone(),
                Entry::Vacant(slot) => {
                    let loaded = self
                        .ctx
                        .store
                        .with_conn(|conn| DiscussionRepo::get(conn, post.discussion_id))?;
                    slot.insert(loaded).clone()
                }
            };
            let Some(discussion) = discussion else {
                warn!(post = post.id.get(), discussion = post.discussion_id.get(), "discussion is gone");
                batch.skipped.push(post.id);
                continue;
            };

            if !containers.contains_key(&discussion.container_id) {
                let loaded = self.load_recipients(discussion.container_id, directory)?;
                let _ = containers.insert(discussion.container_id, loaded);
            }
            let Some(Some((container, recipients))) = containers.get(&discussion.container_id) else {
                warn!(post = post.id.get(), container = discussion.container_id.get(), "container is gone");
                batch.skipped.push(post.id);
                continue;
            };

            for &recipient in recipients {
                if !self.wants_post(recipient, post, &discussion, container)? {
                    continue;
                }
                if !directory.can_see_post(recipient, post, &discussion, container) {
                    continue;
                }
                let author_reputation = match reputations.entry((container.id, post.user_id)) {
                    Entry::Occupied(found) => *found.get(),
                    Entry::Vacant(slot) => *slot.insert(self.ratings.get_reputation(container, post.user_id)?),
                };
                batch.items.push(MailItem {
                    recipient,
                    post_id: post.id,
                    discussion_id: discussion.id,
                    container_id: container.id,
                    author_id: post.user_id,
                    author_reputation,
                });
            }
        }

        info!(
            items = batch.items.len(),
            skipped = batch.skipped.len(),
            marked_sent,
            "mail dispatch planned"
        );
        Ok(batch)
    }

    /// Bulk-fill both subscription caches for the container and list its
    /// candidate recipients. `None` when the container is gone.
    fn load_recipients(
        &self,
        container: ContainerId,
        directory: &dyn Directory,
    ) -> Result<Option<(Container, Vec<UserId>)>> {
        let Some(container) = self.ctx.store.with_conn(|conn| ContainerRepo::get(conn, container))? else {
            return Ok(None);
        };
        self.subscriptions.fill_subscription_cache(container.id, None)?;
        self.subscriptions.fill_discussion_subscription_cache(container.id, None)?;
        let enrolled = directory.enrolled_users(container.course_id);
        let recipients = self.subscriptions.get_subscribed_users(&container, &enrolled, true)?;
        debug!(container = container.id.get(), recipients = recipients.len(), "recipients resolved");
        Ok(Some((container, recipients)))
    }

    /// Subscribed to the discussion, and not only since after the post.
    fn wants_post(&self, user: UserId, post: &Post, discussion: &Discussion, container: &Container) -> Result<bool> {
        if !self.subscriptions.is_subscribed(user, container, Some(discussion.id))? {
            return Ok(false);
        }
        let preference = self
            .subscriptions
            .discussion_preference(user, container.id, discussion.id)?;
        Ok(!matches!(preference, Some(Preference::SubscribedSince(since)) if since > post.created))
    }

    /// Record failed deliveries. Returns how many posts were updated.
    pub fn finish_mail_dispatch(&self, failed: &[PostId]) -> Result<usize> {
        let updated = self.ctx.store.with_transaction(|conn| {
            let mut updated = 0;
            for &post in failed {
                if PostRepo::set_mailed(conn, post, MailedState::Error)? {
                    updated += 1;
                }
            }
            Ok::<_, EngineError>(updated)
        })?;
        if updated > 0 {
            warn!(updated, "posts marked as failed deliveries");
        }
        Ok(updated)
    }

    /// Drop every cache. Call between independent units of work.
    pub fn reset_caches(&self) {
        self.subscriptions.reset();
        self.reads.reset_unread_cache();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
