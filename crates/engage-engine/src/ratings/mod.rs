//! Reputation Engine: votes, per-post tallies, reputation and answer ordering.
//!
//! Up and down votes are one per (user, post). Solved and helpful are marks:
//! at most one of each per discussion, and placing one again moves it.

pub mod sort;

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use engage_core::{
    Container, ContainerId, Discussion, DiscussionId, EngagementEvent, EventKind, Post, PostId,
    PostVotes, ReputationScope, UserId, Vote, VoteAction, VoteId, VoteKind,
};
use engage_store::{ContainerRepo, DiscussionRepo, NewVote, PostRepo, ReceivedVotes, VoteRepo};
use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::context::EngineContext;
use crate::error::{EngineError, Result};
use crate::identity::Capabilities;

pub use sort::{AnswerMarks, RankedPost, sort_answers_by_rating};

/// What [`ReputationEngine::add_vote`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    Neutral,
    Created(VoteId),
    Updated(VoteId),
    Removed(VoteId),
}

impl VoteOutcome {
    pub fn vote_id(self) -> Option<VoteId> {
        match self {
            Self::Neutral => None,
            Self::Created(id) | Self::Updated(id) | Self::Removed(id) => Some(id),
        }
    }
}

/// A validated vote request, resolved against the store.
struct Target {
    post: Post,
    discussion: Discussion,
}

#[derive(Debug)]
pub struct ReputationEngine {
    ctx: EngineContext,
    /// Serializes vote mutations per discussion.
    locks: DashMap<DiscussionId, Arc<Mutex<()>>>,
}

impl ReputationEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            locks: DashMap::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Voting
    // ─────────────────────────────────────────────────────────────────────

    /// [`Self::add_vote`] for a legacy integer action code.
    pub fn add_vote_code(
        &self,
        container: &Container,
        post: PostId,
        code: i64,
        user: UserId,
        caps: Capabilities,
    ) -> Result<VoteOutcome> {
        let action = VoteAction::from_code(code)
            .ok_or_else(|| EngineError::InvalidState(format!("unrecognized vote code {code}")))?;
        self.add_vote(container, post, action, user, caps)
    }

    /// Apply or remove a vote by `user` on `post`.
    #[instrument(skip_all, fields(container = container.id.get(), post = post.get(), user = user.get(), action = action.code()))]
    pub fn add_vote(
        &self,
        container: &Container,
        post: PostId,
        action: VoteAction,
        user: UserId,
        caps: Capabilities,
    ) -> Result<VoteOutcome> {
        if !caps.can_rate {
            return Err(EngineError::PermissionDenied(format!("{user} may not rate")));
        }
        let target = self.load_target(container, post)?;
        let Some(kind) = action.kind() else {
            return Ok(VoteOutcome::Neutral);
        };

        if target.post.user_id == user && !(kind == VoteKind::Solved && caps.can_mark_solved) {
            return Err(EngineError::PermissionDenied(format!(
                "{user} may not vote on their own {post}"
            )));
        }

        let lock = self.discussion_lock(target.discussion.id);
        let outcome = {
            let _guard = lock.lock();
            match action {
                VoteAction::Neutral => Ok(VoteOutcome::Neutral),
                VoteAction::Remove(kind) => self.remove_vote(&target, user, kind),
                VoteAction::Apply(kind) if kind.is_mark() => self.place_mark(&target, container.id, user, kind, caps),
                VoteAction::Apply(kind) => self.cast_vote(&target, container.id, user, kind),
            }
        };
        drop(lock);
        self.release_discussion_lock(target.discussion.id);
        let outcome = outcome?;

        let event_kind = match outcome {
            VoteOutcome::Neutral => return Ok(outcome),
            VoteOutcome::Created(_) => EventKind::RatingCreated,
            VoteOutcome::Updated(_) => EventKind::RatingUpdated,
            VoteOutcome::Removed(_) => EventKind::RatingDeleted,
        };
        let vote_id = outcome.vote_id().unwrap_or_default();
        info!(vote = vote_id.get(), kind = %kind, event = %event_kind, "vote recorded");
        self.ctx.emit(
            &EngagementEvent::new(event_kind, vote_id.get(), container.id, self.ctx.now())
                .with_related_user(target.post.user_id)
                .with_other(json!({
                    "postId": target.post.id,
                    "discussionId": target.discussion.id,
                    "kind": kind.as_str(),
                })),
        )?;
        Ok(outcome)
    }

    fn load_target(&self, container: &Container, post: PostId) -> Result<Target> {
        let (post_row, discussion) = self.ctx.store.with_conn(|conn| {
            let Some(post_row) = PostRepo::get(conn, post)? else {
                return Err(EngineError::NotFound(post.to_string()));
            };
            let discussion = DiscussionRepo::get(conn, post_row.discussion_id)?
                .ok_or_else(|| EngineError::NotFound(post_row.discussion_id.to_string()))?;
            Ok((post_row, discussion))
        })?;
        if discussion.container_id != container.id {
            return Err(EngineError::NotFound(format!("{post} in {}", container.id)));
        }
        Ok(Target {
            post: post_row,
            discussion,
        })
    }

    fn discussion_lock(&self, discussion: DiscussionId) -> Arc<Mutex<()>> {
        self.locks.entry(discussion).or_default().clone()
    }

    /// Drop the lock entry once no other caller holds it.
    fn release_discussion_lock(&self, discussion: DiscussionId) {
        let _ = self.locks.remove_if(&discussion, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn within_edit_window(&self, vote: &Vote) -> bool {
        self.ctx.now() - vote.first_voted_at < self.ctx.settings.rating.max_editing_time_secs
    }

    fn remove_vote(&self, target: &Target, user: UserId, kind: VoteKind) -> Result<VoteOutcome> {
        if !self.ctx.settings.rating.allow_rating_change {
            return Err(EngineError::InvalidState("rating change is disabled".into()));
        }
        self.ctx.store.with_transaction(|conn| {
            let vote = VoteRepo::get_by_kind(conn, user, target.post.id, kind)?
                .ok_or_else(|| EngineError::NotFound(format!("{kind} vote by {user} on {}", target.post.id)))?;
            if kind.is_normal() && !self.within_edit_window(&vote) {
                return Err(EngineError::InvalidState("vote is past its edit window".into()));
            }
            let _ = VoteRepo::delete(conn, vote.id)?;
            Ok(VoteOutcome::Removed(vote.id))
        })
    }

    fn place_mark(
        &self,
        target: &Target,
        container: ContainerId,
        user: UserId,
        kind: VoteKind,
        caps: Capabilities,
    ) -> Result<VoteOutcome> {
        match kind {
            VoteKind::Helpful if user != target.discussion.starter_user_id => {
                return Err(EngineError::PermissionDenied(
                    "only the discussion starter may mark a post helpful".into(),
                ));
            }
            VoteKind::Solved if !caps.can_mark_solved => {
                return Err(EngineError::PermissionDenied(format!("{user} may not mark posts solved")));
            }
            _ => {}
        }
        let now = self.ctx.now();
        self.ctx.store.with_transaction(|conn| {
            if let Some(mark) = VoteRepo::find_mark(conn, target.discussion.id, kind)? {
                let _ = VoteRepo::update(conn, mark.id, target.post.id, user, kind, now)?;
                debug!(vote = mark.id.get(), from = mark.post_id.get(), "mark moved");
                return Ok::<_, EngineError>(VoteOutcome::Updated(mark.id));
            }
            let vote = VoteRepo::insert(conn, &self.new_vote(target, container, user, kind))?;
            Ok(VoteOutcome::Created(vote.id))
        })
    }

    fn cast_vote(&self, target: &Target, container: ContainerId, user: UserId, kind: VoteKind) -> Result<VoteOutcome> {
        let now = self.ctx.now();
        self.ctx.store.with_transaction(|conn| {
            if let Some(existing) = VoteRepo::get_normal(conn, user, target.post.id)? {
                if !self.ctx.settings.rating.allow_rating_change {
                    return Err(EngineError::InvalidState("rating change is disabled".into()));
                }
                if !self.within_edit_window(&existing) {
                    return Err(EngineError::InvalidState("vote is past its edit window".into()));
                }
                let _ = VoteRepo::update(conn, existing.id, target.post.id, user, kind, now)?;
                return Ok(VoteOutcome::Updated(existing.id));
            }
            let vote = VoteRepo::insert(conn, &self.new_vote(target, container, user, kind))?;
            Ok(VoteOutcome::Created(vote.id))
        })
    }

    fn new_vote(&self, target: &Target, container: ContainerId, user: UserId, kind: VoteKind) -> NewVote {
        NewVote {
            user_id: user,
            post_id: target.post.id,
            discussion_id: target.discussion.id,
            container_id: container,
            kind,
            at: self.ctx.now(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tallies
    // ─────────────────────────────────────────────────────────────────────

    /// One tally per post of the discussion, in post id order.
    pub fn get_votes_by_discussion(&self, discussion: DiscussionId) -> Result<Vec<PostVotes>> {
        Ok(self
            .ctx
            .store
            .with_conn(|conn| VoteRepo::tally_by_discussion(conn, discussion))?)
    }

    /// Tally of one post, which must belong to the discussion.
    pub fn get_discussion_post_votes(&self, discussion: DiscussionId, post: PostId) -> Result<PostVotes> {
        self.get_votes_by_discussion(discussion)?
            .into_iter()
            .find(|tally| tally.post_id == post)
            .ok_or_else(|| EngineError::NotFound(format!("{post} in {discussion}")))
    }

    pub fn get_post_votes(&self, post: PostId) -> Result<PostVotes> {
        self.ctx
            .store
            .with_conn(|conn| VoteRepo::tally_for_post(conn, post))?
            .ok_or_else(|| EngineError::NotFound(post.to_string()))
    }

    /// The user's live up or down vote on the post.
    pub fn user_vote(&self, post: PostId, user: UserId) -> Result<Option<Vote>> {
        Ok(self.ctx.store.with_conn(|conn| VoteRepo::get_normal(conn, user, post))?)
    }

    pub fn discussion_marks(&self, discussion: DiscussionId) -> Result<AnswerMarks> {
        let marks = self
            .ctx
            .store
            .with_conn(|conn| VoteRepo::list_marks(conn, discussion))?;
        let mut out = AnswerMarks::default();
        for mark in marks {
            match mark.kind {
                VoteKind::Solved => out.solved = Some(mark.post_id),
                VoteKind::Helpful => out.helpful = Some(mark.post_id),
                VoteKind::Upvote | VoteKind::Downvote => {}
            }
        }
        Ok(out)
    }

    /// Posts of the discussion in arrival order, each with its tally.
    pub fn ranked_posts(&self, discussion: DiscussionId) -> Result<Vec<RankedPost>> {
        let (posts, tallies) = self.ctx.store.with_conn(|conn| {
            let posts = PostRepo::list_by_discussion(conn, discussion)?;
            let tallies = VoteRepo::tally_by_discussion(conn, discussion)?;
            Ok::<_, EngineError>((posts, tallies))
        })?;
        let mut tallies: HashMap<PostId, PostVotes> = tallies.into_iter().map(|t| (t.post_id, t)).collect();
        Ok(posts
            .into_iter()
            .map(|post| {
                let votes = tallies.remove(&post.id).unwrap_or_else(|| PostVotes::empty(post.id));
                RankedPost::new(post, votes)
            })
            .collect())
    }

    /// Posts of the discussion in display order.
    pub fn sort_discussion_answers(&self, discussion: DiscussionId) -> Result<Vec<RankedPost>> {
        let preference = self.ctx.store.with_conn(|conn| {
            let found = DiscussionRepo::get(conn, discussion)?
                .ok_or_else(|| EngineError::NotFound(discussion.to_string()))?;
            let container = ContainerRepo::get(conn, found.container_id)?
                .ok_or_else(|| EngineError::NotFound(found.container_id.to_string()))?;
            Ok::<_, EngineError>(container.rating_preference)
        })?;
        let posts = self.ranked_posts(discussion)?;
        let marks = self.discussion_marks(discussion)?;
        Ok(sort_answers_by_rating(posts, marks, preference))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reputation
    // ─────────────────────────────────────────────────────────────────────

    /// Reputation of `user` as seen from `container`.
    ///
    /// Course-scoped containers sum over every container of the course. The
    /// result is clamped at zero when the container disallows negative
    /// reputation.
    #[instrument(skip_all, fields(container = container.id.get(), user = user.get()))]
    pub fn get_reputation(&self, container: &Container, user: UserId) -> Result<i64> {
        let containers = match container.reputation_scope {
            ReputationScope::Instance => vec![container.id],
            ReputationScope::Course => self
                .ctx
                .store
                .with_conn(|conn| ContainerRepo::list_by_course(conn, container.course_id))?
                .into_iter()
                .map(|c| c.id)
                .collect(),
        };
        let mut total = 0;
        for id in containers {
            total += self.instance_reputation(id, user)?;
        }
        if !container.allow_negative_reputation {
            total = total.max(0);
        }
        debug!(reputation = total, "reputation computed");
        Ok(total)
    }

    fn instance_reputation(&self, container: ContainerId, user: UserId) -> Result<i64> {
        let (received, cast) = self.ctx.store.with_conn(|conn| {
            let received = VoteRepo::received_by_author(conn, container, user)?;
            let cast = VoteRepo::count_cast_normal(conn, container, user)?;
            Ok::<_, EngineError>((received, cast))
        })?;
        Ok(self.weigh(received, cast))
    }

    fn weigh(&self, received: ReceivedVotes, cast: i64) -> i64 {
        let w = &self.ctx.settings.reputation;
        received.downvotes * w.downvote
            + received.upvotes * w.upvote
            + received.helpful * w.helpful
            + received.solved * w.solved
            + cast * w.vote
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
