//! Read-Tracking Engine.
//!
//! Posts modified before the rolling cutoff (`now - old_post_days`) are
//! old: they never get read records and never count as unread.

use std::collections::HashMap;

use dashmap::DashMap;
use engage_core::clock::SECS_PER_DAY;
use engage_core::{
    Container, ContainerId, CourseId, DiscussionId, EngagementEvent, EventKind, Post, Timestamp,
    TrackingType, UserId,
};
use engage_store::{ContainerRepo, PostRepo, ReadFilter, ReadRepo, TrackingRepo, is_tracked_type};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::context::EngineContext;
use crate::error::{EngineError, Result};
use crate::identity::Actor;

#[derive(Debug)]
pub struct ReadTracker {
    ctx: EngineContext,
    /// Unread counts of tracked containers, per (user, course).
    unread: DashMap<(UserId, CourseId), HashMap<ContainerId, i64>>,
}

impl ReadTracker {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            unread: DashMap::new(),
        }
    }

    /// Posts modified before this instant are old.
    pub fn cutoff(&self) -> Timestamp {
        self.ctx.now() - self.ctx.settings.read_tracking.old_post_days * SECS_PER_DAY
    }

    pub fn is_old_post(&self, post: &Post) -> bool {
        self.cutoff() > post.modified
    }

    /// Whether tracking is possible for the actor at all, or in `container`.
    pub fn can_track(&self, actor: &Actor, container: Option<&Container>) -> bool {
        if !self.ctx.settings.read_tracking.enabled || !actor.is_real_user() {
            return false;
        }
        container.is_none_or(|c| matches!(c.tracking_type, TrackingType::Optional | TrackingType::Forced))
    }

    /// Whether the actor's reads are tracked in `container`.
    pub fn is_tracked(&self, actor: &Actor, container: &Container) -> Result<bool> {
        if !self.can_track(actor, Some(container)) {
            return Ok(false);
        }
        let has_override = self.has_override(actor.user_id, container)?;
        Ok(is_tracked_type(
            container.tracking_type,
            has_override,
            self.ctx.settings.read_tracking.allow_forced,
        ))
    }

    fn has_override(&self, user: UserId, container: &Container) -> Result<bool> {
        // Only optional tracking consults the override.
        if container.tracking_type != TrackingType::Optional {
            return Ok(false);
        }
        Ok(self
            .ctx
            .store
            .with_conn(|conn| TrackingRepo::exists(conn, user, container.id))?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Marking
    // ─────────────────────────────────────────────────────────────────────

    /// Record that `user` read `post`.
    ///
    /// Old posts succeed without writing. Returns `false` when the post went
    /// stale between the check and the insert.
    #[instrument(skip_all, fields(user = user.get(), post = post.id.get()))]
    pub fn mark_post_read(&self, user: UserId, post: &Post) -> Result<bool> {
        if self.is_old_post(post) {
            return Ok(true);
        }
        let now = self.ctx.now();
        let cutoff = self.cutoff();
        let written = self.ctx.store.with_transaction(|conn| {
            if ReadRepo::insert_guarded(conn, user, post.id, now, cutoff)? {
                return Ok(true);
            }
            // An existing record, possibly written by a concurrent reader.
            ReadRepo::touch(conn, user, post.id, now)
        })?;
        if !written {
            warn!(cutoff, modified = post.modified, "post went stale before it was marked read");
        }
        self.invalidate_user(user);
        Ok(written)
    }

    /// Mark every fresh unread post of the discussion read. Returns how
    /// many were written. The first error aborts; earlier marks stay.
    #[instrument(skip_all, fields(user = user.get(), discussion = discussion.get()))]
    pub fn mark_discussion_read(&self, user: UserId, discussion: DiscussionId) -> Result<usize> {
        let cutoff = self.cutoff();
        let posts = self
            .ctx
            .store
            .with_conn(|conn| PostRepo::unread_in_discussion(conn, user, discussion, cutoff))?;
        let mut marked = 0;
        for post in &posts {
            if self.mark_post_read(user, post)? {
                marked += 1;
            }
        }
        debug!(marked, "discussion marked read");
        Ok(marked)
    }

    /// Mark every fresh unread post of the container read.
    #[instrument(skip_all, fields(user = user.get(), container = container.get()))]
    pub fn mark_container_read(&self, user: UserId, container: ContainerId) -> Result<usize> {
        let cutoff = self.cutoff();
        let discussions = self
            .ctx
            .store
            .with_conn(|conn| ReadRepo::discussions_with_unread(conn, user, container, cutoff))?;
        let mut marked = 0;
        for discussion in discussions {
            marked += self.mark_discussion_read(user, discussion)?;
        }
        Ok(marked)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Counting
    // ─────────────────────────────────────────────────────────────────────

    /// Fresh posts of the container that `user` has not read.
    ///
    /// Served from the course-wide counts when the container is tracked for
    /// the user, counted directly otherwise.
    pub fn count_unread_in_container(&self, user: UserId, container: &Container) -> Result<i64> {
        let counts = self.count_unread_by_container_for_course(user, container.course_id)?;
        if let Some(count) = counts.get(&container.id) {
            return Ok(*count);
        }
        let has_override = self.has_override(user, container)?;
        if is_tracked_type(
            container.tracking_type,
            has_override,
            self.ctx.settings.read_tracking.allow_forced,
        ) {
            return Ok(0);
        }
        let cutoff = self.cutoff();
        Ok(self
            .ctx
            .store
            .with_conn(|conn| ReadRepo::count_unread_in_container(conn, user, container.id, cutoff))?)
    }

    /// Unread counts of every tracked container of the course. Containers
    /// without unread posts are absent.
    pub fn count_unread_by_container_for_course(
        &self,
        user: UserId,
        course: CourseId,
    ) -> Result<HashMap<ContainerId, i64>> {
        if let Some(counts) = self.unread.get(&(user, course)) {
            return Ok(counts.clone());
        }
        let cutoff = self.cutoff();
        let allow_forced = self.ctx.settings.read_tracking.allow_forced;
        let counts: HashMap<ContainerId, i64> = self
            .ctx
            .store
            .with_conn(|conn| {
                ReadRepo::count_unread_by_container_for_course(conn, user, course, cutoff, allow_forced)
            })?
            .into_iter()
            .collect();
        debug!(user = user.get(), course = course.get(), containers = counts.len(), "unread counts loaded");
        let _ = self.unread.insert((user, course), counts.clone());
        Ok(counts)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tracking preference
    // ─────────────────────────────────────────────────────────────────────

    /// Stop tracking the container for `user`, discarding their read
    /// history in it. Returns whether the override was new.
    #[instrument(skip_all, fields(user = user.get(), container = container.id.get()))]
    pub fn stop_tracking(&self, user: UserId, container: &Container) -> Result<bool> {
        let (inserted, discarded) = self.ctx.store.with_transaction(|conn| {
            let inserted = TrackingRepo::insert(conn, user, container.id)?;
            let discarded = ReadRepo::delete(
                conn,
                &ReadFilter {
                    user: Some(user),
                    container: Some(container.id),
                    ..ReadFilter::default()
                },
            )?;
            Ok::<_, EngineError>((inserted, discarded))
        })?;
        self.invalidate_user(user);
        info!(discarded, "read tracking stopped");
        if inserted {
            self.emit_tracking(EventKind::ReadtrackingDisabled, user, container.id)?;
        }
        Ok(inserted)
    }

    /// Resume tracking. Read history is not restored. Returns whether an
    /// override was removed.
    #[instrument(skip_all, fields(user = user.get(), container = container.id.get()))]
    pub fn start_tracking(&self, user: UserId, container: &Container) -> Result<bool> {
        let removed = self
            .ctx
            .store
            .with_conn(|conn| TrackingRepo::delete(conn, user, container.id))?;
        self.invalidate_user(user);
        if removed {
            info!("read tracking resumed");
            self.emit_tracking(EventKind::ReadtrackingEnabled, user, container.id)?;
        }
        Ok(removed)
    }

    fn emit_tracking(&self, kind: EventKind, user: UserId, container: ContainerId) -> Result<()> {
        self.ctx.emit(
            &EngagementEvent::new(kind, container.get(), container, self.ctx.now())
                .with_related_user(user)
                .with_other(json!({ "containerId": container })),
        )
    }

    /// Containers of the course whose reads are not tracked for the actor.
    pub fn untracked_containers(&self, actor: &Actor, course: CourseId) -> Result<Vec<ContainerId>> {
        if !self.can_track(actor, None) {
            let all = self
                .ctx
                .store
                .with_conn(|conn| ContainerRepo::list_by_course(conn, course))?;
            return Ok(all.into_iter().map(|c| c.id).collect());
        }
        let allow_forced = self.ctx.settings.read_tracking.allow_forced;
        Ok(self
            .ctx
            .store
            .with_conn(|conn| TrackingRepo::untracked_containers(conn, actor.user_id, course, allow_forced))?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────

    pub fn delete_read_records(&self, filter: &ReadFilter) -> Result<usize> {
        if filter.is_empty() {
            return Err(EngineError::InvalidState(
                "refusing to delete read records without a filter".into(),
            ));
        }
        let deleted = self.ctx.store.with_conn(|conn| ReadRepo::delete(conn, filter))?;
        match filter.user {
            Some(user) => self.invalidate_user(user),
            None => self.reset_unread_cache(),
        }
        Ok(deleted)
    }

    /// Delete read records of posts that are now old.
    #[instrument(skip(self))]
    pub fn prune_stale_read_records(&self) -> Result<usize> {
        if self.ctx.settings.read_tracking.old_post_days == 0 {
            return Ok(0);
        }
        let cutoff = self.cutoff();
        let pruned = self.ctx.store.with_conn(|conn| {
            let Some(first) = ReadRepo::oldest_referenced_modified(conn)? else {
                return Ok::<_, EngineError>(0);
            };
            Ok(ReadRepo::prune(conn, first, cutoff)?)
        })?;
        if pruned > 0 {
            self.reset_unread_cache();
        }
        info!(pruned, cutoff, "stale read records pruned");
        Ok(pruned)
    }

    pub fn reset_unread_cache(&self) {
        self.unread.clear();
    }

    fn invalidate_user(&self, user: UserId) {
        self.unread.retain(|(cached, _), _| *cached != user);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use engage_core::{CourseId, Discussion, PostId, SubscriptionMode};
    use engage_settings::EngageSettings;
    use engage_store::NewContainer;

    use super::*;
    use crate::sink::MemorySink;
    use crate::testing::{Fixture, NOW};

    const READER: UserId = UserId::new(1);
    const AUTHOR: UserId = UserId::new(2);
    const DAY: i64 = SECS_PER_DAY;

    struct Setup {
        fx: Fixture,
        tracker: ReadTracker,
        sink: Arc<MemorySink>,
        discussion: Discussion,
    }

    fn setup_with(settings: EngageSettings, tracking: TrackingType) -> Setup {
        let fx = Fixture::with_container(NewContainer {
            tracking_type: tracking,
            ..NewContainer::in_course(CourseId::new(1))
        });
        let sink = Arc::new(MemorySink::new());
        let tracker = ReadTracker::new(fx.ctx.clone().with_settings(settings).with_sink(sink.clone()));
        let discussion = fx.discussion(AUTHOR);
        Setup {
            fx,
            tracker,
            sink,
            discussion,
        }
    }

    fn setup() -> Setup {
        setup_with(EngageSettings::default(), TrackingType::Optional)
    }

    fn fresh_post(s: &Setup) -> Post {
        s.fx.post(&s.discussion, PostId::default(), AUTHOR)
    }

    fn record_count(s: &Setup) -> i64 {
        s.fx
            .ctx
            .store
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM read_records", [], |row| row.get::<_, i64>(0))
                    .map_err(engage_store::StoreError::from)
            })
            .unwrap()
    }

    #[test]
    fn cutoff_follows_the_clock() {
        let s = setup();
        assert_eq!(s.tracker.cutoff(), NOW - 14 * DAY);
        let _ = s.fx.clock.advance(DAY);
        assert_eq!(s.tracker.cutoff(), NOW - 13 * DAY);
    }

    #[test]
    fn can_track_rules() {
        let s = setup();
        let user = Actor::user(READER);
        assert!(s.tracker.can_track(&user, None));
        assert!(s.tracker.can_track(&user, Some(&s.fx.container)));
        assert!(!s.tracker.can_track(&Actor::guest(), None));
        assert!(!s.tracker.can_track(&Actor::anonymous(), Some(&s.fx.container)));

        let off = s.fx.add_container(NewContainer {
            tracking_type: TrackingType::Off,
            ..NewContainer::in_course(CourseId::new(1))
        });
        assert!(!s.tracker.can_track(&user, Some(&off)));

        let mut disabled = EngageSettings::default();
        disabled.read_tracking.enabled = false;
        let s = setup_with(disabled, TrackingType::Optional);
        assert!(!s.tracker.can_track(&user, None));
    }

    #[test]
    fn forced_tracking_needs_site_permission() {
        let user = Actor::user(READER);
        let s = setup_with(EngageSettings::default(), TrackingType::Forced);
        assert!(!s.tracker.is_tracked(&user, &s.fx.container).unwrap());

        let mut allowed = EngageSettings::default();
        allowed.read_tracking.allow_forced = true;
        let s = setup_with(allowed, TrackingType::Forced);
        assert!(s.tracker.is_tracked(&user, &s.fx.container).unwrap());
        let _ = s.tracker.stop_tracking(READER, &s.fx.container).unwrap();
        assert!(s.tracker.is_tracked(&user, &s.fx.container).unwrap());
    }

    #[test]
    fn optional_tracking_follows_override() {
        let s = setup();
        let user = Actor::user(READER);
        assert!(s.tracker.is_tracked(&user, &s.fx.container).unwrap());
        assert!(s.tracker.stop_tracking(READER, &s.fx.container).unwrap());
        assert!(!s.tracker.stop_tracking(READER, &s.fx.container).unwrap());
        assert!(!s.tracker.is_tracked(&user, &s.fx.container).unwrap());
        assert!(s.tracker.start_tracking(READER, &s.fx.container).unwrap());
        assert!(!s.tracker.start_tracking(READER, &s.fx.container).unwrap());
        assert_eq!(
            s.sink.kinds(),
            vec![EventKind::ReadtrackingDisabled, EventKind::ReadtrackingEnabled]
        );
    }

    #[test]
    fn mark_read_creates_then_touches() {
        let s = setup();
        let post = fresh_post(&s);
        assert!(s.tracker.mark_post_read(READER, &post).unwrap());
        let _ = s.fx.clock.advance(60);
        assert!(s.tracker.mark_post_read(READER, &post).unwrap());

        let record = s
            .fx
            .ctx
            .store
            .with_conn(|conn| ReadRepo::get(conn, READER, post.id))
            .unwrap()
            .unwrap();
        assert_eq!((record.first_read, record.last_read), (NOW, NOW + 60));
        assert_eq!(record.container_id, s.fx.container.id);
    }

    #[test]
    fn old_posts_are_never_recorded() {
        let s = setup();
        let old = s.fx.post_at(&s.discussion, PostId::default(), AUTHOR, NOW - 20 * DAY);
        assert!(s.tracker.is_old_post(&old));
        assert!(s.tracker.mark_post_read(READER, &old).unwrap());
        assert_eq!(record_count(&s), 0);
        assert_eq!(s.tracker.count_unread_in_container(READER, &s.fx.container).unwrap(), 0);
    }

    #[test]
    fn guarded_insert_rejects_a_post_that_went_stale() {
        let s = setup();
        let post = fresh_post(&s);
        // The caller's copy still looks fresh; the stored row is old.
        let _ = s
            .fx
            .ctx
            .store
            .with_conn(|conn| PostRepo::set_modified(conn, post.id, NOW - 30 * DAY))
            .unwrap();
        assert!(!s.tracker.mark_post_read(READER, &post).unwrap());
        assert_eq!(record_count(&s), 0);
    }

    #[test]
    fn existing_record_is_not_mistaken_for_a_stale_post() {
        let s = setup();
        let post = fresh_post(&s);
        let store = &s.fx.ctx.store;
        assert!(
            store
                .with_conn(|conn| ReadRepo::insert_guarded(conn, READER, post.id, NOW, NOW - DAY))
                .unwrap()
        );
        let _ = store
            .with_conn(|conn| PostRepo::set_modified(conn, post.id, NOW - 30 * DAY))
            .unwrap();
        let _ = s.fx.clock.advance(5);

        assert!(s.tracker.mark_post_read(READER, &post).unwrap());
        assert_eq!(record_count(&s), 1);
        let record = store
            .with_conn(|conn| ReadRepo::get(conn, READER, post.id))
            .unwrap()
            .unwrap();
        assert_eq!(record.last_read, NOW + 5);
    }

    #[test]
    fn unread_counts_drop_as_posts_are_read() {
        let s = setup();
        let first = fresh_post(&s);
        let _second = s.fx.post(&s.discussion, first.id, AUTHOR);
        let other = s.fx.discussion(AUTHOR);
        let _third = s.fx.post(&other, PostId::default(), AUTHOR);

        assert_eq!(s.tracker.count_unread_in_container(READER, &s.fx.container).unwrap(), 3);
        assert_eq!(s.tracker.mark_discussion_read(READER, s.discussion.id).unwrap(), 2);
        assert_eq!(s.tracker.count_unread_in_container(READER, &s.fx.container).unwrap(), 1);
        assert_eq!(s.tracker.mark_container_read(READER, s.fx.container.id).unwrap(), 1);
        assert_eq!(s.tracker.count_unread_in_container(READER, &s.fx.container).unwrap(), 0);
    }

    #[test]
    fn course_counts_skip_untracked_containers() {
        let s = setup();
        let _ = fresh_post(&s);
        let stopped = s.fx.container_in_course(SubscriptionMode::Choose);
        let elsewhere = s.fx.discussion_in(&stopped, AUTHOR);
        let _ = s.fx.post(&elsewhere, PostId::default(), AUTHOR);
        let _ = s.tracker.stop_tracking(READER, &stopped).unwrap();

        let counts = s
            .tracker
            .count_unread_by_container_for_course(READER, CourseId::new(1))
            .unwrap();
        assert_eq!(counts, HashMap::from([(s.fx.container.id, 1)]));
        // Untracked containers are still counted on request.
        assert_eq!(s.tracker.count_unread_in_container(READER, &stopped).unwrap(), 1);
        assert_eq!(
            s.tracker
                .untracked_containers(&Actor::user(READER), CourseId::new(1))
                .unwrap(),
            vec![stopped.id]
        );
        assert_eq!(
            s.tracker.untracked_containers(&Actor::guest(), CourseId::new(1)).unwrap(),
            vec![s.fx.container.id, stopped.id]
        );
    }

    #[test]
    fn stop_tracking_discards_history() {
        let s = setup();
        let post = fresh_post(&s);
        assert!(s.tracker.mark_post_read(READER, &post).unwrap());
        let _ = s.tracker.stop_tracking(READER, &s.fx.container).unwrap();
        assert_eq!(record_count(&s), 0);
        let _ = s.tracker.start_tracking(READER, &s.fx.container).unwrap();
        assert_eq!(s.tracker.count_unread_in_container(READER, &s.fx.container).unwrap(), 1);
    }

    #[test]
    fn delete_requires_a_filter() {
        let s = setup();
        let post = fresh_post(&s);
        assert!(s.tracker.mark_post_read(READER, &post).unwrap());
        assert_matches!(
            s.tracker.delete_read_records(&ReadFilter::default()),
            Err(EngineError::InvalidState(_))
        );
        let filter = ReadFilter {
            post: Some(post.id),
            ..ReadFilter::default()
        };
        assert_eq!(s.tracker.delete_read_records(&filter).unwrap(), 1);
    }

    #[test]
    fn prune_removes_records_of_posts_that_aged_out() {
        let s = setup();
        let aging = fresh_post(&s);
        assert!(s.tracker.mark_post_read(READER, &aging).unwrap());
        let _ = s.fx.clock.advance(10 * DAY);
        let recent = fresh_post(&s);
        let recent = Post {
            modified: NOW + 10 * DAY,
            ..recent
        };
        let _ = s
            .fx
            .ctx
            .store
            .with_conn(|conn| PostRepo::set_modified(conn, recent.id, recent.modified))
            .unwrap();
        assert!(s.tracker.mark_post_read(READER, &recent).unwrap());

        let _ = s.fx.clock.advance(5 * DAY);
        assert_eq!(s.tracker.prune_stale_read_records().unwrap(), 1);
        assert_eq!(record_count(&s), 1);
        assert_eq!(s.tracker.prune_stale_read_records().unwrap(), 0);
    }

    #[test]
    fn prune_is_disabled_without_a_window() {
        let mut settings = EngageSettings::default();
        settings.read_tracking.old_post_days = 0;
        let s = setup_with(settings, TrackingType::Optional);
        assert_eq!(s.tracker.prune_stale_read_records().unwrap(), 0);
    }
}
