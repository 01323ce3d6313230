//! Cross-engine scenarios against an in-memory store.

use std::sync::Arc;

use assert_matches::assert_matches;
use engage_core::clock::SECS_PER_DAY;
use engage_core::{
    Container, CourseId, Discussion, FixedClock, Post, PostId, SubscriptionMode, UserId, VoteAction,
    VoteKind,
};
use engage_engine::{Capabilities, EngineContext, EngineError, Engagement, SubscribeOutcome};
use engage_store::{ContainerRepo, DiscussionRepo, NewContainer, NewDiscussion, NewPost, PostRepo, Store};
use proptest::prelude::*;

const NOW: i64 = 1_700_000_000;
const COURSE: CourseId = CourseId::new(10);
const U1: UserId = UserId::new(1);
const U2: UserId = UserId::new(2);
const U3: UserId = UserId::new(3);
const TEACHER: UserId = UserId::new(50);

struct World {
    engine: Engagement,
    clock: Arc<FixedClock>,
    store: Store,
}

impl World {
    fn new() -> Self {
        let store = Store::in_memory().unwrap();
        let clock = Arc::new(FixedClock::new(NOW));
        let engine = Engagement::new(EngineContext::new(store.clone()).with_clock(clock.clone()));
        Self { engine, clock, store }
    }

    fn container(&self, new: NewContainer) -> Container {
        self.store.with_conn(|conn| ContainerRepo::insert(conn, &new)).unwrap()
    }

    fn container_with_mode(&self, mode: SubscriptionMode) -> Container {
        self.container(NewContainer {
            subscription_mode: mode,
            ..NewContainer::in_course(COURSE)
        })
    }

    fn discussion(&self, container: &Container, starter: UserId) -> Discussion {
        self.store
            .with_conn(|conn| {
                DiscussionRepo::insert(
                    conn,
                    &NewDiscussion {
                        container_id: container.id,
                        name: "question".into(),
                        starter_user_id: starter,
                        time_modified: NOW,
                    },
                )
            })
            .unwrap()
    }

    fn post(&self, discussion: &Discussion, parent: PostId, author: UserId, created: i64) -> Post {
        self.store
            .with_conn(|conn| {
                PostRepo::insert(
                    conn,
                    &NewPost {
                        discussion_id: discussion.id,
                        parent_id: parent,
                        user_id: author,
                        created,
                        message: "body".into(),
                    },
                )
            })
            .unwrap()
    }
}

#[test]
fn initial_container_subscribes_enrolled_users() {
    let world = World::new();
    let container = world.container_with_mode(SubscriptionMode::Initial);
    let enrolled = [U1, U2, U3];
    assert_eq!(world.engine.apply_initial_subscriptions(&container, &enrolled).unwrap(), 3);

    let subs = &world.engine.subscriptions;
    for user in enrolled {
        assert!(subs.is_subscribed(user, &container, None).unwrap());
    }
    assert!(subs.unsubscribe_user(U2, &container, true).unwrap());
    assert_eq!(subs.get_subscribed_users(&container, &enrolled, false).unwrap(), vec![U1, U3]);
}

#[test]
fn votes_tally_and_feed_reputation() {
    let world = World::new();
    let container = world.container_with_mode(SubscriptionMode::Choose);
    let discussion = world.discussion(&container, U3);
    let root = world.post(&discussion, PostId::default(), U3, NOW);
    let answer = world.post(&discussion, root.id, U1, NOW);

    let ratings = &world.engine.ratings;
    let student = Capabilities::student();
    let _ = ratings
        .add_vote(&container, answer.id, VoteAction::Apply(VoteKind::Upvote), U2, student)
        .unwrap();
    let _ = ratings
        .add_vote(&container, answer.id, VoteAction::Apply(VoteKind::Downvote), U3, student)
        .unwrap();
    let _ = ratings
        .add_vote(
            &container,
            answer.id,
            VoteAction::Apply(VoteKind::Solved),
            TEACHER,
            Capabilities::teacher(),
        )
        .unwrap();

    let tally = ratings.get_discussion_post_votes(discussion.id, answer.id).unwrap();
    assert_eq!(
        (tally.upvotes, tally.downvotes, tally.solved_count, tally.helpful_count),
        (1, 1, 1, 0)
    );
    let weights = &world.engine.context().settings.reputation;
    assert_eq!(
        ratings.get_reputation(&container, U1).unwrap(),
        weights.upvote + weights.downvote + weights.solved
    );
}

#[test]
fn stale_posts_are_never_read_or_unread() {
    let world = World::new();
    let container = world.container_with_mode(SubscriptionMode::Choose);
    let discussion = world.discussion(&container, U2);
    let stale = world.post(&discussion, PostId::default(), U2, NOW - 20 * SECS_PER_DAY);

    let reads = &world.engine.reads;
    assert!(reads.is_old_post(&stale));
    assert!(reads.mark_post_read(U1, &stale).unwrap());
    assert_eq!(reads.count_unread_in_container(U1, &container).unwrap(), 0);
    assert_eq!(reads.mark_discussion_read(U1, discussion.id).unwrap(), 0);
}

#[test]
fn posts_age_out_of_unread_counts() {
    let world = World::new();
    let container = world.container_with_mode(SubscriptionMode::Choose);
    let discussion = world.discussion(&container, U2);
    let _ = world.post(&discussion, PostId::default(), U2, NOW);

    let reads = &world.engine.reads;
    assert_eq!(reads.count_unread_in_container(U1, &container).unwrap(), 1);
    let _ = world.clock.advance(15 * SECS_PER_DAY);
    reads.reset_unread_cache();
    assert_eq!(reads.count_unread_in_container(U1, &container).unwrap(), 0);
}

#[test]
fn forced_containers_ignore_overrides() {
    let world = World::new();
    let container = world.container_with_mode(SubscriptionMode::Forced);
    let discussion = world.discussion(&container, U2);
    let subs = &world.engine.subscriptions;

    assert!(!subs.unsubscribe_user_from_discussion(U1, &discussion, &container).unwrap());
    assert!(subs.unsubscribe_user(U1, &container, true).unwrap());
    assert!(subs.subscribe_user_to_discussion(U2, &discussion, &container).unwrap());
    world.engine.reset_caches();
    assert!(subs.is_subscribed(U1, &container, None).unwrap());
    assert!(subs.is_subscribed(U1, &container, Some(discussion.id)).unwrap());

    subs.set_subscription_mode(container.id, SubscriptionMode::Choose).unwrap();
    world.engine.reset_caches();
    let container = world.engine.container(container.id).unwrap();
    assert!(!subs.is_subscribed(U1, &container, Some(discussion.id)).unwrap());
    assert!(subs.is_subscribed(U2, &container, Some(discussion.id)).unwrap());
}

#[test]
fn user_requested_subscribe_covers_every_discussion() {
    let world = World::new();
    let container = world.container_with_mode(SubscriptionMode::Choose);
    let discussions: Vec<_> = (0..3).map(|_| world.discussion(&container, U2)).collect();
    let subs = &world.engine.subscriptions;

    assert!(subs.subscribe_user_to_discussion(U1, &discussions[0], &container).unwrap());
    assert_matches!(subs.subscribe_user(U1, &container, true), Ok(SubscribeOutcome::Subscribed(_)));
    world.engine.reset_caches();
    for discussion in &discussions {
        assert!(subs.is_subscribed(U1, &container, Some(discussion.id)).unwrap());
    }
}

#[test]
fn repeated_calls_are_idempotent() {
    let world = World::new();
    let container = world.container_with_mode(SubscriptionMode::Choose);
    let discussion = world.discussion(&container, U2);
    let subs = &world.engine.subscriptions;

    let _ = subs.subscribe_user(U1, &container, true).unwrap();
    assert!(subs.unsubscribe_user(U1, &container, true).unwrap());
    assert!(subs.unsubscribe_user(U1, &container, true).unwrap());
    assert!(!subs.is_subscribed(U1, &container, None).unwrap());

    assert!(subs.subscribe_user_to_discussion(U2, &discussion, &container).unwrap());
    assert!(!subs.subscribe_user_to_discussion(U2, &discussion, &container).unwrap());
}

#[test]
fn errors_surface_as_values() {
    let world = World::new();
    let container = world.container_with_mode(SubscriptionMode::Choose);
    assert_matches!(world.engine.post(PostId::new(9)), Err(EngineError::NotFound(_)));
    assert_matches!(
        world.engine.ratings.add_vote(
            &container,
            PostId::new(9),
            VoteAction::Apply(VoteKind::Upvote),
            U1,
            Capabilities::student(),
        ),
        Err(EngineError::NotFound(_))
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn reputation_never_negative_when_disallowed(
        votes in prop::collection::vec((0..4usize, any::<bool>()), 0..12),
        course_scope in any::<bool>(),
    ) {
        let world = World::new();
        let container = world.container(NewContainer {
            allow_negative_reputation: false,
            reputation_scope: if course_scope {
                engage_core::ReputationScope::Course
            } else {
                engage_core::ReputationScope::Instance
            },
            ..NewContainer::in_course(COURSE)
        });
        let discussion = world.discussion(&container, TEACHER);
        let root = world.post(&discussion, PostId::default(), TEACHER, NOW);
        let answer = world.post(&discussion, root.id, U1, NOW);

        let voters = [U2, U3, UserId::new(4), UserId::new(5)];
        for (voter, up) in votes {
            let kind = if up { VoteKind::Upvote } else { VoteKind::Downvote };
            let _ = world.engine.ratings.add_vote(
                &container,
                answer.id,
                VoteAction::Apply(kind),
                voters[voter],
                Capabilities::student(),
            );
        }
        prop_assert!(world.engine.ratings.get_reputation(&container, U1).unwrap() >= 0);
    }
}
