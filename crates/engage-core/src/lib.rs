//! # engage-core
//!
//! Types shared by every crate of the engagement engine: numeric branded
//! ids, the forum records the engine reads, the vote and subscription
//! preference sum types, the events handed to the event sink, and the
//! injectable [`clock::Clock`].

#![deny(unsafe_code)]

pub mod clock;
pub mod events;
pub mod ids;
pub mod model;
pub mod votes;

pub use clock::{Clock, FixedClock, SystemClock, Timestamp};
pub use events::{EngagementEvent, EventKind};
pub use ids::{ContainerId, CourseId, DiscussionId, PostId, SubscriptionId, UserId, VoteId};
pub use model::{
    Container, Discussion, DiscussionSubscription, MailedState, Post,
    Preference, RatingPreference, ReadRecord, ReputationScope, SubscriptionMode, TrackingType,
};
pub use votes::{PostVotes, Vote, VoteAction, VoteKind};
