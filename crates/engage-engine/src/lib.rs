//! # engage-engine
//!
//! Engagement state resolution for a discussion forum: who is notified of
//! which posts, how votes add up to per-post tallies and user reputation,
//! and which posts each user has yet to read.
//!
//! - [`subscriptions::SubscriptionResolver`]: container subscriptions and
//!   per-discussion overrides, behind two per-instance caches
//! - [`ratings::ReputationEngine`]: voting rules, tallies, reputation and the
//!   answer ordering
//! - [`readtracking::ReadTracker`]: read records and unread counts against a
//!   rolling staleness cutoff
//! - [`facade::Engagement`]: all three for one unit of work, plus mail
//!   dispatch planning
//!
//! Engines are built per request or batch job from an [`EngineContext`] and
//! dropped afterwards. Their caches are never invalidated across processes.

#![deny(unsafe_code)]

pub mod context;
pub mod error;
pub mod facade;
pub mod identity;
pub mod ratings;
pub mod readtracking;
pub mod sink;
pub mod subscriptions;

#[cfg(test)]
pub(crate) mod testing;

pub use context::EngineContext;
pub use error::{EngineError, Result};
pub use facade::{Engagement, MailBatch, MailItem};
pub use identity::{Actor, Capabilities, Directory, StaticDirectory};
pub use ratings::{AnswerMarks, RankedPost, ReputationEngine, VoteOutcome, sort_answers_by_rating};
pub use readtracking::ReadTracker;
pub use sink::{EventSink, MemorySink, SinkError, TracingSink};
pub use subscriptions::{SubscribeOutcome, SubscriptionResolver, resolve};
