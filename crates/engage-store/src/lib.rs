//! # engage-store
//!
//! The record store behind the engagement engine: `SQLite` through a pooled
//! `rusqlite` connection, an embedded migration runner and one stateless
//! repository per relation.
//!
//! The store enforces no references between rows. Readers treat a dangling
//! id as "no data".

#![deny(unsafe_code)]

pub mod errors;
pub mod row_helpers;
pub mod sqlite;
pub mod store;

pub use errors::{Result, StoreError};
pub use sqlite::connection::ConnectionConfig;
pub use sqlite::repositories::container::{ContainerRepo, NewContainer};
pub use sqlite::repositories::discussion::{DiscussionRepo, NewDiscussion};
pub use sqlite::repositories::post::{NewPost, PostRepo};
pub use sqlite::repositories::read::{ReadFilter, ReadRepo};
pub use sqlite::repositories::subscription::{ContainerSubscriptionRepo, DiscussionSubscriptionRepo};
pub use sqlite::repositories::tracking::{TrackingRepo, is_tracked_type};
pub use sqlite::repositories::vote::{NewVote, ReceivedVotes, VoteRepo};
pub use store::Store;
