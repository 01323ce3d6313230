//! Stateless repositories. Every method takes a `&Connection`, so the same
//! code runs on a pooled connection or inside a transaction.

pub mod container;
pub mod discussion;
pub mod post;
pub mod read;
pub mod subscription;
pub mod tracking;
pub mod vote;
