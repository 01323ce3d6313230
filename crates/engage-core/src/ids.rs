use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Declares a row-id newtype. Record Store ids are positive integers handed
/// out by the store on insert; `0` is reserved for "no row" (a root post's
/// parent, a discussion without a first post yet).
macro_rules! numeric_id {
    ($name:ident, $label:expr) => {
        #[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> i64 {
                self.0
            }

            pub const fn is_unset(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $label, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($label, "#")).unwrap_or(s);
                raw.parse().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

numeric_id!(UserId, "user");
numeric_id!(CourseId, "course");
numeric_id!(ContainerId, "container");
numeric_id!(DiscussionId, "discussion");
numeric_id!(PostId, "post");
numeric_id!(VoteId, "vote");
numeric_id!(SubscriptionId, "subscription");
