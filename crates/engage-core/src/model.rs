//! Forum records as the engine sees them.
//!
//! The excluded CRUD layer owns these rows; the engine only reads them and
//! writes the subscription, vote, read and tracking relations.

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::ids::{ContainerId, CourseId, DiscussionId, PostId, SubscriptionId, UserId};

/// Declares a fieldless enum stored as a lowercase wire string.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[doc = $doc:literal])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[doc = $doc])* #[serde(rename = $wire)] $variant, )+
        }

        impl $name {
            /// Canonical wire string.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $wire, )+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $wire => Ok(Self::$variant), )+
                    other => Err(format!(concat!("unknown ", stringify!($name), ": {}"), other)),
                }
            }
        }
    };
}

pub(crate) use wire_enum;

wire_enum! {
    /// How users become notification targets of a container.
    SubscriptionMode {
        /// Users opt in themselves.
        Choose => "choose",
        /// Every enrolled user is subscribed and cannot opt out.
        Forced => "forced",
        /// Users are subscribed on creation and may opt out.
        Initial => "initial",
        /// Nobody may subscribe.
        Disallowed => "disallowed",
    }
}

wire_enum! {
    /// Container-level read-tracking setting.
    TrackingType {
        Off => "off",
        Optional => "optional",
        Forced => "forced",
    }
}

wire_enum! {
    /// Whether reputation is summed over one container or the whole course.
    ReputationScope {
        Instance => "instance",
        Course => "course",
    }
}

wire_enum! {
    /// Which mark wins the first answer slot when only one of them is set.
    RatingPreference {
        /// The discussion starter's "helpful" mark.
        Starter => "starter",
        /// A teacher's "solved" mark.
        Teacher => "teacher",
    }
}

wire_enum! {
    /// Mail dispatch state of a post. Transitions `Pending -> Sent | Error` once.
    MailedState {
        Pending => "pending",
        Sent => "sent",
        Error => "error",
    }
}

/// A forum instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: ContainerId,
    pub course_id: CourseId,
    pub name: String,
    pub subscription_mode: SubscriptionMode,
    pub tracking_type: TrackingType,
    pub reputation_scope: ReputationScope,
    pub allow_negative_reputation: bool,
    pub rating_preference: RatingPreference,
}

impl Container {
    pub fn is_forced(&self) -> bool {
        self.subscription_mode == SubscriptionMode::Forced
    }

    pub fn subscription_disabled(&self) -> bool {
        self.subscription_mode == SubscriptionMode::Disallowed
    }
}

/// A thread inside a container.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discussion {
    pub id: DiscussionId,
    pub container_id: ContainerId,
    pub name: String,
    pub starter_user_id: UserId,
    pub first_post_id: PostId,
    pub time_modified: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub discussion_id: DiscussionId,
    /// `PostId(0)` for the root post.
    pub parent_id: PostId,
    pub user_id: UserId,
    pub created: Timestamp,
    pub modified: Timestamp,
    pub mailed: MailedState,
    pub message: String,
}

impl Post {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_unset()
    }
}

/// A discussion-level subscription preference.
///
/// Discussion rows only exist to express a difference from the
/// container-level default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "since", rename_all = "snake_case")]
pub enum Preference {
    /// Subscribed to this discussion since the given time.
    SubscribedSince(Timestamp),
    /// Opted out of this discussion while subscribed to the container.
    ExplicitlyUnsubscribed,
}

impl Preference {
    pub fn is_subscribed(self) -> bool {
        matches!(self, Self::SubscribedSince(_))
    }

    pub fn subscribed_since(self) -> Option<Timestamp> {
        match self {
            Self::SubscribedSince(ts) => Some(ts),
            Self::ExplicitlyUnsubscribed => None,
        }
    }

    /// Column form: `NULL` means explicitly unsubscribed.
    pub fn from_column(value: Option<Timestamp>) -> Self {
        value.map_or(Self::ExplicitlyUnsubscribed, Self::SubscribedSince)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionSubscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub discussion_id: DiscussionId,
    pub container_id: ContainerId,
    pub preference: Preference,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRecord {
    pub id: i64,
    pub user_id: UserId,
    pub post_id: PostId,
    pub discussion_id: DiscussionId,
    pub container_id: ContainerId,
    pub first_read: Timestamp,
    pub last_read: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_strings_roundtrip() {
        for mode in [
            SubscriptionMode::Choose,
            SubscriptionMode::Forced,
            SubscriptionMode::Initial,
            SubscriptionMode::Disallowed,
        ] {
            assert_eq!(mode.as_str().parse::<SubscriptionMode>().unwrap(), mode);
        }
        assert_eq!("forced".parse::<TrackingType>().unwrap(), TrackingType::Forced);
        assert!("sometimes".parse::<TrackingType>().is_err());
    }

    #[test]
    fn unknown_variant_names_the_enum() {
        let err = "lost".parse::<MailedState>().unwrap_err();
        assert_eq!(err, "unknown MailedState: lost");
    }

    #[test]
    fn serde_uses_wire_strings() {
        let json = serde_json::to_string(&RatingPreference::Teacher).unwrap();
        assert_eq!(json, "\"teacher\"");
    }

    #[test]
    fn preference_column_mapping() {
        assert_eq!(Preference::from_column(None), Preference::ExplicitlyUnsubscribed);
        assert_eq!(Preference::from_column(Some(10)), Preference::SubscribedSince(10));
        assert!(Preference::SubscribedSince(10).is_subscribed());
        assert!(!Preference::ExplicitlyUnsubscribed.is_subscribed());
        assert_eq!(Preference::SubscribedSince(10).subscribed_since(), Some(10));
    }

    #[test]
    fn root_post_has_unset_parent() {
        let post = Post {
            id: PostId::new(1),
            discussion_id: DiscussionId::new(1),
            parent_id: PostId::default(),
            user_id: UserId::new(1),
            created: 0,
            modified: 0,
            mailed: MailedState::Pending,
            message: String::new(),
        };
        assert!(post.is_root());
    }
}
