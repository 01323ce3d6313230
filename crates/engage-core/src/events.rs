//! Immutable records handed to the event sink.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Timestamp;
use crate::ids::{ContainerId, UserId};
use crate::model::wire_enum;

wire_enum! {
    /// Every state change the engines report.
    EventKind {
        SubscriptionCreated => "subscription.created",
        SubscriptionDeleted => "subscription.deleted",
        DiscussionSubscriptionCreated => "discussion_subscription.created",
        DiscussionSubscriptionDeleted => "discussion_subscription.deleted",
        RatingCreated => "rating.created",
        RatingUpdated => "rating.updated",
        RatingDeleted => "rating.deleted",
        ReadtrackingEnabled => "readtracking.enabled",
        ReadtrackingDisabled => "readtracking.disabled",
    }
}

impl EventKind {
    /// Domain prefix (`"subscription"`, `"rating"`, ...).
    pub fn domain(self) -> &'static str {
        let s = self.as_str();
        s.find('.').map_or(s, |i| &s[..i])
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementEvent {
    /// `evt_` + UUID v7.
    pub id: String,
    pub kind: EventKind,
    /// Row id of the subscription, vote or container the event is about.
    pub object_id: i64,
    pub context_id: ContainerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_user_id: Option<UserId>,
    pub other: Value,
    pub timestamp: Timestamp,
}

impl EngagementEvent {
    pub fn new(kind: EventKind, object_id: i64, context_id: ContainerId, timestamp: Timestamp) -> Self {
        Self {
            id: format!("evt_{}", uuid::Uuid::now_v7()),
            kind,
            object_id,
            context_id,
            related_user_id: None,
            other: Value::Null,
            timestamp,
        }
    }

    #[must_use]
    pub fn with_related_user(mut self, user: UserId) -> Self {
        self.related_user_id = Some(user);
        self
    }

    #[must_use]
    pub fn with_other(mut self, other: Value) -> Self {
        self.other = other;
        self
    }
}
