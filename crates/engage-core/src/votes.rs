//! Vote kinds and the apply/remove action union.

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::ids::{ContainerId, DiscussionId, PostId, UserId, VoteId};
use crate::model::wire_enum;

wire_enum! {
    /// What a vote says about a post.
    VoteKind {
        Downvote => "downvote",
        Upvote => "upvote",
        /// Teacher mark. At most one per discussion.
        Solved => "solved",
        /// Starter mark. At most one per discussion.
        Helpful => "helpful",
    }
}

impl VoteKind {
    pub const ALL: [VoteKind; 4] = [Self::Downvote, Self::Upvote, Self::Solved, Self::Helpful];

    /// Legacy integer code of the apply action.
    pub fn code(self) -> i64 {
        match self {
            Self::Downvote => 1,
            Self::Upvote => 2,
            Self::Solved => 3,
            Self::Helpful => 4,
        }
    }

    /// Up and down votes share one slot per (user, post).
    pub fn is_normal(self) -> bool {
        matches!(self, Self::Downvote | Self::Upvote)
    }

    /// Solved and helpful marks are discussion-scoped singletons.
    pub fn is_mark(self) -> bool {
        !self.is_normal()
    }

    fn from_apply_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }
}

/// A requested change to a user's vote state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", content = "kind", rename_all = "snake_case")]
pub enum VoteAction {
    /// Accepted and ignored.
    Neutral,
    Apply(VoteKind),
    Remove(VoteKind),
}

impl VoteAction {
    /// Decode the legacy integer form: `0` neutral, `1..=4` apply, `10..=40`
    /// (step 10) remove. Anything else is `None`.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Neutral),
            1..=4 => VoteKind::from_apply_code(code).map(Self::Apply),
            _ if code % 10 == 0 => VoteKind::from_apply_code(code / 10).map(Self::Remove),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Neutral => 0,
            Self::Apply(kind) => kind.code(),
            Self::Remove(kind) => kind.code() * 10,
        }
    }

    pub fn kind(self) -> Option<VoteKind> {
        match self {
            Self::Neutral => None,
            Self::Apply(kind) | Self::Remove(kind) => Some(kind),
        }
    }
}

/// A live vote row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: VoteId,
    pub user_id: UserId,
    pub post_id: PostId,
    pub discussion_id: DiscussionId,
    pub container_id: ContainerId,
    pub kind: VoteKind,
    pub first_voted_at: Timestamp,
    pub last_changed_at: Timestamp,
}

/// Vote tally for one post.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostVotes {
    pub post_id: PostId,
    pub downvotes: i64,
    pub upvotes: i64,
    pub solved_count: i64,
    pub helpful_count: i64,
}

impl PostVotes {
    pub fn empty(post_id: PostId) -> Self {
        Self {
            post_id,
            ..Self::default()
        }
    }

    /// Net score used by the answer ordering.
    pub fn score(&self) -> i64 {
        self.upvotes - self.downvotes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_all_legal_codes() {
        assert_eq!(VoteAction::from_code(0), Some(VoteAction::Neutral));
        assert_eq!(VoteAction::from_code(1), Some(VoteAction::Apply(VoteKind::Downvote)));
        assert_eq!(VoteAction::from_code(4), Some(VoteAction::Apply(VoteKind::Helpful)));
        assert_eq!(VoteAction::from_code(20), Some(VoteAction::Remove(VoteKind::Upvote)));
        assert_eq!(VoteAction::from_code(30), Some(VoteAction::Remove(VoteKind::Solved)));
    }

    #[test]
    fn rejects_illegal_codes() {
        for code in [-1, 5, 9, 11, 50, 100] {
            assert_eq!(VoteAction::from_code(code), None, "code {code}");
        }
    }

    #[test]
    fn code_roundtrips_for_every_legal_action() {
        let legal: Vec<i64> = (0..=40).filter(|c| VoteAction::from_code(*c).is_some()).collect();
        assert_eq!(legal, vec![0, 1, 2, 3, 4, 10, 20, 30, 40]);
        for code in legal {
            let action = VoteAction::from_code(code).unwrap();
            assert_eq!(action.code(), code);
        }
    }

    #[test]
    fn kind_classes() {
        assert!(VoteKind::Upvote.is_normal());
        assert!(VoteKind::Downvote.is_normal());
        assert!(VoteKind::Solved.is_mark());
        assert!(VoteKind::Helpful.is_mark());
    }

    #[test]
    fn score_is_net_votes() {
        let votes = PostVotes {
            upvotes: 3,
            downvotes: 5,
            ..PostVotes::empty(PostId::new(1))
        };
        assert_eq!(votes.score(), -2);
    }
}
