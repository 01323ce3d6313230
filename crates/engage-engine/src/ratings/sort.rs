//! Canonical answer ordering of a discussion.

use engage_core::{Post, PostId, PostVotes, RatingPreference};

/// A post with its vote tally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankedPost {
    pub post: Post,
    pub votes: PostVotes,
}

impl RankedPost {
    pub fn new(post: Post, votes: PostVotes) -> Self {
        Self { post, votes }
    }

    pub fn id(&self) -> PostId {
        self.post.id
    }
}

/// Posts carrying the discussion's live marks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnswerMarks {
    pub solved: Option<PostId>,
    pub helpful: Option<PostId>,
}

impl AnswerMarks {
    /// Marks in the order they take the slots after the root post.
    fn slot_order(self, preference: RatingPreference) -> Vec<PostId> {
        if self.solved.is_some() && self.solved == self.helpful {
            return self.solved.into_iter().collect();
        }
        let ordered = match preference {
            RatingPreference::Teacher => [self.solved, self.helpful],
            RatingPreference::Starter => [self.helpful, self.solved],
        };
        ordered.into_iter().flatten().collect()
    }
}

/// Order posts for display.
///
/// `posts` is expected in arrival order. The root post comes first, then the
/// marked posts (`preference` decides which mark leads when they differ),
/// then comments in arrival order, then the remaining answers by net score
/// with ties kept in arrival order.
pub fn sort_answers_by_rating(
    mut posts: Vec<RankedPost>,
    marks: AnswerMarks,
    preference: RatingPreference,
) -> Vec<RankedPost> {
    if posts.is_empty() {
        return posts;
    }
    let root_index = posts.iter().position(|p| p.post.is_root()).unwrap_or(0);
    let root = posts.remove(root_index);
    let root_id = root.id();

    let mut ordered = Vec::with_capacity(posts.len() + 1);
    ordered.push(root);

    for marked in marks.slot_order(preference) {
        if let Some(index) = posts.iter().position(|p| p.id() == marked) {
            ordered.push(posts.remove(index));
        }
    }

    let (comments, mut answers): (Vec<_>, Vec<_>) = posts
        .into_iter()
        .partition(|p| !p.post.parent_id.is_unset() && p.post.parent_id != root_id);
    ordered.extend(comments);

    answers.sort_by_key(|p| std::cmp::Reverse(p.votes.score()));
    ordered.extend(answers);
    ordered
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
