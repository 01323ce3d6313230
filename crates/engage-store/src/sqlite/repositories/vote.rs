//! Vote repository: live votes, per-post tallies and reputation inputs.

use engage_core::{
    ContainerId, DiscussionId, PostId, PostVotes, Timestamp, UserId, Vote, VoteId, VoteKind,
};
use rusqlite::{Connection, params};

use crate::errors::{Result, StoreError};
use crate::row_helpers;

const COLUMNS: &str =
    "id, user_id, post_id, discussion_id, container_id, kind, first_voted_at, last_changed_at";

const TALLY_COLUMNS: &str = "p.id,
       COALESCE(SUM(v.kind = 'downvote'), 0),
       COALESCE(SUM(v.kind = 'upvote'), 0),
       COALESCE(SUM(v.kind = 'solved'), 0),
       COALESCE(SUM(v.kind = 'helpful'), 0)";

#[derive(Clone, Copy, Debug)]
pub struct NewVote {
    pub user_id: UserId,
    pub post_id: PostId,
    pub discussion_id: DiscussionId,
    pub container_id: ContainerId,
    pub kind: VoteKind,
    pub at: Timestamp,
}

/// Votes received by one author, grouped by kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReceivedVotes {
    pub downvotes: i64,
    pub upvotes: i64,
    pub solved: i64,
    pub helpful: i64,
}

pub struct VoteRepo;

impl VoteRepo {
    pub fn insert(conn: &Connection, new: &NewVote) -> Result<Vote> {
        let _ = conn.execute(
            "INSERT INTO votes (user_id, post_id, discussion_id, container_id, kind,
                                first_voted_at, last_changed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                new.user_id.get(),
                new.post_id.get(),
                new.discussion_id.get(),
                new.container_id.get(),
                new.kind.as_str(),
                new.at,
            ],
        )?;
        Ok(Vote {
            id: VoteId::new(conn.last_insert_rowid()),
            user_id: new.user_id,
            post_id: new.post_id,
            discussion_id: new.discussion_id,
            container_id: new.container_id,
            kind: new.kind,
            first_voted_at: new.at,
            last_changed_at: new.at,
        })
    }

    /// Point an existing vote at a (possibly different) post, user and kind.
    /// `first_voted_at` is kept.
    pub fn update(
        conn: &Connection,
        id: VoteId,
        post: PostId,
        user: UserId,
        kind: VoteKind,
        at: Timestamp,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE votes SET post_id = ?1, user_id = ?2, kind = ?3, last_changed_at = ?4 WHERE id = ?5",
            params![post.get(), user.get(), kind.as_str(), at, id.get()],
        )?;
        Ok(changed > 0)
    }

    pub fn delete(conn: &Connection, id: VoteId) -> Result<bool> {
        let changed = conn.execute("DELETE FROM votes WHERE id = ?1", params![id.get()])?;
        Ok(changed > 0)
    }

    /// The user's live up or down vote on a post.
    pub fn get_normal(conn: &Connection, user: UserId, post: PostId) -> Result<Option<Vote>> {
        let mut votes = Self::query(
            conn,
            &format!(
                "SELECT {COLUMNS} FROM votes
                 WHERE user_id = ?1 AND post_id = ?2 AND kind IN ('upvote', 'downvote')
                 LIMIT 1"
            ),
            params![user.get(), post.get()],
        )?;
        Ok(votes.pop())
    }

    /// The user's live vote of exactly `kind` on a post.
    pub fn get_by_kind(conn: &Connection, user: UserId, post: PostId, kind: VoteKind) -> Result<Option<Vote>> {
        let mut votes = Self::query(
            conn,
            &format!("SELECT {COLUMNS} FROM votes WHERE user_id = ?1 AND post_id = ?2 AND kind = ?3 LIMIT 1"),
            params![user.get(), post.get(), kind.as_str()],
        )?;
        Ok(votes.pop())
    }

    /// The discussion's live mark of `kind`, if any.
    pub fn find_mark(conn: &Connection, discussion: DiscussionId, kind: VoteKind) -> Result<Option<Vote>> {
        let mut votes = Self::query(
            conn,
            &format!("SELECT {COLUMNS} FROM votes WHERE discussion_id = ?1 AND kind = ?2 ORDER BY id LIMIT 1"),
            params![discussion.get(), kind.as_str()],
        )?;
        Ok(votes.pop())
    }

    /// Live solved and helpful marks of a discussion.
    pub fn list_marks(conn: &Connection, discussion: DiscussionId) -> Result<Vec<Vote>> {
        Self::query(
            conn,
            &format!(
                "SELECT {COLUMNS} FROM votes
                 WHERE discussion_id = ?1 AND kind IN ('solved', 'helpful') ORDER BY id"
            ),
            params![discussion.get()],
        )
    }

    /// One tally row per post of the discussion, posts without votes included.
    pub fn tally_by_discussion(conn: &Connection, discussion: DiscussionId) -> Result<Vec<PostVotes>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {TALLY_COLUMNS}
             FROM posts p LEFT JOIN votes v ON v.post_id = p.id
             WHERE p.discussion_id = ?1
             GROUP BY p.id ORDER BY p.id"
        ))?;
        let rows = stmt
            .query_map(params![discussion.get()], Self::map_tally)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Tally for a single post, `None` when the post does not exist.
    pub fn tally_for_post(conn: &Connection, post: PostId) -> Result<Option<PostVotes>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {TALLY_COLUMNS}
             FROM posts p LEFT JOIN votes v ON v.post_id = p.id
             WHERE p.id = ?1
             GROUP BY p.id"
        ))?;
        let mut rows = stmt.query_map(params![post.get()], Self::map_tally)?;
        Ok(rows.next().transpose()?)
    }

    /// Votes other users cast on `author`'s posts in one container.
    pub fn received_by_author(conn: &Connection, container: ContainerId, author: UserId) -> Result<ReceivedVotes> {
        let mut stmt = conn.prepare(
            "SELECT v.kind, COUNT(*)
             FROM votes v JOIN posts p ON p.id = v.post_id
             WHERE p.user_id = ?1 AND v.user_id <> ?1 AND v.container_id = ?2
             GROUP BY v.kind",
        )?;
        let mut rows = stmt.query(params![author.get(), container.get()])?;
        let mut received = ReceivedVotes::default();
        while let Some(row) = rows.next()? {
            let kind: VoteKind = row_helpers::get_enum(row, 0, "votes", "kind")?;
            let count: i64 = row_helpers::get(row, 1, "votes", "count")?;
            match kind {
                VoteKind::Downvote => received.downvotes = count,
                VoteKind::Upvote => received.upvotes = count,
                VoteKind::Solved => received.solved = count,
                VoteKind::Helpful => received.helpful = count,
            }
        }
        Ok(received)
    }

    /// Up and down votes `user` cast on other users' posts in one container.
    pub fn count_cast_normal(conn: &Connection, container: ContainerId, user: UserId) -> Result<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*)
             FROM votes v JOIN posts p ON p.id = v.post_id
             WHERE v.user_id = ?1 AND v.container_id = ?2
               AND v.kind IN ('upvote', 'downvote') AND p.user_id <> ?1",
            params![user.get(), container.get()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn query(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Vote>> {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(Self::map_row(row)?);
        }
        Ok(out)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> std::result::Result<Vote, StoreError> {
        const TABLE: &str = "votes";
        Ok(Vote {
            id: VoteId::new(row_helpers::get(row, 0, TABLE, "id")?),
            user_id: UserId::new(row_helpers::get(row, 1, TABLE, "user_id")?),
            post_id: PostId::new(row_helpers::get(row, 2, TABLE, "post_id")?),
            discussion_id: DiscussionId::new(row_helpers::get(row, 3, TABLE, "discussion_id")?),
            container_id: ContainerId::new(row_helpers::get(row, 4, TABLE, "container_id")?),
            kind: row_helpers::get_enum(row, 5, TABLE, "kind")?,
            first_voted_at: row_helpers::get(row, 6, TABLE, "first_voted_at")?,
            last_changed_at: row_helpers::get(row, 7, TABLE, "last_changed_at")?,
        })
    }

    fn map_tally(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostVotes> {
        Ok(PostVotes {
            post_id: PostId::new(row.get(0)?),
            downvotes: row.get(1)?,
            upvotes: row.get(2)?,
            solved_count: row.get(3)?,
            helpful_count: row.get(4)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
