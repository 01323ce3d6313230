//! Post repository, including the mail dispatch queries.

use engage_core::{DiscussionId, MailedState, Post, PostId, Timestamp, UserId};
use rusqlite::{Connection, params};

use crate::errors::{Result, StoreError};
use crate::row_helpers;

const COLUMNS: &str = "id, discussion_id, parent_id, user_id, created, modified, mailed, message";

#[derive(Clone, Debug)]
pub struct NewPost {
    pub discussion_id: DiscussionId,
    /// `PostId::default()` for a root post.
    pub parent_id: PostId,
    pub user_id: UserId,
    pub created: Timestamp,
    pub message: String,
}

pub struct PostRepo;

impl PostRepo {
    /// Insert a pending post whose `modified` equals `created`.
    pub fn insert(conn: &Connection, new: &NewPost) -> Result<Post> {
        let _ = conn.execute(
            "INSERT INTO posts (discussion_id, parent_id, user_id, created, modified, mailed, message)
             VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6)",
            params![
                new.discussion_id.get(),
                new.parent_id.get(),
                new.user_id.get(),
                new.created,
                MailedState::Pending.as_str(),
                new.message,
            ],
        )?;
        Ok(Post {
            id: PostId::new(conn.last_insert_rowid()),
            discussion_id: new.discussion_id,
            parent_id: new.parent_id,
            user_id: new.user_id,
            created: new.created,
            modified: new.created,
            mailed: MailedState::Pending,
            message: new.message.clone(),
        })
    }

    pub fn get(conn: &Connection, id: PostId) -> Result<Option<Post>> {
        let mut posts = Self::query(
            conn,
            &format!("SELECT {COLUMNS} FROM posts WHERE id = ?1"),
            params![id.get()],
        )?;
        Ok(posts.pop())
    }

    /// Posts of a discussion in arrival order.
    pub fn list_by_discussion(conn: &Connection, discussion: DiscussionId) -> Result<Vec<Post>> {
        Self::query(
            conn,
            &format!("SELECT {COLUMNS} FROM posts WHERE discussion_id = ?1 ORDER BY created, id"),
            params![discussion.get()],
        )
    }

    pub fn set_modified(conn: &Connection, id: PostId, modified: Timestamp) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE posts SET modified = ?1 WHERE id = ?2",
            params![modified, id.get()],
        )?;
        Ok(changed > 0)
    }

    /// Pending posts created in `[start, end)`, oldest modification first.
    pub fn unmailed(conn: &Connection, start: Timestamp, end: Timestamp) -> Result<Vec<Post>> {
        Self::query(
            conn,
            &format!(
                "SELECT {COLUMNS} FROM posts
                 WHERE mailed = ?1 AND created >= ?2 AND created < ?3
                 ORDER BY modified, id"
            ),
            params![MailedState::Pending.as_str(), start, end],
        )
    }

    /// Mark every pending post created before `end` as sent.
    pub fn mark_pending_as_sent(conn: &Connection, end: Timestamp) -> Result<usize> {
        let changed = conn.execute(
            "UPDATE posts SET mailed = ?1 WHERE created < ?2 AND mailed = ?3",
            params![
                MailedState::Sent.as_str(),
                end,
                MailedState::Pending.as_str()
            ],
        )?;
        Ok(changed)
    }

    /// Set the mailed state. A post already marked failed keeps that state.
    pub fn set_mailed(conn: &Connection, id: PostId, state: MailedState) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE posts SET mailed = ?1 WHERE id = ?2 AND mailed <> ?3",
            params![state.as_str(), id.get(), MailedState::Error.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Posts of the discussion modified at or after `cutoff` that `user` has
    /// not read, in arrival order.
    pub fn unread_in_discussion(
        conn: &Connection,
        user: UserId,
        discussion: DiscussionId,
        cutoff: Timestamp,
    ) -> Result<Vec<Post>> {
        Self::query(
            conn,
            "SELECT p.id, p.discussion_id, p.parent_id, p.user_id, p.created, p.modified, p.mailed, p.message
             FROM posts p
             LEFT JOIN read_records r ON r.post_id = p.id AND r.user_id = ?1
             WHERE p.discussion_id = ?2 AND p.modified >= ?3 AND r.id IS NULL
             ORDER BY p.created, p.id",
            params![user.get(), discussion.get(), cutoff],
        )
    }

    fn query(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Post>> {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(Self::map_row(row)?);
        }
        Ok(out)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> std::result::Result<Post, StoreError> {
        const TABLE: &str = "posts";
        Ok(Post {
            id: PostId::new(row_helpers::get(row, 0, TABLE, "id")?),
            discussion_id: DiscussionId::new(row_helpers::get(row, 1, TABLE, "discussion_id")?),
            parent_id: PostId::new(row_helpers::get(row, 2, TABLE, "parent_id")?),
            user_id: UserId::new(row_helpers::get(row, 3, TABLE, "user_id")?),
            created: row_helpers::get(row, 4, TABLE, "created")?,
            modified: row_helpers::get(row, 5, TABLE, "modified")?,
            mailed: row_helpers::get_enum(row, 6, TABLE, "mailed")?,
            message: row_helpers::get(row, 7, TABLE, "message")?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::run_migrations;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        let _ = run_migrations(&conn).unwrap();
        conn
    }

    fn post_at(conn: &Connection, created: Timestamp) -> Post {
        PostRepo::insert(
            conn,
            &NewPost {
                discussion_id: DiscussionId::new(1),
                parent_id: PostId::default(),
                user_id: UserId::new(1),
                created,
                message: "hello".into(),
            },
        )
        .unwrap()
    }

    #[test]
    fn insert_and_get() {
        let conn = setup();
        let p = post_at(&conn, 50);
        let fetched = PostRepo::get(&conn, p.id).unwrap().unwrap();
        assert_eq!(fetched, p);
        assert_eq!(fetched.modified, 50);
        assert_eq!(fetched.mailed, MailedState::Pending);
    }

    #[test]
    fn unmailed_window_is_half_open() {
        let conn = setup();
        let _before = post_at(&conn, 9);
        let start = post_at(&conn, 10);
        let inside = post_at(&conn, 15);
        let _end = post_at(&conn, 20);

        let ids: Vec<_> = PostRepo::unmailed(&conn, 10, 20).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![start.id, inside.id]);
    }

    #[test]
    fn mark_pending_as_sent_skips_later_and_failed_posts() {
        let conn = setup();
        let old = post_at(&conn, 5);
        let failed = post_at(&conn, 6);
        let fresh = post_at(&conn, 30);
        assert!(PostRepo::set_mailed(&conn, failed.id, MailedState::Error).unwrap());
        assert!(!PostRepo::set_mailed(&conn, failed.id, MailedState::Error).unwrap());
        assert!(!PostRepo::set_mailed(&conn, failed.id, MailedState::Sent).unwrap());

        assert_eq!(PostRepo::mark_pending_as_sent(&conn, 20).unwrap(), 1);
        let mailed = |id| PostRepo::get(&conn, id).unwrap().unwrap().mailed;
        assert_eq!(mailed(old.id), MailedState::Sent);
        assert_eq!(mailed(failed.id), MailedState::Error);
        assert_eq!(mailed(fresh.id), MailedState::Pending);
    }

    #[test]
    fn unread_in_discussion_excludes_read_and_stale() {
        let conn = setup();
        let _ = conn
            .execute(
                "INSERT INTO discussions (id, container_id, starter_user_id, time_modified) VALUES (1, 1, 1, 0)",
                [],
            )
            .unwrap();
        let read = post_at(&conn, 40);
        let unread = post_at(&conn, 50);
        let _stale = post_at(&conn, 5);
        let _ = conn
            .execute(
                "INSERT INTO read_records (user_id, post_id, discussion_id, container_id, first_read, last_read)
                 VALUES (1, ?1, 1, 1, 60, 60)",
                [read.id.get()],
            )
            .unwrap();

        let ids: Vec<_> = PostRepo::unread_in_discussion(&conn, UserId::new(1), DiscussionId::new(1), 10)
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![unread.id]);
    }

    #[test]
    fn list_by_discussion_in_arrival_order() {
        let conn = setup();
        let b = post_at(&conn, 20);
        let a = post_at(&conn, 10);
        let ids: Vec<_> = PostRepo::list_by_discussion(&conn, DiscussionId::new(1))
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }
}
