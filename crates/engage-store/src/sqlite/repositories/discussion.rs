//! Discussion repository.

use engage_core::{ContainerId, Discussion, DiscussionId, PostId, Timestamp, UserId};
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;

const COLUMNS: &str = "id, container_id, name, starter_user_id, first_post_id, time_modified";

#[derive(Clone, Debug)]
pub struct NewDiscussion {
    pub container_id: ContainerId,
    pub name: String,
    pub starter_user_id: UserId,
    pub time_modified: Timestamp,
}

pub struct DiscussionRepo;

impl DiscussionRepo {
    /// Insert a discussion. Its first post is attached afterwards with
    /// [`DiscussionRepo::set_first_post`].
    pub fn insert(conn: &Connection, new: &NewDiscussion) -> Result<Discussion> {
        let _ = conn.execute(
            "INSERT INTO discussions (container_id, name, starter_user_id, time_modified)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                new.container_id.get(),
                new.name,
                new.starter_user_id.get(),
                new.time_modified
            ],
        )?;
        Ok(Discussion {
            id: DiscussionId::new(conn.last_insert_rowid()),
            container_id: new.container_id,
            name: new.name.clone(),
            starter_user_id: new.starter_user_id,
            first_post_id: PostId::default(),
            time_modified: new.time_modified,
        })
    }

    pub fn get(conn: &Connection, id: DiscussionId) -> Result<Option<Discussion>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM discussions WHERE id = ?1"),
                params![id.get()],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_by_container(conn: &Connection, container: ContainerId) -> Result<Vec<Discussion>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM discussions WHERE container_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![container.get()], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn set_first_post(conn: &Connection, id: DiscussionId, post: PostId) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE discussions SET first_post_id = ?1 WHERE id = ?2",
            params![post.get(), id.get()],
        )?;
        Ok(changed > 0)
    }

    pub fn touch(conn: &Connection, id: DiscussionId, time_modified: Timestamp) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE discussions SET time_modified = ?1 WHERE id = ?2",
            params![time_modified, id.get()],
        )?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Discussion> {
        Ok(Discussion {
            id: DiscussionId::new(row.get(0)?),
            container_id: ContainerId::new(row.get(1)?),
            name: row.get(2)?,
            starter_user_id: UserId::new(row.get(3)?),
            first_post_id: PostId::new(row.get(4)?),
            time_modified: row.get(5)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
