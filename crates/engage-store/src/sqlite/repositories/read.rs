//! Read-record repository.
//!
//! A read record exists for a (user, post) pair once the user has seen the
//! post. Posts whose `modified` is older than the staleness cutoff are never
//! counted and never get new records.

use engage_core::{ContainerId, CourseId, DiscussionId, PostId, ReadRecord, Timestamp, UserId};
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::sqlite::repositories::tracking::tracked_clause;

const COLUMNS: &str = "id, user_id, post_id, discussion_id, container_id, first_read, last_read";

/// Any combination of columns to delete read records by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadFilter {
    pub user: Option<UserId>,
    pub post: Option<PostId>,
    pub discussion: Option<DiscussionId>,
    pub container: Option<ContainerId>,
}

impl ReadFilter {
    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.post.is_none() && self.discussion.is_none() && self.container.is_none()
    }

    fn clauses(&self) -> (String, Vec<i64>) {
        let columns = [
            ("user_id", self.user.map(UserId::get)),
            ("post_id", self.post.map(PostId::get)),
            ("discussion_id", self.discussion.map(DiscussionId::get)),
            ("container_id", self.container.map(ContainerId::get)),
        ];
        let mut conditions = Vec::new();
        let mut values = Vec::new();
        for (column, value) in columns {
            if let Some(value) = value {
                values.push(value);
                conditions.push(format!("{column} = ?{}", values.len()));
            }
        }
        (conditions.join(" AND "), values)
    }
}

pub struct ReadRepo;

impl ReadRepo {
    pub fn get(conn: &Connection, user: UserId, post: PostId) -> Result<Option<ReadRecord>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM read_records WHERE user_id = ?1 AND post_id = ?2"),
                params![user.get(), post.get()],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Insert a record with `first_read = last_read = now`, copying the
    /// discussion and container from the post.
    ///
    /// The insert only happens while the post's `modified` is still at or
    /// after `cutoff`, checked in the same statement. Returns whether a row
    /// was written.
    pub fn insert_guarded(
        conn: &Connection,
        user: UserId,
        post: PostId,
        now: Timestamp,
        cutoff: Timestamp,
    ) -> Result<bool> {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO read_records
                 (user_id, post_id, discussion_id, container_id, first_read, last_read)
             SELECT ?1, p.id, p.discussion_id, d.container_id, ?2, ?2
             FROM posts p JOIN discussions d ON d.id = p.discussion_id
             WHERE p.id = ?3 AND p.modified >= ?4",
            params![user.get(), now, post.get(), cutoff],
        )?;
        Ok(inserted > 0)
    }

    /// Bump `last_read` of an existing record.
    pub fn touch(conn: &Connection, user: UserId, post: PostId, now: Timestamp) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE read_records SET last_read = ?1 WHERE user_id = ?2 AND post_id = ?3",
            params![now, user.get(), post.get()],
        )?;
        Ok(changed > 0)
    }

    /// Delete every record matching the filter. An empty filter deletes
    /// nothing.
    pub fn delete(conn: &Connection, filter: &ReadFilter) -> Result<usize> {
        if filter.is_empty() {
            return Ok(0);
        }
        let (conditions, values) = filter.clauses();
        let deleted = conn.execute(
            &format!("DELETE FROM read_records WHERE {conditions}"),
            rusqlite::params_from_iter(values),
        )?;
        Ok(deleted)
    }

    /// Fresh posts in the container the user has no record for.
    pub fn count_unread_in_container(
        conn: &Connection,
        user: UserId,
        container: ContainerId,
        cutoff: Timestamp,
    ) -> Result<i64> {
        let count = conn.query_row(
            "SELECT COUNT(p.id)
             FROM posts p
             JOIN discussions d ON d.id = p.discussion_id
             LEFT JOIN read_records r ON r.post_id = p.id AND r.user_id = ?1
             WHERE d.container_id = ?2 AND p.modified >= ?3 AND r.id IS NULL",
            params![user.get(), container.get(), cutoff],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Unread counts per tracked container of a course. Containers without
    /// unread posts are absent.
    pub fn count_unread_by_container_for_course(
        conn: &Connection,
        user: UserId,
        course: CourseId,
        cutoff: Timestamp,
        allow_forced: bool,
    ) -> Result<Vec<(ContainerId, i64)>> {
        let sql = format!(
            "SELECT c.id, COUNT(p.id)
             FROM posts p
             JOIN discussions d ON d.id = p.discussion_id
             JOIN containers c ON c.id = d.container_id
             LEFT JOIN read_records r ON r.post_id = p.id AND r.user_id = ?1
             LEFT JOIN tracking_overrides t ON t.container_id = c.id AND t.user_id = ?1
             WHERE c.course_id = ?2 AND p.modified >= ?3 AND r.id IS NULL AND {}
             GROUP BY c.id ORDER BY c.id",
            tracked_clause(allow_forced)
        );
        let mut stmt = conn.prepare(&sql)?;
        let counts = stmt
            .query_map(params![user.get(), course.get(), cutoff], |row| {
                Ok((ContainerId::new(row.get(0)?), row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    /// Discussions of the container holding at least one fresh unread post.
    pub fn discussions_with_unread(
        conn: &Connection,
        user: UserId,
        container: ContainerId,
        cutoff: Timestamp,
    ) -> Result<Vec<DiscussionId>> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT d.id
             FROM posts p
             JOIN discussions d ON d.id = p.discussion_id
             LEFT JOIN read_records r ON r.post_id = p.id AND r.user_id = ?1
             WHERE d.container_id = ?2 AND p.modified >= ?3 AND r.id IS NULL
             ORDER BY d.id",
        )?;
        let ids = stmt
            .query_map(params![user.get(), container.get(), cutoff], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(DiscussionId::new))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Oldest `modified` of any post that has a read record.
    pub fn oldest_referenced_modified(conn: &Connection) -> Result<Option<Timestamp>> {
        let first = conn.query_row(
            "SELECT MIN(p.modified) FROM posts p JOIN read_records r ON r.post_id = p.id",
            [],
            |row| row.get::<_, Option<i64>>(0),
        )?;
        Ok(first)
    }

    /// Delete records of posts modified in `[first, cutoff)`.
    pub fn prune(conn: &Connection, first: Timestamp, cutoff: Timestamp) -> Result<usize> {
        let deleted = conn.execute(
            "DELETE FROM read_records
             WHERE post_id IN (SELECT id FROM posts WHERE modified >= ?1 AND modified < ?2)",
            params![first, cutoff],
        )?;
        Ok(deleted)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReadRecord> {
        Ok(ReadRecord {
            id: row.get(0)?,
            user_id: UserId::new(row.get(1)?),
            post_id: PostId::new(row.get(2)?),
            discussion_id: DiscussionId::new(row.get(3)?),
            container_id: ContainerId::new(row.get(4)?),
            first_read: row.get(5)?,
            last_read: row.get(6)?,
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
    use crate::sqlite::repositories::container::{ContainerRepo, NewContainer};
    use crate::sqlite::repositories::discussion::{DiscussionRepo, NewDiscussion};
    use crate::sqlite::repositories::post::{NewPost, PostRepo};
    use crate::sqlite::repositories::tracking::TrackingRepo;
    use engage_core::TrackingType;

    const U1: UserId = UserId::new(1);
    const COURSE: CourseId = CourseId::new(1);

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        let _ = run_migrations(&conn).unwrap();
        conn
    }

    fn container(conn: &Connection, tracking: TrackingType) -> ContainerId {
        ContainerRepo::insert(
            conn,
            &NewContainer {
                tracking_type: tracking,
                ..NewContainer::in_course(COURSE)
            },
        )
        .unwrap()
        .id
    }

    fn discussion(conn: &Connection, container: ContainerId) -> DiscussionId {
        DiscussionRepo::insert(
            conn,
            &NewDiscussion {
                container_id: container,
                name: String::new(),
                starter_user_id: UserId::new(9),
                time_modified: 0,
            },
        )
        .unwrap()
        .id
    }

    fn post(conn: &Connection, discussion: DiscussionId, modified: Timestamp) -> PostId {
        PostRepo::insert(
            conn,
            &NewPost {
                discussion_id: discussion,
                parent_id: PostId::default(),
                user_id: UserId::new(9),
                created: modified,
                message: String::new(),
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn guarded_insert_copies_location_and_rejects_stale_posts() {
        let conn = setup();
        let c = container(&conn, TrackingType::Optional);
        let d = discussion(&conn, c);
        let fresh = post(&conn, d, 100);
        let stale = post(&conn, d, 10);

        assert!(ReadRepo::insert_guarded(&conn, U1, fresh, 500, 50).unwrap());
        let record = ReadRepo::get(&conn, U1, fresh).unwrap().unwrap();
        assert_eq!(record.discussion_id, d);
        assert_eq!(record.container_id, c);
        assert_eq!((record.first_read, record.last_read), (500, 500));

        assert!(!ReadRepo::insert_guarded(&conn, U1, stale, 500, 50).unwrap());
        assert!(ReadRepo::get(&conn, U1, stale).unwrap().is_none());
        assert!(!ReadRepo::insert_guarded(&conn, U1, PostId::new(99), 500, 0).unwrap());
    }

    #[test]
    fn touch_bumps_last_read_only_for_that_user() {
        let conn = setup();
        let c = container(&conn, TrackingType::Optional);
        let p = post(&conn, discussion(&conn, c), 100);
        let u2 = UserId::new(2);
        assert!(ReadRepo::insert_guarded(&conn, U1, p, 200, 0).unwrap());
        assert!(ReadRepo::insert_guarded(&conn, u2, p, 200, 0).unwrap());

        assert!(ReadRepo::touch(&conn, U1, p, 300).unwrap());
        assert_eq!(ReadRepo::get(&conn, U1, p).unwrap().unwrap().last_read, 300);
        assert_eq!(ReadRepo::get(&conn, u2, p).unwrap().unwrap().last_read, 200);
    }

    #[test]
    fn unread_counts_skip_stale_and_read_posts() {
        let conn = setup();
        let c = container(&conn, TrackingType::Optional);
        let d = discussion(&conn, c);
        let a = post(&conn, d, 100);
        let _b = post(&conn, d, 120);
        let _old = post(&conn, d, 10);
        assert!(ReadRepo::insert_guarded(&conn, U1, a, 200, 50).unwrap());

        assert_eq!(ReadRepo::count_unread_in_container(&conn, U1, c, 50).unwrap(), 1);
        assert_eq!(ReadRepo::count_unread_in_container(&conn, UserId::new(2), c, 50).unwrap(), 2);
        assert_eq!(ReadRepo::discussions_with_unread(&conn, U1, c, 50).unwrap(), vec![d]);
    }

    #[test]
    fn course_counts_follow_tracking_rules() {
        let conn = setup();
        let optional = container(&conn, TrackingType::Optional);
        let stopped = container(&conn, TrackingType::Optional);
        let forced = container(&conn, TrackingType::Forced);
        let off = container(&conn, TrackingType::Off);
        for c in [optional, stopped, forced, off] {
            let _ = post(&conn, discussion(&conn, c), 100);
        }
        assert!(TrackingRepo::insert(&conn, U1, stopped).unwrap());

        let counts = ReadRepo::count_unread_by_container_for_course(&conn, U1, COURSE, 0, true).unwrap();
        assert_eq!(counts, vec![(optional, 1), (forced, 1)]);

        let counts = ReadRepo::count_unread_by_container_for_course(&conn, U1, COURSE, 0, false).unwrap();
        assert_eq!(counts, vec![(optional, 1)]);
    }

    #[test]
    fn delete_by_filter() {
        let conn = setup();
        let c = container(&conn, TrackingType::Optional);
        let d = discussion(&conn, c);
        let a = post(&conn, d, 100);
        let b = post(&conn, d, 100);
        for (u, p) in [(1, a), (1, b), (2, a)] {
            assert!(ReadRepo::insert_guarded(&conn, UserId::new(u), p, 100, 0).unwrap());
        }

        assert_eq!(ReadRepo::delete(&conn, &ReadFilter::default()).unwrap(), 0);
        let by_user_in_container = ReadFilter {
            user: Some(U1),
            container: Some(c),
            ..ReadFilter::default()
        };
        assert_eq!(ReadRepo::delete(&conn, &by_user_in_container).unwrap(), 2);
        assert!(ReadRepo::get(&conn, UserId::new(2), a).unwrap().is_some());
    }

    #[test]
    fn prune_removes_only_stale_range() {
        let conn = setup();
        let c = container(&conn, TrackingType::Optional);
        let d = discussion(&conn, c);
        let old = post(&conn, d, 20);
        let fresh = post(&conn, d, 200);
        assert!(ReadRepo::insert_guarded(&conn, U1, old, 300, 0).unwrap());
        assert!(ReadRepo::insert_guarded(&conn, U1, fresh, 300, 0).unwrap());

        assert_eq!(ReadRepo::oldest_referenced_modified(&conn).unwrap(), Some(20));
        assert_eq!(ReadRepo::prune(&conn, 20, 100).unwrap(), 1);
        assert!(ReadRepo::get(&conn, U1, old).unwrap().is_none());
        assert!(ReadRepo::get(&conn, U1, fresh).unwrap().is_some());
    }

    #[test]
    fn oldest_referenced_is_none_without_records() {
        let conn = setup();
        assert_eq!(ReadRepo::oldest_referenced_modified(&conn).unwrap(), None);
    }
}
