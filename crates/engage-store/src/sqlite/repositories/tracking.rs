//! Tracking-override repository. A row means the user stopped tracking the
//! container.

use engage_core::{ContainerId, CourseId, TrackingType, UserId};
use rusqlite::{Connection, params};

use crate::errors::Result;

/// SQL predicate that is true for containers tracked for the joined user.
///
/// Expects `containers` aliased as `c` and a `LEFT JOIN` of
/// `tracking_overrides` aliased as `t`. Forced containers only count when
/// forced tracking is allowed; optional ones only without an override.
pub(crate) fn tracked_clause(allow_forced: bool) -> &'static str {
    if allow_forced {
        "(c.tracking_type = 'forced' OR (c.tracking_type = 'optional' AND t.id IS NULL))"
    } else {
        "(c.tracking_type = 'optional' AND t.id IS NULL)"
    }
}

pub struct TrackingRepo;

impl TrackingRepo {
    pub fn exists(conn: &Connection, user: UserId, container: ContainerId) -> Result<bool> {
        let found = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tracking_overrides WHERE user_id = ?1 AND container_id = ?2)",
            params![user.get(), container.get()],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Returns `false` when the override already existed.
    pub fn insert(conn: &Connection, user: UserId, container: ContainerId) -> Result<bool> {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO tracking_overrides (user_id, container_id) VALUES (?1, ?2)",
            params![user.get(), container.get()],
        )?;
        Ok(inserted > 0)
    }

    pub fn delete(conn: &Connection, user: UserId, container: ContainerId) -> Result<bool> {
        let deleted = conn.execute(
            "DELETE FROM tracking_overrides WHERE user_id = ?1 AND container_id = ?2",
            params![user.get(), container.get()],
        )?;
        Ok(deleted > 0)
    }

    /// Containers of the course that are not tracked for `user`.
    pub fn untracked_containers(
        conn: &Connection,
        user: UserId,
        course: CourseId,
        allow_forced: bool,
    ) -> Result<Vec<ContainerId>> {
        let sql = format!(
            "SELECT c.id
             FROM containers c
             LEFT JOIN tracking_overrides t ON t.container_id = c.id AND t.user_id = ?1
             WHERE c.course_id = ?2 AND NOT {}
             ORDER BY c.id",
            tracked_clause(allow_forced)
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![user.get(), course.get()], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(ContainerId::new))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

/// Whether a container is tracked, given its override state. Mirrors
/// [`tracked_clause`] for a single container already in memory.
pub fn is_tracked_type(tracking: TrackingType, has_override: bool, allow_forced: bool) -> bool {
    match tracking {
        TrackingType::Forced => allow_forced,
        TrackingType::Optional => !has_override,
        TrackingType::Off => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
