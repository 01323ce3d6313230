//! Container repository: forum instances and their settings.

use engage_core::{
    Container, ContainerId, CourseId, RatingPreference, ReputationScope, SubscriptionMode,
    TrackingType,
};
use rusqlite::{Connection, params};

use crate::errors::{Result, StoreError};
use crate::row_helpers;

const COLUMNS: &str = "id, course_id, name, subscription_mode, tracking_type, reputation_scope,
                       allow_negative_reputation, rating_preference";

/// Options for creating a container.
#[derive(Clone, Debug)]
pub struct NewContainer {
    pub course_id: CourseId,
    pub name: String,
    pub subscription_mode: SubscriptionMode,
    pub tracking_type: TrackingType,
    pub reputation_scope: ReputationScope,
    pub allow_negative_reputation: bool,
    pub rating_preference: RatingPreference,
}

impl NewContainer {
    /// A `Choose` / `Optional` / per-instance container in `course`.
    pub fn in_course(course_id: CourseId) -> Self {
        Self {
            course_id,
            name: String::new(),
            subscription_mode: SubscriptionMode::Choose,
            tracking_type: TrackingType::Optional,
            reputation_scope: ReputationScope::Instance,
            allow_negative_reputation: true,
            rating_preference: RatingPreference::Starter,
        }
    }
}

/// Container repository. Stateless, every method takes `&Connection`.
pub struct ContainerRepo;

impl ContainerRepo {
    pub fn insert(conn: &Connection, new: &NewContainer) -> Result<Container> {
        let _ = conn.execute(
            "INSERT INTO containers (course_id, name, subscription_mode, tracking_type,
             reputation_scope, allow_negative_reputation, rating_preference)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new.course_id.get(),
                new.name,
                new.subscription_mode.as_str(),
                new.tracking_type.as_str(),
                new.reputation_scope.as_str(),
                new.allow_negative_reputation,
                new.rating_preference.as_str(),
            ],
        )?;
        Ok(Container {
            id: ContainerId::new(conn.last_insert_rowid()),
            course_id: new.course_id,
            name: new.name.clone(),
            subscription_mode: new.subscription_mode,
            tracking_type: new.tracking_type,
            reputation_scope: new.reputation_scope,
            allow_negative_reputation: new.allow_negative_reputation,
            rating_preference: new.rating_preference,
        })
    }

    pub fn get(conn: &Connection, id: ContainerId) -> Result<Option<Container>> {
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM containers WHERE id = ?1"))?;
        let mut rows = stmt.query(params![id.get()])?;
        match rows.next()? {
            Some(row) => Self::map_row(row).map(Some),
            None => Ok(None),
        }
    }

    pub fn list_by_course(conn: &Connection, course: CourseId) -> Result<Vec<Container>> {
        Self::list_by_courses(conn, &[course])
    }

    /// Containers of any of `courses`, ordered by id.
    pub fn list_by_courses(conn: &Connection, courses: &[CourseId]) -> Result<Vec<Container>> {
        if courses.is_empty() {
            return Ok(Vec::new());
        }
        let mut sql = format!("SELECT {COLUMNS} FROM containers WHERE course_id IN (");
        sql.push_str(&row_helpers::placeholders(1, courses.len()));
        sql.push_str(") ORDER BY id");

        let ids: Vec<i64> = courses.iter().map(|c| c.get()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(ids))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(Self::map_row(row)?);
        }
        Ok(out)
    }

    /// Returns `false` when the container does not exist.
    pub fn set_subscription_mode(
        conn: &Connection,
        id: ContainerId,
        mode: SubscriptionMode,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE containers SET subscription_mode = ?1 WHERE id = ?2",
            params![mode.as_str(), id.get()],
        )?;
        Ok(changed > 0)
    }

    pub fn set_tracking_type(conn: &Connection, id: ContainerId, tracking: TrackingType) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE containers SET tracking_type = ?1 WHERE id = ?2",
            params![tracking.as_str(), id.get()],
        )?;
        Ok(changed > 0)
    }

    /// Delete a container and every row that references it.
    ///
    /// Not transactional on its own; run it inside `Store::with_transaction`.
    pub fn delete_cascade(conn: &Connection, id: ContainerId) -> Result<bool> {
        let raw = id.get();
        let _ = conn.execute(
            "DELETE FROM posts WHERE discussion_id IN (SELECT id FROM discussions WHERE container_id = ?1)",
            params![raw],
        )?;
        for table in [
            "discussions",
            "container_subscriptions",
            "discussion_subscriptions",
            "votes",
            "read_records",
            "tracking_overrides",
        ] {
            let _ = conn.execute(&format!("DELETE FROM {table} WHERE container_id = ?1"), params![raw])?;
        }
        let deleted = conn.execute("DELETE FROM containers WHERE id = ?1", params![raw])?;
        Ok(deleted > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> std::result::Result<Container, StoreError> {
        const TABLE: &str = "containers";
        Ok(Container {
            id: ContainerId::new(row_helpers::get(row, 0, TABLE, "id")?),
            course_id: CourseId::new(row_helpers::get(row, 1, TABLE, "course_id")?),
            name: row_helpers::get(row, 2, TABLE, "name")?,
            subscription_mode: row_helpers::get_enum(row, 3, TABLE, "subscription_mode")?,
            tracking_type: row_helpers::get_enum(row, 4, TABLE, "tracking_type")?,
            reputation_scope: row_helpers::get_enum(row, 5, TABLE, "reputation_scope")?,
            allow_negative_reputation: row_helpers::get(row, 6, TABLE, "allow_negative_reputation")?,
            rating_preference: row_helpers::get_enum(row, 7, TABLE, "rating_preference")?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
