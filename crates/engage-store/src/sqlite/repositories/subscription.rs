//! Subscription repositories.
//!
//! Container subscriptions are plain existence rows. Discussion
//! subscriptions are overrides against the container default: a timestamp
//! means "subscribed since", `NULL` means "explicitly unsubscribed".

use engage_core::{
    ContainerId, CourseId, DiscussionId, DiscussionSubscription, Preference, SubscriptionId,
    SubscriptionMode, UserId,
};
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::row_helpers;

/// Container-level subscription repository.
pub struct ContainerSubscriptionRepo;

impl ContainerSubscriptionRepo {
    pub fn exists(conn: &Connection, user: UserId, container: ContainerId) -> Result<bool> {
        Ok(Self::find_id(conn, user, container)?.is_some())
    }

    pub fn find_id(conn: &Connection, user: UserId, container: ContainerId) -> Result<Option<SubscriptionId>> {
        let id = conn
            .query_row(
                "SELECT id FROM container_subscriptions WHERE user_id = ?1 AND container_id = ?2",
                params![user.get(), container.get()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(id.map(SubscriptionId::new))
    }

    /// Insert a subscription row. `None` when one already existed.
    pub fn insert_if_absent(
        conn: &Connection,
        user: UserId,
        container: ContainerId,
    ) -> Result<Option<SubscriptionId>> {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO container_subscriptions (user_id, container_id) VALUES (?1, ?2)",
            params![user.get(), container.get()],
        )?;
        if inserted == 0 {
            return Ok(None);
        }
        Ok(Some(SubscriptionId::new(conn.last_insert_rowid())))
    }

    /// Delete the row and return its id, if there was one.
    pub fn delete(conn: &Connection, user: UserId, container: ContainerId) -> Result<Option<SubscriptionId>> {
        let Some(id) = Self::find_id(conn, user, container)? else {
            return Ok(None);
        };
        let _ = conn.execute(
            "DELETE FROM container_subscriptions WHERE id = ?1",
            params![id.get()],
        )?;
        Ok(Some(id))
    }

    /// Every subscriber of a container, ordered by user id.
    pub fn list_users(conn: &Connection, container: ContainerId) -> Result<Vec<UserId>> {
        let mut stmt = conn.prepare(
            "SELECT user_id FROM container_subscriptions WHERE container_id = ?1 ORDER BY user_id",
        )?;
        let users = stmt
            .query_map(params![container.get()], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(UserId::new))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Subscription flag of `user` for every non-forced container of `course`.
    pub fn course_flags(
        conn: &Connection,
        course: CourseId,
        user: UserId,
    ) -> Result<Vec<(ContainerId, bool)>> {
        let mut stmt = conn.prepare(
            "SELECT c.id, s.id IS NOT NULL
             FROM containers c
             LEFT JOIN container_subscriptions s ON s.container_id = c.id AND s.user_id = ?1
             WHERE c.course_id = ?2 AND c.subscription_mode <> ?3
             ORDER BY c.id",
        )?;
        let flags = stmt
            .query_map(
                params![user.get(), course.get(), SubscriptionMode::Forced.as_str()],
                |row| Ok((ContainerId::new(row.get(0)?), row.get::<_, bool>(1)?)),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(flags)
    }

    /// Non-forced containers in `courses` that `user` holds a subscription for.
    ///
    /// Containers in `Disallowed` mode are included so stale subscriptions can
    /// still be removed.
    pub fn unsubscribable(conn: &Connection, user: UserId, courses: &[CourseId]) -> Result<Vec<ContainerId>> {
        if courses.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT c.id FROM containers c
             JOIN container_subscriptions s ON s.container_id = c.id AND s.user_id = ?1
             WHERE c.subscription_mode <> ?2 AND c.course_id IN ({})
             ORDER BY c.id",
            row_helpers::placeholders(3, courses.len())
        );
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
            Box::new(user.get()),
            Box::new(SubscriptionMode::Forced.as_str()),
        ];
        values.extend(courses.iter().map(|c| Box::new(c.get()) as Box<dyn rusqlite::types::ToSql>));
        let refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(AsRef::as_ref).collect();

        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(refs.as_slice(), |row| row.get::<_, i64>(0))?
            .map(|r| r.map(ContainerId::new))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

const DS_COLUMNS: &str = "id, user_id, discussion_id, container_id, subscribed_since";

/// Discussion-level override repository.
pub struct DiscussionSubscriptionRepo;

impl DiscussionSubscriptionRepo {
    pub fn get(
        conn: &Connection,
        user: UserId,
        discussion: DiscussionId,
    ) -> Result<Option<DiscussionSubscription>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {DS_COLUMNS} FROM discussion_subscriptions WHERE user_id = ?1 AND discussion_id = ?2"
                ),
                params![user.get(), discussion.get()],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Overrides of one user in one container.
    pub fn list_for_user(
        conn: &Connection,
        container: ContainerId,
        user: UserId,
    ) -> Result<Vec<DiscussionSubscription>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {DS_COLUMNS} FROM discussion_subscriptions
             WHERE container_id = ?1 AND user_id = ?2 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![container.get(), user.get()], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every override in a container.
    pub fn list_for_container(conn: &Connection, container: ContainerId) -> Result<Vec<DiscussionSubscription>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {DS_COLUMNS} FROM discussion_subscriptions WHERE container_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![container.get()], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn insert(
        conn: &Connection,
        user: UserId,
        discussion: DiscussionId,
        container: ContainerId,
        preference: Preference,
    ) -> Result<SubscriptionId> {
        let _ = conn.execute(
            "INSERT INTO discussion_subscriptions (user_id, discussion_id, container_id, subscribed_since)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                user.get(),
                discussion.get(),
                container.get(),
                preference.subscribed_since()
            ],
        )?;
        Ok(SubscriptionId::new(conn.last_insert_rowid()))
    }

    pub fn update_preference(conn: &Connection, id: SubscriptionId, preference: Preference) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE discussion_subscriptions SET subscribed_since = ?1 WHERE id = ?2",
            params![preference.subscribed_since(), id.get()],
        )?;
        Ok(changed > 0)
    }

    pub fn delete(conn: &Connection, id: SubscriptionId) -> Result<bool> {
        let changed = conn.execute(
            "DELETE FROM discussion_subscriptions WHERE id = ?1",
            params![id.get()],
        )?;
        Ok(changed > 0)
    }

    /// Delete the user's "subscribed since" overrides in a container.
    pub fn delete_active_for_user(conn: &Connection, container: ContainerId, user: UserId) -> Result<usize> {
        let changed = conn.execute(
            "DELETE FROM discussion_subscriptions
             WHERE container_id = ?1 AND user_id = ?2 AND subscribed_since IS NOT NULL",
            params![container.get(), user.get()],
        )?;
        Ok(changed)
    }

    /// Delete the user's opt-outs in a container.
    pub fn delete_unsubscribed_for_user(conn: &Connection, container: ContainerId, user: UserId) -> Result<usize> {
        let changed = conn.execute(
            "DELETE FROM discussion_subscriptions
             WHERE container_id = ?1 AND user_id = ?2 AND subscribed_since IS NULL",
            params![container.get(), user.get()],
        )?;
        Ok(changed)
    }

    /// Users with at least one active discussion subscription in a container.
    pub fn list_active_users(conn: &Connection, container: ContainerId) -> Result<Vec<UserId>> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT user_id FROM discussion_subscriptions
             WHERE container_id = ?1 AND subscribed_since IS NOT NULL ORDER BY user_id",
        )?;
        let users = stmt
            .query_map(params![container.get()], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(UserId::new))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DiscussionSubscription> {
        Ok(DiscussionSubscription {
            id: SubscriptionId::new(row.get(0)?),
            user_id: UserId::new(row.get(1)?),
            discussion_id: DiscussionId::new(row.get(2)?),
            container_id: ContainerId::new(row.get(3)?),
            preference: Preference::from_column(row.get(4)?),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
