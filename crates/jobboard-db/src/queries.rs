use crate::models::{NotificationRow, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, Row};

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, kind, title, message, data, is_read, created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, email: &str, password_hash: &str, role: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, role) VALUES (?1, ?2, ?3, ?4)",
                (id, email, password_hash, role),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_email(conn, email))
    }

    // -- Notifications --

    /// Insert an unread notification and return the stored row.
    pub fn insert_notification(
        &self,
        user_id: &str,
        kind: &str,
        title: &str,
        message: &str,
        data: Option<&str>,
    ) -> Result<NotificationRow> {
        let created_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (user_id, kind, title, message, data, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                rusqlite::params![user_id, kind, title, message, data, created_at],
            )?;

            Ok(NotificationRow {
                id: conn.last_insert_rowid(),
                user_id: user_id.to_string(),
                kind: kind.to_string(),
                title: title.to_string(),
                message: message.to_string(),
                data: data.map(str::to_string),
                is_read: false,
                created_at,
            })
        })
    }

    /// Newest-first page of a user's notifications. `before` is an exclusive
    /// id cursor taken from the last row of the previous page.
    pub fn get_notifications(
        &self,
        user_id: &str,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                 WHERE user_id = ?1 AND id < ?2
                 ORDER BY id DESC
                 LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![user_id, before.unwrap_or(i64::MAX), limit],
                    notification_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_notification(&self, user_id: &str, id: i64) -> Result<Option<NotificationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1 AND user_id = ?2"
            );
            conn.query_row(&sql, rusqlite::params![id, user_id], notification_from_row)
                .optional()
        })
    }

    /// Mark one notification read. Returns `None` if it does not exist for
    /// this user, `Some(false)` if it was already read.
    pub fn mark_notification_read(&self, user_id: &str, id: i64) -> Result<Option<bool>> {
        self.with_conn(|conn| {
            let is_read: Option<bool> = conn
                .query_row(
                    "SELECT is_read FROM notifications WHERE id = ?1 AND user_id = ?2",
                    rusqlite::params![id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            match is_read {
                None => Ok(None),
                Some(true) => Ok(Some(false)),
                Some(false) => {
                    conn.execute(
                        "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                        rusqlite::params![id, user_id],
                    )?;
                    Ok(Some(true))
                }
            }
        })
    }

    pub fn mark_all_notifications_read(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id],
            )?;
            Ok(updated as u64)
        })
    }

    pub fn unread_notification_count(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }
}

fn query_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, email, password, role, created_at FROM users WHERE email = ?1")?;

    let row = stmt
        .query_row([email], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password: row.get(2)?,
                role: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        data: row.get(5)?,
        is_read: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "00000000-0000-0000-0000-00000000000a";
    const BOB: &str = "00000000-0000-0000-0000-00000000000b";

    #[test]
    fn users_lookup_by_email() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(ALICE, "alice@example.com", "hash", "candidate").unwrap();

        let by_email = db.get_user_by_email("alice@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, ALICE);
        assert_eq!(by_email.role, "candidate");
        assert!(db.get_user_by_email("nobody@example.com").unwrap().is_none());

        // email is unique
        assert!(db.create_user(BOB, "alice@example.com", "hash", "employer").is_err());
    }

    #[test]
    fn notifications_page_newest_first() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..5 {
            db.insert_notification(ALICE, "new_application", &format!("n{i}"), "m", None)
                .unwrap();
        }
        db.insert_notification(BOB, "new_application", "other", "m", None).unwrap();

        let page = db.get_notifications(ALICE, 3, None).unwrap();
        let titles: Vec<_> = page.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["n4", "n3", "n2"]);

        let next = db.get_notifications(ALICE, 3, Some(page[2].id)).unwrap();
        let titles: Vec<_> = next.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["n1", "n0"]);
    }

    #[test]
    fn mark_read_is_idempotent_and_scoped_to_owner() {
        let db = Database::open_in_memory().unwrap();
        let row = db
            .insert_notification(ALICE, "status_change", "t", "m", Some(r#"{"jobId":1}"#))
            .unwrap();
        db.insert_notification(ALICE, "status_change", "t2", "m", None).unwrap();
        assert_eq!(db.unread_notification_count(ALICE).unwrap(), 2);

        assert_eq!(db.mark_notification_read(BOB, row.id).unwrap(), None);
        assert_eq!(db.mark_notification_read(ALICE, row.id).unwrap(), Some(true));
        assert_eq!(db.mark_notification_read(ALICE, row.id).unwrap(), Some(false));
        assert_eq!(db.unread_notification_count(ALICE).unwrap(), 1);

        let stored = db.get_notification(ALICE, row.id).unwrap().unwrap();
        assert!(stored.is_read);
        assert_eq!(stored.data.as_deref(), Some(r#"{"jobId":1}"#));

        assert_eq!(db.mark_all_notifications_read(ALICE).unwrap(), 1);
        assert_eq!(db.unread_notification_count(ALICE).unwrap(), 0);
    }
}
