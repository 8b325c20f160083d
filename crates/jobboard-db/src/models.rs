/// Database row types. These map directly to SQLite rows.
/// Distinct from jobboard-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub created_at: String,
}

pub struct NotificationRow {
    pub id: i64,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    /// JSON text, if any
    pub data: Option<String>,
    pub is_read: bool,
    /// RFC 3339
    pub created_at: String,
}
