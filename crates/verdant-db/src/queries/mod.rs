pub mod catalog;
pub mod groups;
pub mod posts;
pub mod scores;
pub mod users;

use anyhow::Result;

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
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
pub(crate) mod test_support {
    use crate::Database;
    use uuid::Uuid;

    pub fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    /// Insert an already-verified, active user and return its id.
    pub fn seed_user(db: &Database, username: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password, is_active, email_verified)
                 VALUES (?1, ?2, ?3, 'hash', 1, 1)",
                rusqlite::params![id, username, format!("{username}@example.com")],
            )?;
            Ok(())
        })
        .unwrap();
        id
    }

    pub fn seed_group(db: &Database, owner_id: &str, name: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_group(&id, name, None, owner_id).unwrap();
        id
    }

    pub fn seed_post(db: &Database, group_id: &str, author_id: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.insert_post(&id, group_id, author_id, None, Some("caption"), None, None)
            .unwrap();
        id
    }
}
