use anyhow::Result;

use super::OptionalExt;
use crate::Database;
use crate::models::{BadgeRow, QuizRow, UserBadgeRow};

impl Database {
    pub fn insert_badge(&self, id: &str, name: &str, description: &str, icon_url: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO badges (id, name, description, icon_url) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, name, description, icon_url],
            )?;
            Ok(())
        })
    }

    pub fn list_badges(&self) -> Result<Vec<BadgeRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, description, icon_url FROM badges ORDER BY name")?;
            let rows = stmt
                .query_map([], map_badge)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_badge(&self, id: &str) -> Result<Option<BadgeRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, description, icon_url FROM badges WHERE id = ?1",
                    [id],
                    map_badge,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn badges_for_user(&self, user_id: &str) -> Result<Vec<UserBadgeRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT b.id, b.name, b.description, b.icon_url, ub.earned_at
                 FROM user_badges ub
                 JOIN badges b ON b.id = ub.badge_id
                 WHERE ub.user_id = ?1
                 ORDER BY ub.earned_at ASC, ub.rowid ASC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(UserBadgeRow {
                        badge: map_badge(row)?,
                        earned_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Idempotent: re-awarding returns the original earned_at.
    pub fn award_badge(&self, user_id: &str, badge_id: &str) -> Result<String> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT earned_at FROM user_badges WHERE user_id = ?1 AND badge_id = ?2",
                    rusqlite::params![user_id, badge_id],
                    |row| row.get(0),
                )
                .optional()?;

            let earned_at = match existing {
                Some(ts) => ts,
                None => {
                    tx.execute(
                        "INSERT INTO user_badges (user_id, badge_id) VALUES (?1, ?2)",
                        rusqlite::params![user_id, badge_id],
                    )?;
                    tx.query_row(
                        "SELECT earned_at FROM user_badges WHERE user_id = ?1 AND badge_id = ?2",
                        rusqlite::params![user_id, badge_id],
                        |row| row.get(0),
                    )?
                }
            };

            tx.commit()?;
            Ok(earned_at)
        })
    }

    pub fn insert_quiz(
        &self,
        id: &str,
        question: &str,
        correct_answer: &str,
        options_json: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO quizzes (id, question, correct_answer, options) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, question, correct_answer, options_json],
            )?;
            Ok(())
        })
    }

    pub fn list_quizzes(&self) -> Result<Vec<QuizRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, question, correct_answer, options FROM quizzes")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(QuizRow {
                        id: row.get(0)?,
                        question: row.get(1)?,
                        correct_answer: row.get(2)?,
                        options: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_badge(row: &rusqlite::Row<'_>) -> rusqlite::Result<BadgeRow> {
    Ok(BadgeRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        icon_url: row.get(3)?,
    })
}
