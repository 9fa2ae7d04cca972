use anyhow::Result;
use uuid::Uuid;

use super::OptionalExt;
use crate::Database;
use crate::models::LeaderboardRow;

/// Leaderboards are capped at the top 50 entries.
const LEADERBOARD_LIMIT: i64 = 50;

impl Database {
    /// Record a game result and maintain the user's running total.
    ///
    /// `eco_points` always equals the sum over games of the user's best
    /// score; this is kept incrementally: a first score for a game adds
    /// the full value, a new personal best adds only the difference,
    /// and anything at or below the current best is a no-op. The whole
    /// read-modify-write runs in one transaction under the writer lock,
    /// so concurrent submissions for the same (user, game) serialize.
    ///
    /// Callers must reject `points <= 0` before getting here.
    /// Returns the user's new total.
    pub fn submit_score(&self, user_id: &str, game_id: &str, points: i64) -> Result<i64> {
        debug_assert!(points > 0);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let best: Option<(String, i64)> = tx
                .query_row(
                    "SELECT id, score FROM game_scores
                     WHERE user_id = ?1 AND game_id = ?2
                     ORDER BY score DESC LIMIT 1",
                    rusqlite::params![user_id, game_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let delta = match best {
                None => {
                    tx.execute(
                        "INSERT INTO game_scores (id, user_id, game_id, score) VALUES (?1, ?2, ?3, ?4)",
                        rusqlite::params![Uuid::new_v4().to_string(), user_id, game_id, points],
                    )?;
                    points
                }
                Some((row_id, current)) if points > current => {
                    tx.execute(
                        "UPDATE game_scores SET score = ?2 WHERE id = ?1",
                        rusqlite::params![row_id, points],
                    )?;
                    points - current
                }
                Some(_) => 0,
            };

            if delta > 0 {
                tx.execute(
                    "UPDATE users SET eco_points = eco_points + ?2 WHERE id = ?1",
                    rusqlite::params![user_id, delta],
                )?;
            }

            let total: i64 = tx.query_row(
                "SELECT eco_points FROM users WHERE id = ?1",
                [user_id],
                |row| row.get(0),
            )?;

            tx.commit()?;
            Ok(total)
        })
    }

    pub fn eco_points(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT eco_points FROM users WHERE id = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(total)
        })
    }

    /// Top users for one game by best score, descending. Ties fall
    /// back to natural row order.
    pub fn game_leaderboard(&self, game_id: &str) -> Result<Vec<LeaderboardRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.avatar, MAX(s.score) AS best
                 FROM game_scores s
                 JOIN users u ON u.id = s.user_id
                 WHERE s.game_id = ?1
                 GROUP BY s.user_id
                 ORDER BY best DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![game_id, LEADERBOARD_LIMIT], map_entry)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Global ranking: two-stage aggregation, best score per
    /// (user, game) first, then summed per user. Agrees with the
    /// incrementally maintained `eco_points` by construction.
    pub fn global_leaderboard(&self) -> Result<Vec<LeaderboardRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.avatar, t.total
                 FROM (
                     SELECT user_id, SUM(max_score) AS total
                     FROM (
                         SELECT user_id, game_id, MAX(score) AS max_score
                         FROM game_scores
                         GROUP BY user_id, game_id
                     )
                     GROUP BY user_id
                 ) t
                 JOIN users u ON u.id = t.user_id
                 ORDER BY t.total DESC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([LEADERBOARD_LIMIT], map_entry)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LeaderboardRow> {
    Ok(LeaderboardRow {
        user_id: row.get(0)?,
        username: row.get(1)?,
        avatar: row.get(2)?,
        score: row.get(3)?,
    })
}
