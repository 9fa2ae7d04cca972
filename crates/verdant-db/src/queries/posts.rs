use anyhow::Result;
use rusqlite::Connection;

use super::OptionalExt;
use crate::Database;
use crate::models::{CommentRow, DetectedObjectRow, LikeRow, PostRow, ReactionRow};

const POST_COLUMNS: &str = "p.id, p.group_id, p.author_id, u.username,
        p.image_url, p.caption, p.latitude, p.longitude, p.created_at";

impl Database {
    pub fn insert_post(
        &self,
        id: &str,
        group_id: &str,
        author_id: &str,
        image_url: Option<&str>,
        caption: Option<&str>,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO posts (id, group_id, author_id, image_url, caption, latitude, longitude)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![id, group_id, author_id, image_url, caption, latitude, longitude],
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {POST_COLUMNS} FROM posts p JOIN users u ON u.id = p.author_id WHERE p.id = ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let row = stmt.query_row([id], map_post).optional()?;
            Ok(row)
        })
    }

    /// Posts of a single group, newest first. Callers are responsible
    /// for the member-or-owner check.
    pub fn posts_in_group(&self, group_id: &str) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {POST_COLUMNS} FROM posts p JOIN users u ON u.id = p.author_id
                 WHERE p.group_id = ?1
                 ORDER BY p.created_at DESC, p.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([group_id], map_post)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Union of posts across every group the user belongs to or owns,
    /// newest first.
    pub fn posts_visible_to(&self, user_id: &str) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {POST_COLUMNS} FROM posts p JOIN users u ON u.id = p.author_id
                 WHERE p.group_id IN (
                     SELECT group_id FROM group_memberships WHERE user_id = ?1
                     UNION
                     SELECT id FROM groups WHERE owner_id = ?1
                 )
                 ORDER BY p.created_at DESC, p.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], map_post)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn insert_comment(
        &self,
        id: &str,
        post_id: &str,
        author_id: &str,
        content: &str,
    ) -> Result<CommentRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO comments (id, post_id, author_id, content) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, post_id, author_id, content],
            )?;
            let row = conn.query_row(
                "SELECT c.id, c.post_id, c.author_id, u.username, c.content, c.created_at
                 FROM comments c JOIN users u ON u.id = c.author_id
                 WHERE c.id = ?1",
                [id],
                map_comment,
            )?;
            Ok(row)
        })
    }

    /// Batch-fetch comments for a set of posts, oldest first within
    /// each post.
    pub fn comments_for_posts(&self, post_ids: &[String]) -> Result<Vec<CommentRow>> {
        if post_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT c.id, c.post_id, c.author_id, u.username, c.content, c.created_at
                 FROM comments c JOIN users u ON u.id = c.author_id
                 WHERE c.post_id IN ({})
                 ORDER BY c.created_at ASC, c.rowid ASC",
                placeholders(post_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(to_params(post_ids).as_slice(), map_comment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn likes_for_posts(&self, post_ids: &[String]) -> Result<Vec<LikeRow>> {
        if post_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT post_id, user_id FROM post_likes WHERE post_id IN ({})",
                placeholders(post_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(to_params(post_ids).as_slice(), |row| {
                    Ok(LikeRow {
                        post_id: row.get(0)?,
                        user_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn reactions_for_posts(&self, post_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if post_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT r.post_id, r.user_id, u.username, r.reaction, r.created_at
                 FROM post_reactions r JOIN users u ON u.id = r.user_id
                 WHERE r.post_id IN ({})",
                placeholders(post_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(to_params(post_ids).as_slice(), map_reaction)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Toggle a like: removes if present, inserts if not. Returns the
    /// new state and the post's current like count.
    pub fn toggle_like(&self, post_id: &str, user_id: &str) -> Result<(bool, i64)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let removed = tx.execute(
                "DELETE FROM post_likes WHERE post_id = ?1 AND user_id = ?2",
                rusqlite::params![post_id, user_id],
            )?;
            let liked = if removed == 0 {
                tx.execute(
                    "INSERT INTO post_likes (post_id, user_id) VALUES (?1, ?2)",
                    rusqlite::params![post_id, user_id],
                )?;
                true
            } else {
                false
            };

            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM post_likes WHERE post_id = ?1",
                [post_id],
                |row| row.get(0),
            )?;

            tx.commit()?;
            Ok((liked, count))
        })
    }

    /// Set a reaction. Same emoji toggles it off; a different one
    /// replaces it; none inserts. Returns (removed, user's reaction
    /// after the call, per-emoji tally for the post).
    pub fn set_reaction(
        &self,
        post_id: &str,
        user_id: &str,
        reaction: &str,
    ) -> Result<(bool, Option<String>, Vec<(String, i64)>)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT reaction FROM post_reactions WHERE post_id = ?1 AND user_id = ?2",
                    rusqlite::params![post_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            let (removed, user_reaction) = match existing.as_deref() {
                Some(current) if current == reaction => {
                    tx.execute(
                        "DELETE FROM post_reactions WHERE post_id = ?1 AND user_id = ?2",
                        rusqlite::params![post_id, user_id],
                    )?;
                    (true, None)
                }
                Some(_) => {
                    // Replacing keeps the row's original timestamp
                    tx.execute(
                        "UPDATE post_reactions SET reaction = ?3
                         WHERE post_id = ?1 AND user_id = ?2",
                        rusqlite::params![post_id, user_id, reaction],
                    )?;
                    (false, Some(reaction.to_string()))
                }
                None => {
                    tx.execute(
                        "INSERT INTO post_reactions (post_id, user_id, reaction) VALUES (?1, ?2, ?3)",
                        rusqlite::params![post_id, user_id, reaction],
                    )?;
                    (false, Some(reaction.to_string()))
                }
            };

            let tally = query_reaction_tally(&tx, post_id)?;

            tx.commit()?;
            Ok((removed, user_reaction, tally))
        })
    }

    pub fn insert_detected_object(
        &self,
        id: &str,
        post_id: &str,
        label: &str,
        description: &str,
        recycle_tips: &str,
    ) -> Result<DetectedObjectRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO detected_objects (id, post_id, label, description, recycle_tips)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, post_id, label, description, recycle_tips],
            )?;
            let row = conn.query_row(
                "SELECT id, post_id, label, description, recycle_tips, created_at
                 FROM detected_objects WHERE id = ?1",
                [id],
                map_detected_object,
            )?;
            Ok(row)
        })
    }

    /// Stored recognition results for a post, in attach order.
    pub fn detected_objects_for_post(&self, post_id: &str) -> Result<Vec<DetectedObjectRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, post_id, label, description, recycle_tips, created_at
                 FROM detected_objects WHERE post_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map([post_id], map_detected_object)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// All reactions on a post with who set them, oldest first.
    pub fn reaction_roster(&self, post_id: &str) -> Result<Vec<ReactionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.post_id, r.user_id, u.username, r.reaction, r.created_at
                 FROM post_reactions r JOIN users u ON u.id = r.user_id
                 WHERE r.post_id = ?1
                 ORDER BY r.created_at ASC, r.rowid ASC",
            )?;
            let rows = stmt
                .query_map([post_id], map_reaction)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_reaction_tally(conn: &Connection, post_id: &str) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT reaction, COUNT(*) FROM post_reactions WHERE post_id = ?1 GROUP BY reaction",
    )?;
    let rows = stmt
        .query_map([post_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn placeholders(n: usize) -> String {
    (1..=n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn to_params(ids: &[String]) -> Vec<&dyn rusqlite::types::ToSql> {
    ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect()
}

fn map_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        group_id: row.get(1)?,
        author_id: row.get(2)?,
        author_username: row.get(3)?,
        image_url: row.get(4)?,
        caption: row.get(5)?,
        latitude: row.get(6)?,
        longitude: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn map_comment(row: &rusqlite::Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_id: row.get(2)?,
        author_username: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_detected_object(row: &rusqlite::Row<'_>) -> rusqlite::Result<DetectedObjectRow> {
    Ok(DetectedObjectRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        label: row.get(2)?,
        description: row.get(3)?,
        recycle_tips: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_reaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReactionRow> {
    Ok(ReactionRow {
        post_id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        reaction: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::{seed_group, seed_post, seed_user, test_db};

    #[test]
    fn toggle_like_round_trips() {
        let db = test_db();
        let owner = seed_user(&db, "owner");
        let group = seed_group(&db, &owner, "g");
        let post = seed_post(&db, &group, &owner);

        let (liked, count) = db.toggle_like(&post, &owner).unwrap();
        assert!(liked);
        assert_eq!(count, 1);

        let (liked, count) = db.toggle_like(&post, &owner).unwrap();
        assert!(!liked);
        assert_eq!(count, 0);
    }

    #[test]
    fn like_count_spans_users() {
        let db = test_db();
        let owner = seed_user(&db, "owner");
        let other = seed_user(&db, "other");
        let group = seed_group(&db, &owner, "g");
        let post = seed_post(&db, &group, &owner);

        db.toggle_like(&post, &owner).unwrap();
        let (_, count) = db.toggle_like(&post, &other).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn same_reaction_toggles_off() {
        let db = test_db();
        let owner = seed_user(&db, "owner");
        let group = seed_group(&db, &owner, "g");
        let post = seed_post(&db, &group, &owner);

        let (removed, mine, tally) = db.set_reaction(&post, &owner, "👍").unwrap();
        assert!(!removed);
        assert_eq!(mine.as_deref(), Some("👍"));
        assert_eq!(tally, vec![("👍".to_string(), 1)]);

        let (removed, mine, tally) = db.set_reaction(&post, &owner, "👍").unwrap();
        assert!(removed);
        assert!(mine.is_none());
        assert!(tally.is_empty());
    }

    #[test]
    fn different_reaction_replaces() {
        let db = test_db();
        let owner = seed_user(&db, "owner");
        let group = seed_group(&db, &owner, "g");
        let post = seed_post(&db, &group, &owner);

        db.set_reaction(&post, &owner, "👍").unwrap();
        let (removed, mine, tally) = db.set_reaction(&post, &owner, "🔥").unwrap();
        assert!(!removed);
        assert_eq!(mine.as_deref(), Some("🔥"));
        assert_eq!(tally, vec![("🔥".to_string(), 1)]);

        // Never more than one reaction row per (post, user)
        let rows = db.reactions_for_posts(&[post.clone()]).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn replacing_a_reaction_keeps_its_timestamp() {
        let db = test_db();
        let owner = seed_user(&db, "owner");
        let group = seed_group(&db, &owner, "g");
        let post = seed_post(&db, &group, &owner);

        db.set_reaction(&post, &owner, "👍").unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE post_reactions SET created_at = '2020-01-01 00:00:00'
                 WHERE post_id = ?1 AND user_id = ?2",
                rusqlite::params![post, owner],
            )?;
            Ok(())
        })
        .unwrap();

        db.set_reaction(&post, &owner, "🔥").unwrap();
        let rows = db.reaction_roster(&post).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reaction, "🔥");
        assert_eq!(rows[0].created_at, "2020-01-01 00:00:00");
    }

    #[test]
    fn detected_objects_round_trip_in_attach_order() {
        let db = test_db();
        let owner = seed_user(&db, "owner");
        let group = seed_group(&db, &owner, "g");
        let post = seed_post(&db, &group, &owner);

        db.insert_detected_object("o1", &post, "plastic bottle", "PET bottle", "rinse and recycle")
            .unwrap();
        db.insert_detected_object("o2", &post, "glass jar", "", "")
            .unwrap();

        let objects = db.detected_objects_for_post(&post).unwrap();
        let labels: Vec<&str> = objects.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["plastic bottle", "glass jar"]);
        assert_eq!(objects[0].recycle_tips, "rinse and recycle");

        let other_post = seed_post(&db, &group, &owner);
        assert!(db.detected_objects_for_post(&other_post).unwrap().is_empty());
    }

    #[test]
    fn visibility_union_of_memberships_and_ownership() {
        let db = test_db();
        let owner = seed_user(&db, "owner");
        let member = seed_user(&db, "member");
        let outsider = seed_user(&db, "outsider");
        let mine = seed_group(&db, &owner, "mine");
        let joined = seed_group(&db, &member, "joined");
        db.add_membership(&owner, &joined, "student").unwrap();

        let a = seed_post(&db, &mine, &owner);
        let b = seed_post(&db, &joined, &member);

        let visible = db.posts_visible_to(&owner).unwrap();
        let ids: Vec<&str> = visible.iter().map(|p| p.id.as_str()).collect();
        assert!(ids.contains(&a.as_str()));
        assert!(ids.contains(&b.as_str()));

        assert!(db.posts_visible_to(&outsider).unwrap().is_empty());
    }

    #[test]
    fn comments_batch_fetch_is_chronological() {
        let db = test_db();
        let owner = seed_user(&db, "owner");
        let group = seed_group(&db, &owner, "g");
        let post = seed_post(&db, &group, &owner);

        for (i, text) in ["first", "second", "third"].iter().enumerate() {
            db.insert_comment(&format!("c{i}"), &post, &owner, text)
                .unwrap();
        }

        let comments = db.comments_for_posts(&[post]).unwrap();
        let texts: Vec<&str> = comments.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn batch_fetches_with_no_posts_are_empty() {
        let db = test_db();
        assert!(db.comments_for_posts(&[]).unwrap().is_empty());
        assert!(db.likes_for_posts(&[]).unwrap().is_empty());
        assert!(db.reactions_for_posts(&[]).unwrap().is_empty());
    }
}
