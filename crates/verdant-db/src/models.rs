//! Database row types — these map directly to SQLite rows.
//! Distinct from the verdant-types API models so the DB layer stays
//! independent of wire shapes.

use chrono::{DateTime, NaiveDateTime, Utc};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
    pub eco_points: i64,
    pub is_active: bool,
    pub email_verified: bool,
    pub verification_token: Option<String>,
    pub verification_token_expires: Option<String>,
    pub verification_code: Option<String>,
    pub verification_code_expires: Option<String>,
    pub created_at: String,
}

pub struct GroupRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub created_at: String,
}

/// Group plus the derived fields the API exposes (owner name parts,
/// live member/post counts).
pub struct GroupInfoRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub owner_username: String,
    pub owner_first_name: String,
    pub owner_last_name: String,
    pub member_count: i64,
    pub post_count: i64,
    pub created_at: String,
}

pub struct MembershipRow {
    pub user_id: String,
    pub username: String,
    pub group_id: String,
    pub role: String,
    pub joined_at: String,
}

pub struct PostRow {
    pub id: String,
    pub group_id: String,
    pub author_id: String,
    pub author_username: String,
    pub image_url: Option<String>,
    pub caption: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: String,
}

pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author_username: String,
    pub content: String,
    pub created_at: String,
}

/// Recognized object attached to a post by the mobile client, stored
/// verbatim (no recognition happens server-side).
pub struct DetectedObjectRow {
    pub id: String,
    pub post_id: String,
    pub label: String,
    pub description: String,
    pub recycle_tips: String,
    pub created_at: String,
}

pub struct LikeRow {
    pub post_id: String,
    pub user_id: String,
}

pub struct ReactionRow {
    pub post_id: String,
    pub user_id: String,
    pub username: String,
    pub reaction: String,
    pub created_at: String,
}

pub struct LeaderboardRow {
    pub user_id: String,
    pub username: String,
    pub avatar: Option<String>,
    pub score: i64,
}

pub struct BadgeRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon_url: String,
}

pub struct UserBadgeRow {
    pub badge: BadgeRow,
    pub earned_at: String,
}

pub struct QuizRow {
    pub id: String,
    pub question: String,
    pub correct_answer: String,
    pub options: String,
}

/// Parse a SQLite timestamp. Handles both RFC 3339 (what we write for
/// expirations) and the "YYYY-MM-DD HH:MM:SS" form `datetime('now')`
/// produces.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .ok()
}
