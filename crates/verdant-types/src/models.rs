use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Membership role inside a group. Only `Admin` (or group ownership)
/// grants management rights; `Teacher` and `Student` are content roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            _ => None,
        }
    }
}

/// The fixed emoji set a post reaction may take. One reaction per
/// (post, user); setting a different one replaces the old.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reaction {
    #[serde(rename = "👍")]
    ThumbsUp,
    #[serde(rename = "❤️")]
    Heart,
    #[serde(rename = "😂")]
    Laughing,
    #[serde(rename = "😮")]
    Surprised,
    #[serde(rename = "😢")]
    Sad,
    #[serde(rename = "😡")]
    Angry,
    #[serde(rename = "🔥")]
    Fire,
    #[serde(rename = "👏")]
    Clap,
}

impl Reaction {
    pub const ALL: [Reaction; 8] = [
        Reaction::ThumbsUp,
        Reaction::Heart,
        Reaction::Laughing,
        Reaction::Surprised,
        Reaction::Sad,
        Reaction::Angry,
        Reaction::Fire,
        Reaction::Clap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Reaction::ThumbsUp => "👍",
            Reaction::Heart => "❤️",
            Reaction::Laughing => "😂",
            Reaction::Surprised => "😮",
            Reaction::Sad => "😢",
            Reaction::Angry => "😡",
            Reaction::Fire => "🔥",
            Reaction::Clap => "👏",
        }
    }

    pub fn parse(s: &str) -> Option<Reaction> {
        Reaction::ALL.iter().copied().find(|r| r.as_str() == s)
    }
}

/// Public view of a user, embedded in auth and leaderboard responses.
/// Never carries the password hash or verification secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
    pub eco_points: i64,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub owner_name: String,
    pub member_count: i64,
    pub post_count: i64,
    pub created_at: DateTime<Utc>,
}
