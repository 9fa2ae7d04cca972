use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{GroupSummary, Reaction, Role, UserProfile};

// -- JWT Claims --

/// JWT claims shared between verdant-api's middleware and token issuance.
/// Canonical definition lives here in verdant-types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

fn default_string() -> String {
    String::new()
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_string")]
    pub first_name: String,
    #[serde(default = "default_string")]
    pub last_name: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Deserialize)]
pub struct ResendVerificationRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyOtpResponse {
    pub message: String,
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct GenericMessage {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAvatarRequest {
    pub avatar: String,
}

/// Partial profile update; absent fields are left untouched.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateProfileResponse {
    pub success: bool,
    pub user: UserProfile,
    pub message: String,
}

// -- Groups --

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Student
}

#[derive(Debug, Deserialize)]
pub struct RemoveMemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub user_id: Uuid,
    pub username: String,
    pub group_id: Uuid,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

pub type GroupResponse = GroupSummary;

// -- Posts & comments --

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub group_id: Uuid,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: Uuid,
    pub group_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub image_url: Option<String>,
    pub caption: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub comments: Vec<CommentResponse>,
    pub like_count: i64,
    pub comment_count: i64,
    pub user_liked: bool,
    pub user_reaction: Option<Reaction>,
    pub reactions_count: HashMap<Reaction, i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ToggleLikeResponse {
    pub liked: bool,
    pub like_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct AddReactionRequest {
    /// Raw emoji string; validated against [`Reaction`] by the handler
    /// so missing/unknown values map to 400 rather than a decode error.
    #[serde(default)]
    pub reaction: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AddReactionResponse {
    pub removed: bool,
    pub user_reaction: Option<Reaction>,
    pub reactions_count: HashMap<Reaction, i64>,
}

/// One entry in the per-emoji reaction roster for a post.
#[derive(Debug, Serialize)]
pub struct ReactionEntry {
    pub user_id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Recognition result the mobile client attaches to a post. The server
/// stores it verbatim; no recognition runs server-side.
#[derive(Debug, Deserialize)]
pub struct AttachObjectRequest {
    pub label: String,
    #[serde(default = "default_string")]
    pub description: String,
    #[serde(default = "default_string")]
    pub recycle_tips: String,
}

#[derive(Debug, Serialize)]
pub struct DetectedObjectResponse {
    pub id: Uuid,
    pub post_id: Uuid,
    pub label: String,
    pub description: String,
    pub recycle_tips: String,
    pub created_at: DateTime<Utc>,
}

// -- Scores & leaderboard --

#[derive(Debug, Deserialize)]
pub struct UpdatePointsRequest {
    pub points: i64,
    #[serde(default = "default_string")]
    pub game_id: String,
}

#[derive(Debug, Serialize)]
pub struct UpdatePointsResponse {
    pub success: bool,
    pub message: String,
    pub total_points: i64,
}

#[derive(Debug, Serialize)]
pub struct GameLeaderboardEntry {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    pub username: String,
    pub score: i64,
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GlobalLeaderboardEntry {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    pub username: String,
    #[serde(rename = "ecoPoints")]
    pub eco_points: i64,
    pub avatar: Option<String>,
}

// -- Badges & quizzes --

#[derive(Debug, Serialize)]
pub struct BadgeResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub icon_url: String,
}

#[derive(Debug, Serialize)]
pub struct UserBadgeResponse {
    pub badge: BadgeResponse,
    pub earned_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct QuizResponse {
    pub id: Uuid,
    pub question: String,
    pub correct_answer: String,
    pub options: serde_json::Value,
}
