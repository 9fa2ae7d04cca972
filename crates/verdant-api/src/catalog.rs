use axum::{Extension, Json, extract::Path, extract::State, http::StatusCode};
use tracing::warn;
use uuid::Uuid;

use verdant_db::models::BadgeRow;
use verdant_types::api::{BadgeResponse, Claims, QuizResponse, UserBadgeResponse};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{parse_created_at, parse_uuid};

pub async fn list_quizzes(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<Vec<QuizResponse>>, ApiError> {
    let quizzes = state
        .db
        .list_quizzes()?
        .into_iter()
        .map(|row| QuizResponse {
            id: parse_uuid(&row.id, "quiz id"),
            question: row.question,
            correct_answer: row.correct_answer,
            options: serde_json::from_str(&row.options).unwrap_or_else(|e| {
                warn!("Corrupt quiz options on '{}': {}", row.id, e);
                serde_json::Value::Array(vec![])
            }),
        })
        .collect();
    Ok(Json(quizzes))
}

pub async fn list_badges(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<Vec<BadgeResponse>>, ApiError> {
    let badges = state
        .db
        .list_badges()?
        .into_iter()
        .map(badge_response)
        .collect();
    Ok(Json(badges))
}

pub async fn my_badges(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<UserBadgeResponse>>, ApiError> {
    let earned = state
        .db
        .badges_for_user(&claims.sub.to_string())?
        .into_iter()
        .map(|row| UserBadgeResponse {
            earned_at: parse_created_at(&row.earned_at, "user badge"),
            badge: badge_response(row.badge),
        })
        .collect();
    Ok(Json(earned))
}

/// Idempotent: awarding an already-earned badge returns the original
/// earned_at instead of failing.
pub async fn award_badge(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(badge_id): Path<Uuid>,
) -> Result<(StatusCode, Json<UserBadgeResponse>), ApiError> {
    let bid = badge_id.to_string();
    let badge = state
        .db
        .get_badge(&bid)?
        .ok_or_else(|| ApiError::NotFound("Badge not found".into()))?;

    let earned_at = state.db.award_badge(&claims.sub.to_string(), &bid)?;

    Ok((
        StatusCode::CREATED,
        Json(UserBadgeResponse {
            badge: badge_response(badge),
            earned_at: parse_created_at(&earned_at, "user badge"),
        }),
    ))
}

fn badge_response(row: BadgeRow) -> BadgeResponse {
    BadgeResponse {
        id: parse_uuid(&row.id, "badge id"),
        name: row.name,
        description: row.description,
        icon_url: row.icon_url,
    }
}
