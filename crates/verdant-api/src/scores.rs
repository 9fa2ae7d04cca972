use axum::{
    Extension, Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::error;

use verdant_types::api::{
    Claims, GameLeaderboardEntry, GlobalLeaderboardEntry, UpdatePointsRequest,
    UpdatePointsResponse,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::parse_uuid;

/// Record a game result. Only a new personal best for the game moves
/// `eco_points`, and only by the difference, so the running total stays
/// equal to the sum of best scores across games.
pub async fn update_points(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdatePointsRequest>,
) -> Result<Json<UpdatePointsResponse>, ApiError> {
    if req.points <= 0 {
        return Err(ApiError::Validation("Invalid points".into()));
    }

    let uid = claims.sub.to_string();
    let total_points = if req.game_id.is_empty() {
        // No game attribution: nothing to record, report the current total
        state.db.eco_points(&uid)?
    } else {
        state.db.submit_score(&uid, &req.game_id, req.points)?
    };

    Ok(Json(UpdatePointsResponse {
        success: true,
        message: "Score updated successfully".into(),
        total_points,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub game_id: Option<String>,
}

/// Top 50, either for one game (best score per user) or globally
/// (sum of per-game best scores, the two-stage aggregation).
pub async fn leaderboard(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Response, ApiError> {
    let db = state.clone();
    let game_id = query.game_id.filter(|g| !g.is_empty());

    let response = tokio::task::spawn_blocking(move || {
        match game_id {
            Some(game_id) => {
                let entries: Vec<GameLeaderboardEntry> = db
                    .db
                    .game_leaderboard(&game_id)?
                    .into_iter()
                    .map(|row| GameLeaderboardEntry {
                        user_id: parse_uuid(&row.user_id, "leaderboard user id"),
                        username: row.username,
                        score: row.score,
                        avatar: row.avatar,
                    })
                    .collect();
                Ok::<_, anyhow::Error>(Json(entries).into_response())
            }
            None => {
                let entries: Vec<GlobalLeaderboardEntry> = db
                    .db
                    .global_leaderboard()?
                    .into_iter()
                    .map(|row| GlobalLeaderboardEntry {
                        user_id: parse_uuid(&row.user_id, "leaderboard user id"),
                        username: row.username,
                        eco_points: row.score,
                        avatar: row.avatar,
                    })
                    .collect();
                Ok(Json(entries).into_response())
            }
        }
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        anyhow::anyhow!("task join error")
    })??;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::LogMailer;
    use std::sync::Arc;
    use uuid::Uuid;
    use verdant_db::Database;
    use verdant_db::queries::users::NewUser;

    fn test_state() -> AppState {
        Arc::new(crate::auth::AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: "test-secret".into(),
            mailer: Arc::new(LogMailer),
        })
    }

    fn seed_user(state: &AppState, username: &str) -> Claims {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();
        state
            .db
            .create_user(&NewUser {
                id: &id.to_string(),
                username,
                email: &format!("{username}@example.com"),
                password_hash: "hash",
                first_name: "",
                last_name: "",
                verification_token: &Uuid::new_v4().to_string(),
                token_expires: now,
                verification_code: "000000",
                code_expires: now,
            })
            .unwrap();
        Claims {
            sub: id,
            username: username.into(),
            exp: 0,
        }
    }

    async fn submit(state: &AppState, user: &Claims, game_id: &str, points: i64) -> i64 {
        let Json(resp) = update_points(
            State(state.clone()),
            Extension(user.clone()),
            Json(UpdatePointsRequest {
                points,
                game_id: game_id.into(),
            }),
        )
        .await
        .unwrap();
        resp.total_points
    }

    #[tokio::test]
    async fn best_score_scenario() {
        let state = test_state();
        let u = seed_user(&state, "u");

        assert_eq!(submit(&state, &u, "a", 10).await, 10);
        assert_eq!(submit(&state, &u, "a", 5).await, 10);
        assert_eq!(submit(&state, &u, "b", 7).await, 17);
        assert_eq!(submit(&state, &u, "a", 20).await, 27);
    }

    #[tokio::test]
    async fn non_positive_points_never_mutate() {
        let state = test_state();
        let u = seed_user(&state, "u");
        submit(&state, &u, "a", 10).await;

        for bad in [0, -5] {
            let err = update_points(
                State(state.clone()),
                Extension(u.clone()),
                Json(UpdatePointsRequest {
                    points: bad,
                    game_id: "a".into(),
                }),
            )
            .await
            .unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)));
        }

        assert_eq!(state.db.eco_points(&u.sub.to_string()).unwrap(), 10);
    }

    #[tokio::test]
    async fn empty_game_id_reports_total_without_recording() {
        let state = test_state();
        let u = seed_user(&state, "u");
        submit(&state, &u, "a", 10).await;

        assert_eq!(submit(&state, &u, "", 99).await, 10);
        assert!(state.db.game_leaderboard("").unwrap().is_empty());
    }
}
