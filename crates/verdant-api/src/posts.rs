use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use verdant_db::models::{CommentRow, DetectedObjectRow, LikeRow, PostRow, ReactionRow};
use verdant_types::api::{
    AddReactionRequest, AddReactionResponse, AttachObjectRequest, Claims, CommentResponse,
    CreateCommentRequest, CreatePostRequest, DetectedObjectResponse, PostResponse, ReactionEntry,
    ToggleLikeResponse,
};
use verdant_types::models::Reaction;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{parse_created_at, parse_uuid};

#[derive(Debug, Deserialize)]
pub struct PostQuery {
    /// Optional group filter. An unparseable or unauthorized group id
    /// yields an empty list, not an error.
    pub group: Option<String>,
}

pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<PostResponse>>, ApiError> {
    let viewer = claims.sub.to_string();

    // Run blocking DB work off the async runtime
    let db = state.clone();
    let (posts, comments, likes, reactions) = tokio::task::spawn_blocking(move || {
        let posts = match &query.group {
            Some(raw) => match raw.parse::<Uuid>() {
                Ok(gid) => {
                    let gid = gid.to_string();
                    // Non-members see nothing, by design
                    if db.db.is_member_or_owner(&viewer, &gid)? {
                        db.db.posts_in_group(&gid)?
                    } else {
                        vec![]
                    }
                }
                // Malformed filters behave like unauthorized ones
                Err(_) => vec![],
            },
            None => db.db.posts_visible_to(&viewer)?,
        };

        let post_ids: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();
        let comments = db.db.comments_for_posts(&post_ids)?;
        let likes = db.db.likes_for_posts(&post_ids)?;
        let reactions = db.db.reactions_for_posts(&post_ids)?;
        Ok::<_, anyhow::Error>((posts, comments, likes, reactions))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        anyhow::anyhow!("task join error")
    })??;

    Ok(Json(assemble_posts(
        posts,
        comments,
        likes,
        reactions,
        &claims.sub.to_string(),
    )))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    let gid = req.group_id.to_string();
    let uid = claims.sub.to_string();

    state
        .db
        .get_group(&gid)?
        .ok_or_else(|| ApiError::NotFound("Group not found".into()))?;
    if !state.db.is_member_or_owner(&uid, &gid)? {
        return Err(ApiError::Authorization(
            "You do not have permission to create posts in this group".into(),
        ));
    }

    let post_id = Uuid::new_v4().to_string();
    state.db.insert_post(
        &post_id,
        &gid,
        &uid,
        req.image_url.as_deref(),
        req.caption.as_deref(),
        req.latitude,
        req.longitude,
    )?;

    let row = state
        .db
        .get_post(&post_id)?
        .ok_or_else(|| anyhow::anyhow!("post vanished after insert"))?;
    let mut responses = assemble_posts(vec![row], vec![], vec![], vec![], &uid);
    let response = responses.pop().ok_or_else(|| anyhow::anyhow!("empty post assembly"))?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::Validation("Comment content required".into()));
    }

    let uid = claims.sub.to_string();
    let post = state
        .db
        .get_post(&post_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("Post not found".into()))?;

    // Commenting requires the same membership as posting, checked
    // against the post's group.
    if !state.db.is_member_or_owner(&uid, &post.group_id)? {
        return Err(ApiError::Authorization(
            "You do not have permission to comment in this group".into(),
        ));
    }

    let comment = state.db.insert_comment(
        &Uuid::new_v4().to_string(),
        &post.id,
        &uid,
        req.content.trim(),
    )?;

    Ok((StatusCode::CREATED, Json(comment_response(comment))))
}

pub async fn toggle_like(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<ToggleLikeResponse>, ApiError> {
    let pid = post_id.to_string();
    let uid = claims.sub.to_string();
    let post = state
        .db
        .get_post(&pid)?
        .ok_or_else(|| ApiError::NotFound("Post not found".into()))?;
    require_member(&state, &uid, &post.group_id)?;

    let (liked, like_count) = state.db.toggle_like(&pid, &uid)?;
    Ok(Json(ToggleLikeResponse { liked, like_count }))
}

pub async fn add_reaction(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<AddReactionRequest>,
) -> Result<Json<AddReactionResponse>, ApiError> {
    let raw = req
        .reaction
        .ok_or_else(|| ApiError::Validation("Reaction emoji required".into()))?;
    let reaction = Reaction::parse(&raw)
        .ok_or_else(|| ApiError::Validation("Invalid reaction".into()))?;

    let pid = post_id.to_string();
    let uid = claims.sub.to_string();
    let post = state
        .db
        .get_post(&pid)?
        .ok_or_else(|| ApiError::NotFound("Post not found".into()))?;
    require_member(&state, &uid, &post.group_id)?;

    let (removed, user_reaction, tally) = state.db.set_reaction(&pid, &uid, reaction.as_str())?;

    Ok(Json(AddReactionResponse {
        removed,
        user_reaction: user_reaction.as_deref().and_then(Reaction::parse),
        reactions_count: tally_to_map(&pid, tally),
    }))
}

pub async fn list_reactions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<HashMap<Reaction, Vec<ReactionEntry>>>, ApiError> {
    let pid = post_id.to_string();
    let post = state
        .db
        .get_post(&pid)?
        .ok_or_else(|| ApiError::NotFound("Post not found".into()))?;
    require_member(&state, &claims.sub.to_string(), &post.group_id)?;

    let mut by_emoji: HashMap<Reaction, Vec<ReactionEntry>> = HashMap::new();
    for row in state.db.reaction_roster(&pid)? {
        let Some(reaction) = Reaction::parse(&row.reaction) else {
            warn!("Unknown reaction '{}' on post '{}'", row.reaction, pid);
            continue;
        };
        by_emoji.entry(reaction).or_default().push(ReactionEntry {
            user_id: parse_uuid(&row.user_id, "reaction user id"),
            username: row.username,
            created_at: parse_created_at(&row.created_at, "reaction"),
        });
    }

    Ok(Json(by_emoji))
}

/// Attach a recognition result produced by the mobile client. The label
/// comes in precomputed; the server only stores it.
pub async fn attach_object(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<AttachObjectRequest>,
) -> Result<(StatusCode, Json<DetectedObjectResponse>), ApiError> {
    if req.label.trim().is_empty() {
        return Err(ApiError::Validation("Object label required".into()));
    }

    let pid = post_id.to_string();
    let post = state
        .db
        .get_post(&pid)?
        .ok_or_else(|| ApiError::NotFound("Post not found".into()))?;
    require_member(&state, &claims.sub.to_string(), &post.group_id)?;

    let row = state.db.insert_detected_object(
        &Uuid::new_v4().to_string(),
        &post.id,
        req.label.trim(),
        &req.description,
        &req.recycle_tips,
    )?;

    Ok((StatusCode::CREATED, Json(object_response(row))))
}

pub async fn list_objects(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Vec<DetectedObjectResponse>>, ApiError> {
    let pid = post_id.to_string();
    let post = state
        .db
        .get_post(&pid)?
        .ok_or_else(|| ApiError::NotFound("Post not found".into()))?;
    require_member(&state, &claims.sub.to_string(), &post.group_id)?;

    let objects = state
        .db
        .detected_objects_for_post(&pid)?
        .into_iter()
        .map(object_response)
        .collect();
    Ok(Json(objects))
}

/// Post interactions (likes, reactions, detected objects, the reaction
/// roster) are scoped to the post's group: only members and the owner
/// may touch them.
fn require_member(state: &AppState, user_id: &str, group_id: &str) -> Result<(), ApiError> {
    if state.db.is_member_or_owner(user_id, group_id)? {
        Ok(())
    } else {
        Err(ApiError::Authorization(
            "You do not have permission to interact with posts in this group".into(),
        ))
    }
}

/// Join posts with their batched comments, likes and reactions into
/// API responses, computing the viewer-specific fields.
fn assemble_posts(
    posts: Vec<PostRow>,
    comments: Vec<CommentRow>,
    likes: Vec<LikeRow>,
    reactions: Vec<ReactionRow>,
    viewer_id: &str,
) -> Vec<PostResponse> {
    let mut comment_map: HashMap<String, Vec<CommentResponse>> = HashMap::new();
    for c in comments {
        comment_map
            .entry(c.post_id.clone())
            .or_default()
            .push(comment_response(c));
    }

    let mut like_counts: HashMap<String, i64> = HashMap::new();
    let mut liked_by_viewer: HashMap<String, bool> = HashMap::new();
    for l in &likes {
        *like_counts.entry(l.post_id.clone()).or_default() += 1;
        if l.user_id == viewer_id {
            liked_by_viewer.insert(l.post_id.clone(), true);
        }
    }

    let mut reaction_counts: HashMap<String, HashMap<Reaction, i64>> = HashMap::new();
    let mut viewer_reactions: HashMap<String, Reaction> = HashMap::new();
    for r in &reactions {
        let Some(reaction) = Reaction::parse(&r.reaction) else {
            warn!("Unknown reaction '{}' on post '{}'", r.reaction, r.post_id);
            continue;
        };
        *reaction_counts
            .entry(r.post_id.clone())
            .or_default()
            .entry(reaction)
            .or_default() += 1;
        if r.user_id == viewer_id {
            viewer_reactions.insert(r.post_id.clone(), reaction);
        }
    }

    posts
        .into_iter()
        .map(|row| {
            let comments = comment_map.remove(&row.id).unwrap_or_default();
            PostResponse {
                id: parse_uuid(&row.id, "post id"),
                group_id: parse_uuid(&row.group_id, "post group id"),
                author_id: parse_uuid(&row.author_id, "post author id"),
                author_username: row.author_username,
                image_url: row.image_url,
                caption: row.caption,
                latitude: row.latitude,
                longitude: row.longitude,
                created_at: parse_created_at(&row.created_at, "post"),
                comment_count: comments.len() as i64,
                comments,
                like_count: like_counts.get(&row.id).copied().unwrap_or(0),
                user_liked: liked_by_viewer.get(&row.id).copied().unwrap_or(false),
                user_reaction: viewer_reactions.get(&row.id).copied(),
                reactions_count: reaction_counts.remove(&row.id).unwrap_or_default(),
            }
        })
        .collect()
}

fn tally_to_map(post_id: &str, tally: Vec<(String, i64)>) -> HashMap<Reaction, i64> {
    let mut map = HashMap::new();
    for (raw, count) in tally {
        match Reaction::parse(&raw) {
            Some(reaction) => {
                map.insert(reaction, count);
            }
            None => warn!("Unknown reaction '{}' on post '{}'", raw, post_id),
        }
    }
    map
}

fn object_response(o: DetectedObjectRow) -> DetectedObjectResponse {
    DetectedObjectResponse {
        id: parse_uuid(&o.id, "object id"),
        post_id: parse_uuid(&o.post_id, "object post id"),
        label: o.label,
        description: o.description,
        recycle_tips: o.recycle_tips,
        created_at: parse_created_at(&o.created_at, "detected object"),
    }
}

fn comment_response(c: CommentRow) -> CommentResponse {
    CommentResponse {
        id: parse_uuid(&c.id, "comment id"),
        post_id: parse_uuid(&c.post_id, "comment post id"),
        author_id: parse_uuid(&c.author_id, "comment author id"),
        author_username: c.author_username,
        content: c.content,
        created_at: parse_created_at(&c.created_at, "comment"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::LogMailer;
    use std::sync::Arc;
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

    fn seed_group(state: &AppState, owner: &Claims) -> Uuid {
        let gid = Uuid::new_v4();
        state
            .db
            .create_group(&gid.to_string(), "g", None, &owner.sub.to_string())
            .unwrap();
        gid
    }

    #[tokio::test]
    async fn outsider_filtered_listing_is_empty_not_an_error() {
        let state = test_state();
        let owner = seed_user(&state, "owner");
        let outsider = seed_user(&state, "outsider");
        let gid = seed_group(&state, &owner);

        create_post(
            State(state.clone()),
            Extension(owner),
            Json(CreatePostRequest {
                group_id: gid,
                image_url: None,
                caption: Some("hello".into()),
                latitude: None,
                longitude: None,
            }),
        )
        .await
        .unwrap();

        let Json(posts) = list_posts(
            State(state.clone()),
            Query(PostQuery {
                group: Some(gid.to_string()),
            }),
            Extension(outsider.clone()),
        )
        .await
        .unwrap();
        assert!(posts.is_empty());

        // Malformed filter behaves the same way
        let Json(posts) = list_posts(
            State(state),
            Query(PostQuery {
                group: Some("not-a-uuid".into()),
            }),
            Extension(outsider),
        )
        .await
        .unwrap();
        assert!(posts.is_empty());
    }

    #[tokio::test]
    async fn non_member_cannot_post_or_comment() {
        let state = test_state();
        let owner = seed_user(&state, "owner");
        let outsider = seed_user(&state, "outsider");
        let gid = seed_group(&state, &owner);

        let err = create_post(
            State(state.clone()),
            Extension(outsider.clone()),
            Json(CreatePostRequest {
                group_id: gid,
                image_url: None,
                caption: None,
                latitude: None,
                longitude: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));

        let (_, Json(post)) = create_post(
            State(state.clone()),
            Extension(owner),
            Json(CreatePostRequest {
                group_id: gid,
                image_url: None,
                caption: Some("geotagged".into()),
                latitude: Some(45.46),
                longitude: Some(9.19),
            }),
        )
        .await
        .unwrap();

        let err = create_comment(
            State(state),
            Extension(outsider),
            Path(post.id),
            Json(CreateCommentRequest {
                content: "nice".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));
    }

    #[tokio::test]
    async fn non_member_cannot_like_react_or_list_reactions() {
        let state = test_state();
        let owner = seed_user(&state, "owner");
        let outsider = seed_user(&state, "outsider");
        let gid = seed_group(&state, &owner);
        let (_, Json(post)) = create_post(
            State(state.clone()),
            Extension(owner.clone()),
            Json(CreatePostRequest {
                group_id: gid,
                image_url: None,
                caption: None,
                latitude: None,
                longitude: None,
            }),
        )
        .await
        .unwrap();

        let err = toggle_like(
            State(state.clone()),
            Extension(outsider.clone()),
            Path(post.id),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));

        let err = add_reaction(
            State(state.clone()),
            Extension(outsider.clone()),
            Path(post.id),
            Json(AddReactionRequest {
                reaction: Some("🔥".into()),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));

        let err = list_reactions(State(state.clone()), Extension(outsider), Path(post.id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));

        // Nothing leaked through: the owner still sees an untouched post
        let Json(roster) = list_reactions(State(state.clone()), Extension(owner.clone()), Path(post.id))
            .await
            .unwrap();
        assert!(roster.is_empty());
        let Json(resp) = toggle_like(State(state), Extension(owner), Path(post.id))
            .await
            .unwrap();
        assert!(resp.liked);
        assert_eq!(resp.like_count, 1);
    }

    #[tokio::test]
    async fn reaction_handler_validates_emoji() {
        let state = test_state();
        let owner = seed_user(&state, "owner");
        let gid = seed_group(&state, &owner);
        let (_, Json(post)) = create_post(
            State(state.clone()),
            Extension(owner.clone()),
            Json(CreatePostRequest {
                group_id: gid,
                image_url: None,
                caption: None,
                latitude: None,
                longitude: None,
            }),
        )
        .await
        .unwrap();

        for bad in [None, Some("🤖".to_string())] {
            let err = add_reaction(
                State(state.clone()),
                Extension(owner.clone()),
                Path(post.id),
                Json(AddReactionRequest { reaction: bad }),
            )
            .await
            .unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)));
        }

        let Json(resp) = add_reaction(
            State(state),
            Extension(owner),
            Path(post.id),
            Json(AddReactionRequest {
                reaction: Some("🔥".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.user_reaction, Some(Reaction::Fire));
        assert_eq!(resp.reactions_count.get(&Reaction::Fire), Some(&1));
    }

    #[tokio::test]
    async fn detected_objects_are_member_scoped() {
        let state = test_state();
        let owner = seed_user(&state, "owner");
        let outsider = seed_user(&state, "outsider");
        let gid = seed_group(&state, &owner);
        let (_, Json(post)) = create_post(
            State(state.clone()),
            Extension(owner.clone()),
            Json(CreatePostRequest {
                group_id: gid,
                image_url: None,
                caption: None,
                latitude: None,
                longitude: None,
            }),
        )
        .await
        .unwrap();

        let err = attach_object(
            State(state.clone()),
            Extension(owner.clone()),
            Path(post.id),
            Json(AttachObjectRequest {
                label: "  ".into(),
                description: String::new(),
                recycle_tips: String::new(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let (status, Json(object)) = attach_object(
            State(state.clone()),
            Extension(owner.clone()),
            Path(post.id),
            Json(AttachObjectRequest {
                label: "plastic bottle".into(),
                description: "PET bottle".into(),
                recycle_tips: "rinse and recycle".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(object.label, "plastic bottle");

        let err = attach_object(
            State(state.clone()),
            Extension(outsider.clone()),
            Path(post.id),
            Json(AttachObjectRequest {
                label: "glass jar".into(),
                description: String::new(),
                recycle_tips: String::new(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));

        let err = list_objects(State(state.clone()), Extension(outsider), Path(post.id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));

        let Json(objects) = list_objects(State(state), Extension(owner), Path(post.id))
            .await
            .unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].recycle_tips, "rinse and recycle");
    }

    #[tokio::test]
    async fn listing_carries_viewer_specific_fields() {
        let state = test_state();
        let owner = seed_user(&state, "owner");
        let member = seed_user(&state, "member");
        let gid = seed_group(&state, &owner);
        state
            .db
            .add_membership(&member.sub.to_string(), &gid.to_string(), "student")
            .unwrap();

        let (_, Json(post)) = create_post(
            State(state.clone()),
            Extension(owner.clone()),
            Json(CreatePostRequest {
                group_id: gid,
                image_url: None,
                caption: Some("caption".into()),
                latitude: None,
                longitude: None,
            }),
        )
        .await
        .unwrap();

        toggle_like(State(state.clone()), Extension(member.clone()), Path(post.id))
            .await
            .unwrap();
        create_comment(
            State(state.clone()),
            Extension(member.clone()),
            Path(post.id),
            Json(CreateCommentRequest {
                content: "first".into(),
            }),
        )
        .await
        .unwrap();

        // The owner sees the like count but user_liked is per-viewer
        let Json(posts) = list_posts(
            State(state),
            Query(PostQuery { group: None }),
            Extension(owner),
        )
        .await
        .unwrap();
        assert_eq!(posts.len(), 1);
        let p = &posts[0];
        assert_eq!(p.like_count, 1);
        assert!(!p.user_liked);
        assert_eq!(p.comment_count, 1);
        assert_eq!(p.comments[0].content, "first");
    }
}
