use axum::{Extension, Json, extract::Path, extract::State, http::StatusCode};
use uuid::Uuid;

use verdant_db::models::{GroupInfoRow, MembershipRow};
use verdant_types::api::{
    AddMemberRequest, ChangeRoleRequest, Claims, CreateGroupRequest, GroupResponse,
    MembershipResponse, RemoveMemberRequest,
};
use verdant_types::models::Role;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{parse_created_at, parse_uuid};

pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupResponse>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("Group name required".into()));
    }

    let group_id = Uuid::new_v4().to_string();
    state.db.create_group(
        &group_id,
        req.name.trim(),
        req.description.as_deref(),
        &claims.sub.to_string(),
    )?;

    let info = state
        .db
        .get_group_info(&group_id)?
        .ok_or_else(|| anyhow::anyhow!("group vanished after creation"))?;
    Ok((StatusCode::CREATED, Json(group_response(info))))
}

pub async fn my_groups(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<GroupResponse>>, ApiError> {
    let groups = state.db.my_groups(&claims.sub.to_string())?;
    Ok(Json(groups.into_iter().map(group_response).collect()))
}

/// Self-service join; everyone comes in as a student.
pub async fn join(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<Uuid>,
) -> Result<(StatusCode, Json<MembershipResponse>), ApiError> {
    let gid = group_id.to_string();
    let uid = claims.sub.to_string();

    state
        .db
        .get_group(&gid)?
        .ok_or_else(|| ApiError::NotFound("Group not found".into()))?;

    if state.db.get_membership(&uid, &gid)?.is_some() {
        return Err(ApiError::Conflict(
            "You are already a member of this group".into(),
        ));
    }

    state.db.add_membership(&uid, &gid, Role::Student.as_str())?;
    let membership = state
        .db
        .get_membership(&uid, &gid)?
        .ok_or_else(|| anyhow::anyhow!("membership vanished after insert"))?;
    Ok((StatusCode::CREATED, Json(membership_response(membership))))
}

pub async fn add_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<MembershipResponse>), ApiError> {
    let gid = group_id.to_string();
    let target = req.user_id.to_string();

    state
        .db
        .get_group(&gid)?
        .ok_or_else(|| ApiError::NotFound("Group not found".into()))?;
    require_manager(&state, &claims, &gid, "add members")?;

    state
        .db
        .get_user_by_id(&target)?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    if state.db.get_membership(&target, &gid)?.is_some() {
        return Err(ApiError::Conflict(
            "User is already a member of this group".into(),
        ));
    }

    state.db.add_membership(&target, &gid, req.role.as_str())?;
    let membership = state
        .db
        .get_membership(&target, &gid)?
        .ok_or_else(|| anyhow::anyhow!("membership vanished after insert"))?;
    Ok((StatusCode::CREATED, Json(membership_response(membership))))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<RemoveMemberRequest>,
) -> Result<StatusCode, ApiError> {
    let gid = group_id.to_string();
    let target = req.user_id.to_string();

    let group = state
        .db
        .get_group(&gid)?
        .ok_or_else(|| ApiError::NotFound("Group not found".into()))?;
    require_manager(&state, &claims, &gid, "remove members")?;

    // Owner protection is independent of the capability check above.
    if group.owner_id == target {
        return Err(ApiError::Validation(
            "Cannot remove the group owner".into(),
        ));
    }

    if !state.db.remove_membership(&target, &gid)? {
        return Err(ApiError::NotFound("Member not found".into()));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn change_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<ChangeRoleRequest>,
) -> Result<Json<MembershipResponse>, ApiError> {
    let gid = group_id.to_string();
    let target = req.user_id.to_string();

    let group = state
        .db
        .get_group(&gid)?
        .ok_or_else(|| ApiError::NotFound("Group not found".into()))?;
    require_manager(&state, &claims, &gid, "change roles")?;

    // The owner may never be demoted off admin semantics.
    if group.owner_id == target && req.role != Role::Admin {
        return Err(ApiError::Validation(
            "Cannot change the owner's role".into(),
        ));
    }

    if !state.db.update_role(&target, &gid, req.role.as_str())? {
        return Err(ApiError::NotFound("Member not found".into()));
    }

    let membership = state
        .db
        .get_membership(&target, &gid)?
        .ok_or_else(|| anyhow::anyhow!("membership vanished after update"))?;
    Ok(Json(membership_response(membership)))
}

/// The one capability gate every privileged group mutation goes through.
fn require_manager(
    state: &AppState,
    claims: &Claims,
    group_id: &str,
    action: &str,
) -> Result<(), ApiError> {
    if state
        .db
        .can_manage_group(&claims.sub.to_string(), group_id)?
    {
        Ok(())
    } else {
        Err(ApiError::Authorization(format!(
            "You do not have permission to {action}"
        )))
    }
}

fn group_response(info: GroupInfoRow) -> GroupResponse {
    let full_name = format!("{} {}", info.owner_first_name, info.owner_last_name);
    let owner_name = match full_name.trim() {
        "" => info.owner_username.clone(),
        name => name.to_string(),
    };

    GroupResponse {
        id: parse_uuid(&info.id, "group id"),
        name: info.name,
        description: info.description,
        owner_id: parse_uuid(&info.owner_id, "group owner id"),
        owner_name,
        member_count: info.member_count,
        post_count: info.post_count,
        created_at: parse_created_at(&info.created_at, "group"),
    }
}

fn membership_response(m: MembershipRow) -> MembershipResponse {
    MembershipResponse {
        user_id: parse_uuid(&m.user_id, "membership user id"),
        username: m.username,
        group_id: parse_uuid(&m.group_id, "membership group id"),
        role: Role::parse(&m.role).unwrap_or(Role::Student),
        joined_at: parse_created_at(&m.joined_at, "membership"),
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

    async fn make_group(state: &AppState, owner: &Claims) -> Uuid {
        let (_, Json(group)) = create_group(
            State(state.clone()),
            Extension(owner.clone()),
            Json(CreateGroupRequest {
                name: "class-3b".into(),
                description: None,
            }),
        )
        .await
        .unwrap();
        group.id
    }

    #[tokio::test]
    async fn join_then_privileged_action_denied_for_student() {
        let state = test_state();
        let owner = seed_user(&state, "owner");
        let student = seed_user(&state, "student");
        let outsider = seed_user(&state, "outsider");
        let gid = make_group(&state, &owner).await;

        let (_, Json(m)) = join(State(state.clone()), Extension(student.clone()), Path(gid))
            .await
            .unwrap();
        assert_eq!(m.role, Role::Student);

        // Students cannot add members
        let err = add_member(
            State(state.clone()),
            Extension(student.clone()),
            Path(gid),
            Json(AddMemberRequest {
                user_id: outsider.sub,
                role: Role::Student,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));

        // The owner can promote the student
        let promoted = change_role(
            State(state.clone()),
            Extension(owner.clone()),
            Path(gid),
            Json(ChangeRoleRequest {
                user_id: student.sub,
                role: Role::Teacher,
            }),
        )
        .await
        .unwrap();
        assert_eq!(promoted.0.role, Role::Teacher);

        // The owner cannot be removed, even by themselves
        let err = remove_member(
            State(state),
            Extension(owner.clone()),
            Path(gid),
            Json(RemoveMemberRequest { user_id: owner.sub }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn joining_twice_is_a_conflict() {
        let state = test_state();
        let owner = seed_user(&state, "owner");
        let student = seed_user(&state, "student");
        let gid = make_group(&state, &owner).await;

        join(State(state.clone()), Extension(student.clone()), Path(gid))
            .await
            .unwrap();
        let err = join(State(state), Extension(student), Path(gid))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn owner_cannot_be_demoted() {
        let state = test_state();
        let owner = seed_user(&state, "owner");
        let gid = make_group(&state, &owner).await;

        let err = change_role(
            State(state.clone()),
            Extension(owner.clone()),
            Path(gid),
            Json(ChangeRoleRequest {
                user_id: owner.sub,
                role: Role::Student,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        // Reasserting admin on the owner is allowed
        let ok = change_role(
            State(state),
            Extension(owner.clone()),
            Path(gid),
            Json(ChangeRoleRequest {
                user_id: owner.sub,
                role: Role::Admin,
            }),
        )
        .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn my_groups_lists_owned_and_joined_once() {
        let state = test_state();
        let owner = seed_user(&state, "owner");
        let other = seed_user(&state, "other");
        let own = make_group(&state, &owner).await;
        let theirs = make_group(&state, &other).await;
        join(State(state.clone()), Extension(owner.clone()), Path(theirs))
            .await
            .unwrap();

        let Json(groups) = my_groups(State(state), Extension(owner)).await.unwrap();
        let mut ids: Vec<Uuid> = groups.iter().map(|g| g.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&own));
        assert!(ids.contains(&theirs));
    }
}
