use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::Path, extract::State, http::StatusCode};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand::Rng;
use tracing::warn;
use uuid::Uuid;

use verdant_db::Database;
use verdant_db::models::UserRow;
use verdant_db::queries::users::{CodeVerification, NewUser, TokenVerification};
use verdant_types::api::{
    Claims, GenericMessage, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
    ResendVerificationRequest, UpdateAvatarRequest, UpdateProfileRequest, UpdateProfileResponse,
    VerifyOtpRequest, VerifyOtpResponse,
};
use verdant_types::models::UserProfile;

use crate::error::ApiError;
use crate::mailer::Mailer;
use crate::{parse_created_at, parse_uuid};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub mailer: Arc<dyn Mailer>,
}

/// Verification link lifetime.
const TOKEN_TTL_HOURS: i64 = 24;
/// OTP code lifetime.
const CODE_TTL_MINUTES: i64 = 10;
/// Avatars are stored as data URIs; cap the payload.
const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::Validation(
            "Username must be between 3 and 32 characters".into(),
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters".into(),
        ));
    }
    if !req.email.contains('@') {
        return Err(ApiError::Validation("Invalid email address".into()));
    }

    if state.db.get_user_by_username(&req.username)?.is_some() {
        return Err(ApiError::Conflict("Username already exists".into()));
    }
    if state.db.get_user_by_email(&req.email)?.is_some() {
        return Err(ApiError::Conflict("Email already exists".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
        .to_string();

    let user_id = Uuid::new_v4();
    let token = Uuid::new_v4().to_string();
    let code = new_verification_code();
    let now = Utc::now();

    state.db.create_user(&NewUser {
        id: &user_id.to_string(),
        username: &req.username,
        email: &req.email,
        password_hash: &password_hash,
        first_name: &req.first_name,
        last_name: &req.last_name,
        verification_token: &token,
        token_expires: now + Duration::hours(TOKEN_TTL_HOURS),
        verification_code: &code,
        code_expires: now + Duration::minutes(CODE_TTL_MINUTES),
    })?;

    // Mail delivery is best-effort: registration must succeed even when
    // the mail infrastructure is down.
    if let Err(e) = state
        .mailer
        .send_verification(&req.email, &req.username, &code, &token)
    {
        warn!("Failed to send verification email to {}: {e:#}", req.email);
    }

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful. Please check your email to verify your account."
                .into(),
            user_id,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .db
        .get_user_by_username(&req.username)?
        .ok_or_else(|| ApiError::Authentication("Invalid credentials".into()))?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("stored password hash unreadable: {e}"))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Authentication("Invalid credentials".into()))?;

    if !user.email_verified || !user.is_active {
        return Err(ApiError::Unverified {
            user_id: parse_uuid(&user.id, "user id"),
        });
    }

    let token = create_token(&state.jwt_secret, &user)?;
    Ok(Json(LoginResponse {
        token,
        user: profile(&user),
    }))
}

/// Always answers with the same message whether or not the email is
/// registered, so the endpoint cannot be used for account enumeration.
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(req): Json<ResendVerificationRequest>,
) -> Result<Json<GenericMessage>, ApiError> {
    if let Some(user) = state.db.get_user_by_email(&req.email)? {
        if !user.email_verified {
            let token = Uuid::new_v4().to_string();
            let code = new_verification_code();
            let now = Utc::now();
            state.db.set_verification(
                &user.id,
                &token,
                now + Duration::hours(TOKEN_TTL_HOURS),
                &code,
                now + Duration::minutes(CODE_TTL_MINUTES),
            )?;

            if let Err(e) = state
                .mailer
                .send_verification(&user.email, &user.username, &code, &token)
            {
                warn!("Failed to resend verification email to {}: {e:#}", user.email);
            }
        }
    }

    Ok(Json(GenericMessage {
        message: "If your email is registered, a verification link has been sent.".into(),
    }))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<GenericMessage>, ApiError> {
    match state.db.verify_with_token(&token, Utc::now())? {
        TokenVerification::Verified => Ok(Json(GenericMessage {
            message: "Email verified successfully. You can now log in.".into(),
        })),
        TokenVerification::Expired => Err(ApiError::Validation(
            "Verification link has expired. Please request a new one.".into(),
        )),
        TokenVerification::Invalid => {
            Err(ApiError::Validation("Invalid verification link.".into()))
        }
    }
}

pub async fn verify_otp(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<Json<VerifyOtpResponse>, ApiError> {
    if req.code.is_empty() {
        return Err(ApiError::Validation("Verification code required".into()));
    }

    let id = user_id.to_string();
    let user = state
        .db
        .get_user_by_id(&id)?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    // Already verified: hand out a login token anyway so the OTP screen
    // can complete even after a stale retry.
    if user.email_verified {
        let token = create_token(&state.jwt_secret, &user)?;
        return Ok(Json(VerifyOtpResponse {
            message: "Email already verified".into(),
            token,
            user: profile(&user),
        }));
    }

    match state.db.verify_with_code(&id, &req.code, Utc::now())? {
        CodeVerification::Verified => {
            let user = state
                .db
                .get_user_by_id(&id)?
                .ok_or_else(|| anyhow::anyhow!("user vanished mid-verification"))?;
            let token = create_token(&state.jwt_secret, &user)?;
            Ok(Json(VerifyOtpResponse {
                message: "Email verified successfully".into(),
                token,
                user: profile(&user),
            }))
        }
        CodeVerification::Rejected => {
            Err(ApiError::Validation("Invalid or expired code".into()))
        }
        CodeVerification::UnknownUser => Err(ApiError::NotFound("User not found".into())),
    }
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserProfile>, ApiError> {
    let user = state
        .db
        .get_user_by_id(&claims.sub.to_string())?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(profile(&user)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UpdateProfileResponse>, ApiError> {
    let uid = claims.sub.to_string();
    state
        .db
        .get_user_by_id(&uid)?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    state
        .db
        .update_profile(&uid, req.first_name.as_deref(), req.last_name.as_deref())?;

    let user = state
        .db
        .get_user_by_id(&uid)?
        .ok_or_else(|| anyhow::anyhow!("user vanished mid-update"))?;

    Ok(Json(UpdateProfileResponse {
        success: true,
        user: profile(&user),
        message: "Profile updated successfully".into(),
    }))
}

pub async fn update_avatar(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateAvatarRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.avatar.is_empty() {
        return Err(ApiError::Validation("Avatar image required".into()));
    }
    if !req.avatar.starts_with("data:image") {
        return Err(ApiError::Validation(
            "Invalid image format. A base64 data:image URI is required".into(),
        ));
    }
    if req.avatar.len() > MAX_AVATAR_BYTES {
        return Err(ApiError::Validation(
            "Image too large. Maximum size: 5MB".into(),
        ));
    }

    state
        .db
        .update_avatar(&claims.sub.to_string(), &req.avatar)?;

    Ok(Json(serde_json::json!({
        "success": true,
        "avatar": req.avatar,
        "message": "Avatar updated successfully"
    })))
}

pub(crate) fn create_token(secret: &str, user: &UserRow) -> anyhow::Result<String> {
    let claims = Claims {
        sub: parse_uuid(&user.id, "user id"),
        username: user.username.clone(),
        exp: (Utc::now() + Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub(crate) fn profile(user: &UserRow) -> UserProfile {
    UserProfile {
        id: parse_uuid(&user.id, "user id"),
        username: user.username.clone(),
        email: user.email.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        avatar: user.avatar.clone(),
        eco_points: user.eco_points,
        email_verified: user.email_verified,
        created_at: parse_created_at(&user.created_at, "user"),
    }
}

fn new_verification_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000))
}
