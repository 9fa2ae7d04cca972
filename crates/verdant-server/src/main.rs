use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use verdant_api::auth::{self, AppState, AppStateInner};
use verdant_api::mailer::LogMailer;
use verdant_api::middleware::require_auth;
use verdant_api::{catalog, groups, posts, scores};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "verdant=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("VERDANT_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("VERDANT_DB_PATH").unwrap_or_else(|_| "verdant.db".into());
    let host = std::env::var("VERDANT_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("VERDANT_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = verdant_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        mailer: Arc::new(LogMailer),
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/resend-verification", post(auth::resend_verification))
        .route("/auth/verify-email/{token}", get(auth::verify_email))
        .route("/auth/verify-otp/{user_id}", post(auth::verify_otp))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/users/me", get(auth::me).put(auth::update_profile))
        .route("/users/me/avatar", post(auth::update_avatar))
        .route("/groups", post(groups::create_group))
        .route("/groups/my_groups", get(groups::my_groups))
        .route("/groups/{group_id}/join", post(groups::join))
        .route("/groups/{group_id}/add_member", post(groups::add_member))
        .route("/groups/{group_id}/remove_member", post(groups::remove_member))
        .route("/groups/{group_id}/change_role", post(groups::change_role))
        .route("/posts", get(posts::list_posts))
        .route("/posts", post(posts::create_post))
        .route("/posts/{post_id}/comments", post(posts::create_comment))
        .route("/posts/{post_id}/toggle_like", post(posts::toggle_like))
        .route("/posts/{post_id}/add_reaction", post(posts::add_reaction))
        .route("/posts/{post_id}/reactions", get(posts::list_reactions))
        .route(
            "/posts/{post_id}/objects",
            get(posts::list_objects).post(posts::attach_object),
        )
        .route("/user/update-points", post(scores::update_points))
        .route("/leaderboard", get(scores::leaderboard))
        .route("/quizzes", get(catalog::list_quizzes))
        .route("/badges", get(catalog::list_badges))
        .route("/badges/mine", get(catalog::my_badges))
        .route("/badges/{badge_id}/award", post(catalog::award_badge))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Verdant server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
