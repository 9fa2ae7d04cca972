use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                          TEXT PRIMARY KEY,
            username                    TEXT NOT NULL UNIQUE,
            email                       TEXT NOT NULL UNIQUE,
            password                    TEXT NOT NULL,
            first_name                  TEXT NOT NULL DEFAULT '',
            last_name                   TEXT NOT NULL DEFAULT '',
            avatar                      TEXT,
            eco_points                  INTEGER NOT NULL DEFAULT 0 CHECK (eco_points >= 0),
            is_active                   INTEGER NOT NULL DEFAULT 0,
            email_verified              INTEGER NOT NULL DEFAULT 0,
            verification_token         TEXT UNIQUE,
            verification_token_expires TEXT,
            verification_code          TEXT,
            verification_code_expires  TEXT,
            created_at                  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS groups (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            description TEXT,
            owner_id    TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS group_memberships (
            user_id     TEXT NOT NULL REFERENCES users(id),
            group_id    TEXT NOT NULL REFERENCES groups(id),
            role        TEXT NOT NULL DEFAULT 'student',
            joined_at   TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (user_id, group_id)
        );

        CREATE INDEX IF NOT EXISTS idx_memberships_group
            ON group_memberships(group_id);

        CREATE TABLE IF NOT EXISTS posts (
            id          TEXT PRIMARY KEY,
            group_id    TEXT NOT NULL REFERENCES groups(id),
            author_id   TEXT NOT NULL REFERENCES users(id),
            image_url   TEXT,
            caption     TEXT,
            latitude    REAL,
            longitude   REAL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_posts_group
            ON posts(group_id, created_at);

        CREATE TABLE IF NOT EXISTS comments (
            id          TEXT PRIMARY KEY,
            post_id     TEXT NOT NULL REFERENCES posts(id),
            author_id   TEXT NOT NULL REFERENCES users(id),
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_comments_post
            ON comments(post_id, created_at);

        CREATE TABLE IF NOT EXISTS detected_objects (
            id           TEXT PRIMARY KEY,
            post_id      TEXT NOT NULL REFERENCES posts(id),
            label        TEXT NOT NULL,
            description  TEXT NOT NULL DEFAULT '',
            recycle_tips TEXT NOT NULL DEFAULT '',
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_detected_objects_post
            ON detected_objects(post_id);

        CREATE TABLE IF NOT EXISTS post_likes (
            post_id     TEXT NOT NULL REFERENCES posts(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (post_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS post_reactions (
            post_id     TEXT NOT NULL REFERENCES posts(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            reaction    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (post_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS game_scores (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            game_id     TEXT NOT NULL,
            score       INTEGER NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_scores_user_game
            ON game_scores(user_id, game_id, score);

        CREATE INDEX IF NOT EXISTS idx_scores_game
            ON game_scores(game_id, score);

        CREATE TABLE IF NOT EXISTS badges (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            description TEXT NOT NULL,
            icon_url    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_badges (
            user_id     TEXT NOT NULL REFERENCES users(id),
            badge_id    TEXT NOT NULL REFERENCES badges(id),
            earned_at   TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (user_id, badge_id)
        );

        CREATE TABLE IF NOT EXISTS quizzes (
            id              TEXT PRIMARY KEY,
            question        TEXT NOT NULL,
            correct_answer  TEXT NOT NULL,
            options         TEXT NOT NULL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
