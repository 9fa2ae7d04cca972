use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use super::OptionalExt;
use crate::Database;
use crate::models::{UserRow, parse_timestamp};

/// Outcome of the email-link verification path.
#[derive(Debug, PartialEq, Eq)]
pub enum TokenVerification {
    Verified,
    Expired,
    /// Unknown or malformed token. Indistinguishable from "never existed"
    /// on the wire so the endpoint leaks nothing.
    Invalid,
}

/// Outcome of the OTP code verification path.
#[derive(Debug, PartialEq, Eq)]
pub enum CodeVerification {
    Verified,
    /// Wrong or expired code. The stored code is not consumed, so the
    /// user may retry until it expires.
    Rejected,
    UnknownUser,
}

/// Fields for a freshly registered user. Created inactive and
/// unverified; both verification channels are armed at creation.
pub struct NewUser<'a> {
    pub id: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub verification_token: &'a str,
    pub token_expires: DateTime<Utc>,
    pub verification_code: &'a str,
    pub code_expires: DateTime<Utc>,
}

impl Database {
    pub fn create_user(&self, user: &NewUser) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password, first_name, last_name,
                                    verification_token, verification_token_expires,
                                    verification_code, verification_code_expires)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    user.id,
                    user.username,
                    user.email,
                    user.password_hash,
                    user.first_name,
                    user.last_name,
                    user.verification_token,
                    user.token_expires.to_rfc3339(),
                    user.verification_code,
                    user.code_expires.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    /// Re-arm both verification channels (resend-verification flow).
    pub fn set_verification(
        &self,
        user_id: &str,
        token: &str,
        token_expires: DateTime<Utc>,
        code: &str,
        code_expires: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET verification_token = ?2, verification_token_expires = ?3,
                                  verification_code = ?4, verification_code_expires = ?5
                 WHERE id = ?1",
                rusqlite::params![
                    user_id,
                    token,
                    token_expires.to_rfc3339(),
                    code,
                    code_expires.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Email-link path: on success the user becomes verified and active
    /// in the same transaction and the token fields are cleared.
    pub fn verify_with_token(&self, token: &str, now: DateTime<Utc>) -> Result<TokenVerification> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let row: Option<(String, Option<String>)> = tx
                .query_row(
                    "SELECT id, verification_token_expires FROM users WHERE verification_token = ?1",
                    [token],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((user_id, expires)) = row else {
                return Ok(TokenVerification::Invalid);
            };

            let valid = expires
                .as_deref()
                .and_then(parse_timestamp)
                .is_some_and(|exp| now <= exp);
            if !valid {
                return Ok(TokenVerification::Expired);
            }

            tx.execute(
                "UPDATE users SET email_verified = 1, is_active = 1,
                                  verification_token = NULL, verification_token_expires = NULL
                 WHERE id = ?1",
                [&user_id],
            )?;
            tx.commit()?;
            Ok(TokenVerification::Verified)
        })
    }

    /// OTP path: matching, unexpired code verifies and activates the
    /// account atomically and clears the code. Failure mutates nothing.
    pub fn verify_with_code(
        &self,
        user_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<CodeVerification> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let row: Option<(Option<String>, Option<String>)> = tx
                .query_row(
                    "SELECT verification_code, verification_code_expires FROM users WHERE id = ?1",
                    [user_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((stored_code, expires)) = row else {
                return Ok(CodeVerification::UnknownUser);
            };

            let matches = stored_code.as_deref() == Some(code);
            let unexpired = expires
                .as_deref()
                .and_then(parse_timestamp)
                .is_some_and(|exp| now <= exp);
            if !(matches && unexpired) {
                return Ok(CodeVerification::Rejected);
            }

            tx.execute(
                "UPDATE users SET email_verified = 1, is_active = 1,
                                  verification_code = NULL, verification_code_expires = NULL
                 WHERE id = ?1",
                [user_id],
            )?;
            tx.commit()?;
            Ok(CodeVerification::Verified)
        })
    }

    /// Partial profile update: absent fields keep their current value.
    pub fn update_profile(
        &self,
        user_id: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET first_name = COALESCE(?2, first_name),
                                  last_name  = COALESCE(?3, last_name)
                 WHERE id = ?1",
                rusqlite::params![user_id, first_name, last_name],
            )?;
            Ok(())
        })
    }

    pub fn update_avatar(&self, user_id: &str, avatar: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET avatar = ?2 WHERE id = ?1",
                rusqlite::params![user_id, avatar],
            )?;
            Ok(())
        })
    }
}

fn query_user(conn: &Connection, filter: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, email, password, first_name, last_name, avatar, eco_points,
                is_active, email_verified, verification_token, verification_token_expires,
                verification_code, verification_code_expires, created_at
         FROM users WHERE {filter}"
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                first_name: row.get(4)?,
                last_name: row.get(5)?,
                avatar: row.get(6)?,
                eco_points: row.get(7)?,
                is_active: row.get(8)?,
                email_verified: row.get(9)?,
                verification_token: row.get(10)?,
                verification_token_expires: row.get(11)?,
                verification_code: row.get(12)?,
                verification_code_expires: row.get(13)?,
                created_at: row.get(14)?,
            })
        })
        .optional()?;

    Ok(row)
}
