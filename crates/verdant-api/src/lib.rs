pub mod auth;
pub mod catalog;
pub mod error;
pub mod groups;
pub mod mailer;
pub mod middleware;
pub mod posts;
pub mod scores;

use tracing::warn;
use uuid::Uuid;

/// DB rows store ids as text; a corrupt id is logged and mapped to the
/// nil UUID rather than failing the whole response.
pub(crate) fn parse_uuid(s: &str, what: &str) -> Uuid {
    s.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, s, e);
        Uuid::default()
    })
}

pub(crate) fn parse_created_at(s: &str, what: &str) -> chrono::DateTime<chrono::Utc> {
    verdant_db::models::parse_timestamp(s).unwrap_or_else(|| {
        warn!("Corrupt created_at '{}' on {}", s, what);
        chrono::DateTime::default()
    })
}
