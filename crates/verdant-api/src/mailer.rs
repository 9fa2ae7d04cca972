use anyhow::Result;
use tracing::info;

/// Outbound verification mail. Real SMTP delivery is an external
/// collaborator; the server only needs a seam it can call. Delivery
/// failure must never fail the surrounding request — callers log and
/// continue.
pub trait Mailer: Send + Sync {
    fn send_verification(&self, email: &str, username: &str, code: &str, token: &str)
    -> Result<()>;
}

/// Default mailer: renders the message into the logs. Good enough for
/// development and for clients polling the OTP screen.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_verification(
        &self,
        email: &str,
        username: &str,
        code: &str,
        token: &str,
    ) -> Result<()> {
        info!(
            "Verification mail for {} <{}>: code {} / link /auth/verify-email/{}",
            username, email, code, token
        );
        Ok(())
    }
}
