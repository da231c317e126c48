//! Mail delivery seam, used only for the master-key reminder hint.
//!
//! Sending the hint in email trades some security for usability; that is
//! a product decision made upstream. The hint is the only user-entered
//! value that ever leaves the core in plaintext.

use async_trait::async_trait;

use keyfort_core::KeyfortResult;

#[derive(Debug, Clone)]
pub struct ReminderMail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait ReminderMailer: Send + Sync {
    async fn send(&self, mail: ReminderMail) -> KeyfortResult<()>;
}

/// Drops mail on the floor; for deployments without a mail provider.
#[derive(Debug, Default)]
pub struct NoopMailer;

#[async_trait]
impl ReminderMailer for NoopMailer {
    async fn send(&self, mail: ReminderMail) -> KeyfortResult<()> {
        tracing::debug!(to = %mail.to, "reminder mail discarded (no mailer configured)");
        Ok(())
    }
}
