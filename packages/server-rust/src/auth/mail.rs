//! Mail senders that do not leave the process.

use async_trait::async_trait;
use gaekit_core::{MailMessage, MailSender, RequestContext};
use parking_lot::Mutex;
use tracing::info;

/// Writes each message to the log instead of delivering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailSender;

#[async_trait]
impl MailSender for LogMailSender {
    async fn send(&self, ctx: &RequestContext, message: MailMessage) -> anyhow::Result<()> {
        info!(
            scope_id = ctx.scope.id(),
            to = %message.to,
            subject = %message.subject,
            html = %message.html,
            "mail not delivered: log mail sender"
        );
        Ok(())
    }
}

/// Keeps sent messages for inspection.
#[derive(Debug, Default)]
pub struct Outbox {
    sent: Mutex<Vec<MailMessage>>,
}

impl Outbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MailSender for Outbox {
    async fn send(&self, _ctx: &RequestContext, message: MailMessage) -> anyhow::Result<()> {
        self.sent.lock().push(message);
        Ok(())
    }
}
