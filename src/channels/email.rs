//! Email delivery channel

use async_trait::async_trait;
use smallvec::SmallVec;
use std::sync::Arc;
use thiserror::Error;

use crate::error::ChannelError;
use crate::format::html::email_body;
use crate::pipeline::Submission;
use crate::pipeline::deliver::{ChannelKind, DeliveryChannel};
use crate::pipeline::sanitize::is_email;
use crate::uploads::Attachment;

pub type Recipients = SmallVec<[String; 4]>;

/// A rendered notification ready for transport
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: Recipients,
    /// Blind copy; only ever sent as an envelope recipient
    pub bcc: Option<String>,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Error, Debug)]
pub enum MailError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out talking to mail relay")]
    Timeout,

    #[error("{command} rejected: {code} {text}")]
    Rejected {
        command: &'static str,
        code: u16,
        text: String,
    },

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Outbound mail transport
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

pub type DynMailer = Arc<dyn Mailer>;

/// Split a comma-separated recipient list.
///
/// Blank entries are skipped; any entry that is not an address fails the
/// whole list.
///
/// # Errors
///
/// `InvalidEmail` naming the first bad entry, `NoRecipients` if nothing is left.
pub fn parse_recipients(list: &str) -> Result<Recipients, ChannelError> {
    let mut recipients = Recipients::new();
    for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        if !is_email(entry) {
            return Err(ChannelError::InvalidEmail(entry.to_string()));
        }
        recipients.push(entry.to_string());
    }
    if recipients.is_empty() {
        return Err(ChannelError::NoRecipients);
    }
    Ok(recipients)
}

pub struct EmailChannel {
    mailer: DynMailer,
}

impl EmailChannel {
    pub fn new(mailer: DynMailer) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl DeliveryChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn deliver(&self, submission: &Submission) -> Result<(), ChannelError> {
        let settings = &submission.schema.email;
        let to = parse_recipients(&settings.recipients)?;
        let bcc = settings
            .bcc
            .as_deref()
            .map(str::trim)
            .filter(|b| is_email(b))
            .map(String::from);

        let email = OutgoingEmail {
            to,
            bcc,
            subject: settings.subject.clone(),
            html_body: email_body(&submission.schema, &submission.data, &submission.received_at),
            attachments: submission.attachments.clone(),
        };

        self.mailer.send(&email).await.map_err(|e| {
            tracing::warn!(form = %submission.schema.slug, error = %e, "mail relay failure");
            ChannelError::EmailSend(e.to_string())
        })
    }
}
