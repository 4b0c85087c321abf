//! Delivery fan-out
//!
//! Channels are attempted one after another. A failing channel is recorded
//! in its slot of [`DeliveryResults`] and never stops the remaining ones.

use serde::Serialize;
use std::fmt;

use super::Submission;
use crate::error::ChannelError;
use crate::schema::FormSchema;

/// The four delivery channels a form can enable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Email,
    Telegram,
    GoogleSheets,
    AdminStorage,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 4] = [
        ChannelKind::Email,
        ChannelKind::Telegram,
        ChannelKind::GoogleSheets,
        ChannelKind::AdminStorage,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Telegram => "telegram",
            ChannelKind::GoogleSheets => "google_sheets",
            ChannelKind::AdminStorage => "admin_storage",
        }
    }

    /// Whether the schema switches this channel on and names a target for it.
    ///
    /// A channel switched on without any target is recorded as disabled.
    #[must_use]
    pub fn enabled_for(self, schema: &FormSchema) -> bool {
        match self {
            ChannelKind::Email => {
                schema.email.enabled
                    && !schema.email.recipients.is_empty()
                    && !schema.email.subject.is_empty()
            }
            ChannelKind::Telegram => {
                schema.telegram.enabled
                    && !schema.telegram.bot_token.is_empty()
                    && !schema.telegram.chat_ids.is_empty()
            }
            ChannelKind::GoogleSheets => {
                schema.sheets.enabled && !schema.sheets.spreadsheet_id.is_empty()
            }
            ChannelKind::AdminStorage => schema.save_to_admin,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one channel attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub enabled: bool,
}

impl ChannelOutcome {
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn delivered() -> Self {
        Self {
            success: true,
            error: None,
            enabled: true,
        }
    }

    #[must_use]
    pub fn failed(error: &ChannelError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            enabled: true,
        }
    }

    /// Counts towards overall success only when the channel was enabled
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.enabled && self.success
    }
}

/// Fixed per-submission record of every channel's outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryResults {
    pub email: ChannelOutcome,
    pub telegram: ChannelOutcome,
    pub google_sheets: ChannelOutcome,
    pub admin_storage: ChannelOutcome,
}

impl DeliveryResults {
    #[must_use]
    pub fn get(&self, kind: ChannelKind) -> &ChannelOutcome {
        match kind {
            ChannelKind::Email => &self.email,
            ChannelKind::Telegram => &self.telegram,
            ChannelKind::GoogleSheets => &self.google_sheets,
            ChannelKind::AdminStorage => &self.admin_storage,
        }
    }

    pub fn set(&mut self, kind: ChannelKind, outcome: ChannelOutcome) {
        let slot = match kind {
            ChannelKind::Email => &mut self.email,
            ChannelKind::Telegram => &mut self.telegram,
            ChannelKind::GoogleSheets => &mut self.google_sheets,
            ChannelKind::AdminStorage => &mut self.admin_storage,
        };
        *slot = outcome;
    }

    /// At least one enabled channel delivered
    #[must_use]
    pub fn any_success(&self) -> bool {
        ChannelKind::ALL.iter().any(|k| self.get(*k).succeeded())
    }
}

/// One delivery mechanism
#[async_trait::async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Slot this channel reports into
    fn kind(&self) -> ChannelKind;

    /// Attempt delivery once; failures are returned, never retried
    async fn deliver(&self, submission: &Submission) -> Result<(), ChannelError>;
}

/// Ordered set of registered channels
pub struct Dispatcher {
    channels: Vec<Box<dyn DeliveryChannel>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    /// Register a channel
    pub fn add_channel(mut self, channel: Box<dyn DeliveryChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.kind().as_str()).collect()
    }

    /// Attempt every channel the schema enables and record each outcome.
    pub async fn deliver(&self, submission: &Submission) -> DeliveryResults {
        let mut results = DeliveryResults::default();
        for channel in &self.channels {
            let kind = channel.kind();
            if !kind.enabled_for(&submission.schema) {
                continue;
            }
            let outcome = match channel.deliver(submission).await {
                Ok(()) => {
                    tracing::debug!(channel = %kind, form = %submission.schema.slug, "delivered");
                    ChannelOutcome::delivered()
                }
                Err(err) => {
                    tracing::warn!(
                        channel = %kind,
                        form = %submission.schema.slug,
                        code = err.code(),
                        error = %err,
                        "delivery failed"
                    );
                    ChannelOutcome::failed(&err)
                }
            };
            results.set(kind, outcome);
        }
        results
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
