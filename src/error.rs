//! Domain error types for the form relay
//!
//! Pipeline errors carry a machine-readable code and an HTTP status so the
//! request boundary can render them without inspecting internals. Channel
//! errors never escape the delivery stage; they are recorded as strings in
//! the delivery results.

use thiserror::Error;

use crate::pipeline::deliver::DeliveryResults;

/// Errors that stop a submission before or after delivery
#[derive(Error, Debug)]
pub enum FormError {
    #[error("Form not found")]
    NotFound(String),

    #[error("Form is not configured correctly")]
    Misconfigured(String),

    #[error("Unauthorized fields detected: {}", .unauthorized.join(", "))]
    UnauthorizedFields {
        unauthorized: Vec<String>,
        allowed: Vec<String>,
    },

    #[error("{0}")]
    Validation(String),

    #[error("Too many requests. Please wait a few seconds.")]
    RateLimited,

    #[error("Spam detected")]
    Spam,

    #[error("Invalid form data")]
    InvalidData,

    #[error("Too many form fields submitted")]
    TooManyFields,

    #[error("Form data is too large")]
    DataTooLarge,

    #[error("Failed to deliver form submission")]
    Send(Box<DeliveryResults>),

    #[error("{0}")]
    Upload(String),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl FormError {
    /// Machine-readable error code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            FormError::NotFound(_) => "form_not_found",
            FormError::Misconfigured(_) => "form_config_error",
            FormError::UnauthorizedFields { .. } => "unauthorized_fields",
            FormError::Validation(_) => "validation_error",
            FormError::RateLimited => "rate_limited",
            FormError::Spam => "spam_detected",
            FormError::InvalidData => "invalid_data",
            FormError::TooManyFields => "too_many_fields",
            FormError::DataTooLarge => "data_too_large",
            FormError::Send(_) => "send_error",
            FormError::Upload(_) => "upload_error",
            FormError::Schema(_) => "schema_error",
            FormError::Store(_) => "storage_error",
        }
    }

    /// HTTP status for this error
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            FormError::NotFound(_) => 404,
            FormError::RateLimited => 429,
            FormError::UnauthorizedFields { .. }
            | FormError::Validation(_)
            | FormError::Spam
            | FormError::InvalidData
            | FormError::TooManyFields
            | FormError::DataTooLarge
            | FormError::Schema(_) => 400,
            FormError::Misconfigured(_)
            | FormError::Send(_)
            | FormError::Upload(_)
            | FormError::Store(_) => 500,
        }
    }

    /// Message safe to show to the submitter
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            FormError::Store(_) => "Service temporarily unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

/// Per-channel delivery failures, captured into the delivery results
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Recipient list is empty or invalid")]
    NoRecipients,

    #[error("Failed to send email")]
    EmailSend(String),

    #[error("Telegram bot token or chat IDs not configured")]
    TelegramConfig,

    #[error("Failed to send to any Telegram chat: {0}")]
    TelegramSend(String),

    #[error("Google Sheets spreadsheet ID not configured")]
    SheetsConfig,

    #[error("{0}")]
    SheetsAuth(String),

    #[error("Failed to send request to Google Sheets: {0}")]
    SheetsRequest(String),

    #[error("Google Sheets API error: {0}")]
    SheetsApi(String),

    #[error("Failed to save submission: {0}")]
    AdminStorage(String),
}

impl ChannelError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ChannelError::InvalidEmail(_) => "invalid_email",
            ChannelError::NoRecipients => "no_recipients",
            ChannelError::EmailSend(_) => "email_send_error",
            ChannelError::TelegramConfig => "telegram_config_error",
            ChannelError::TelegramSend(_) => "telegram_send_error",
            ChannelError::SheetsConfig => "sheets_config_error",
            ChannelError::SheetsAuth(_) => "sheets_auth_error",
            ChannelError::SheetsRequest(_) => "sheets_request_error",
            ChannelError::SheetsApi(_) => "sheets_api_error",
            ChannelError::AdminStorage(_) => "admin_storage_error",
        }
    }
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Form slug must not be empty")]
    EmptySlug,

    #[error("Invalid pattern for field '{field}': {source}")]
    InvalidPattern {
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid form definition: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Slug already in use: {0}")]
    DuplicateSlug(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unresolved placeholder: {0}")]
    Placeholder(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
