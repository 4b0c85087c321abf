//! Delivery channel implementations

use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::deliver::Dispatcher;
use crate::store::DynFormStore;

pub mod email;
pub mod sheets;
pub mod smtp;
pub mod storage;
pub mod telegram;

/// Dispatcher with email over SMTP, Telegram, Google Sheets and local storage.
///
/// # Errors
///
/// Returns an error if an HTTP client cannot be built.
pub fn standard_dispatcher(config: &Config, store: DynFormStore) -> Result<Dispatcher, reqwest::Error> {
    let mailer = Arc::new(smtp::SmtpMailer::new(&config.smtp));
    Ok(Dispatcher::new()
        .add_channel(Box::new(email::EmailChannel::new(mailer)))
        .add_channel(Box::new(telegram::TelegramChannel::new(&config.telegram)?))
        .add_channel(Box::new(sheets::SheetsChannel::new(&config.sheets)?))
        .add_channel(Box::new(storage::AdminStorageChannel::new(store))))
}
