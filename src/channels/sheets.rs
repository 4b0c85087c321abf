//! Google Sheets channel
//!
//! Exchanges the configured refresh token for an access token on every
//! delivery, then appends one row: timestamp, form title, and the submitted
//! values in submission order.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use url::Url;

use crate::config::SheetsConfig;
use crate::error::ChannelError;
use crate::pipeline::Submission;
use crate::pipeline::deliver::{ChannelKind, DeliveryChannel};

const DEFAULT_SHEET: &str = "Sheet1";
const ROW_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
}

#[derive(Deserialize)]
struct AppendResponse {
    error: Option<ApiError>,
}

pub struct SheetsChannel {
    client: reqwest::Client,
    config: SheetsConfig,
}

/// Cell value for one submitted value; nested values are JSON-encoded
fn cell(value: &Value) -> Value {
    match value {
        Value::Null => Value::String(String::new()),
        Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
        other => other.clone(),
    }
}

/// Row appended for a submission
#[must_use]
pub fn build_row(submission: &Submission) -> Vec<Value> {
    let mut row = vec![
        Value::String(submission.received_at.format(ROW_TIMESTAMP_FORMAT).to_string()),
        Value::String(submission.schema.title.clone()),
    ];
    row.extend(submission.data.values().map(cell));
    row
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

impl SheetsChannel {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &SheetsConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn append_url(&self, spreadsheet_id: &str, sheet: &str) -> Result<Url, ChannelError> {
        let mut url = Url::parse(&self.config.api_base)
            .map_err(|e| ChannelError::SheetsRequest(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| ChannelError::SheetsRequest("invalid API base URL".into()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", spreadsheet_id, "values"])
            .push(&format!("{sheet}!A:Z:append"));
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");
        Ok(url)
    }

    #[tracing::instrument(skip_all)]
    async fn access_token(&self) -> Result<String, ChannelError> {
        let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
            present(self.config.client_id.as_ref()),
            present(self.config.client_secret.as_ref()),
            present(self.config.refresh_token.as_ref()),
        ) else {
            return Err(ChannelError::SheetsAuth(
                "Google Sheets authentication not configured".into(),
            ));
        };

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| ChannelError::SheetsAuth(format!("Failed to get access token: {e}")))?;

        let body: Option<TokenResponse> = response.json().await.ok();
        match body {
            Some(TokenResponse {
                access_token: Some(token),
                ..
            }) if !token.is_empty() => Ok(token),
            other => Err(ChannelError::SheetsAuth(format!(
                "Failed to get access token: {}",
                other
                    .and_then(|b| b.error_description)
                    .unwrap_or_else(|| "Unknown error".into())
            ))),
        }
    }
}

#[async_trait]
impl DeliveryChannel for SheetsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::GoogleSheets
    }

    #[tracing::instrument(skip_all, fields(form = %submission.schema.slug))]
    async fn deliver(&self, submission: &Submission) -> Result<(), ChannelError> {
        let settings = &submission.schema.sheets;
        let spreadsheet_id = settings.spreadsheet_id.trim();
        if spreadsheet_id.is_empty() {
            return Err(ChannelError::SheetsConfig);
        }

        let token = self.access_token().await?;
        let sheet = settings
            .sheet_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SHEET);
        let url = self.append_url(spreadsheet_id, sheet)?;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "values": [build_row(submission)] }))
            .send()
            .await
            .map_err(|e| ChannelError::SheetsRequest(e.to_string()))?;

        let status = response.status();
        let body: Option<AppendResponse> = response.json().await.ok();
        match body {
            Some(AppendResponse { error: None }) if status.is_success() => Ok(()),
            Some(AppendResponse { error: Some(err) }) => Err(ChannelError::SheetsApi(
                err.message.unwrap_or_else(|| "Unknown error".into()),
            )),
            _ if status.is_success() => Err(ChannelError::SheetsApi("Unknown error".into())),
            _ => Err(ChannelError::SheetsApi(format!("HTTP {status}"))),
        }
    }
}
