//! Local persistence of submissions

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ChannelError;
use crate::format::display_value;
use crate::pipeline::Submission;
use crate::pipeline::deliver::{ChannelKind, DeliveryChannel};
use crate::store::{DynFormStore, SubmissionRecord};

const TITLE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";
const STORED_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct AdminStorageChannel {
    store: DynFormStore,
}

impl AdminStorageChannel {
    pub fn new(store: DynFormStore) -> Self {
        Self { store }
    }
}

/// Record stored for a submission
#[must_use]
pub fn build_record(submission: &Submission) -> SubmissionRecord {
    let schema = &submission.schema;
    let name = submission
        .data
        .get("name")
        .map(display_value)
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "Anonymous".to_string());
    SubmissionRecord {
        id: 0,
        form_id: schema.id,
        form_title: schema.title.clone(),
        title: format!(
            "{} - {name} - {}",
            schema.title,
            submission.received_at.format(TITLE_TIME_FORMAT)
        ),
        data: submission.data.clone(),
        ip: submission.meta.ip.clone(),
        user_agent: submission.meta.user_agent.clone(),
        page_url: submission.page_url.clone(),
        submitted_at: submission.received_at.format(STORED_TIME_FORMAT).to_string(),
    }
}

#[async_trait]
impl DeliveryChannel for AdminStorageChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::AdminStorage
    }

    async fn deliver(&self, submission: &Submission) -> Result<(), ChannelError> {
        let record = build_record(submission);
        let id = self
            .store
            .store_submission(&record)
            .await
            .map_err(|e| ChannelError::AdminStorage(e.to_string()))?;
        tracing::debug!(id, form_id = record.form_id, "submission stored");
        Ok(())
    }
}
