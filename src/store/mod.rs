//! Persistence of form schemas and stored submissions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::StoreError;
use crate::schema::FormSchema;

pub mod sqlite;

/// Public listing entry for a form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormSummary {
    pub id: i64,
    pub slug: String,
    pub title: String,
}

/// Paginated, searchable form listing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormQuery {
    /// 1-based page number
    pub page: u32,
    pub per_page: u32,
    /// Case-insensitive substring of title or slug
    pub search: Option<String>,
}

impl Default for FormQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
            search: None,
        }
    }
}

impl FormQuery {
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

/// Immutable copy of a delivered submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    #[serde(default)]
    pub id: i64,
    pub form_id: i64,
    pub form_title: String,
    /// "<form title> - <name|Anonymous> - <d.m.Y H:i:s>"
    pub title: String,
    pub data: Map<String, Value>,
    pub ip: String,
    pub user_agent: String,
    pub page_url: String,
    /// `Y-m-d H:i:s`, local time
    pub submitted_at: String,
}

#[async_trait]
pub trait FormStore: Send + Sync {
    /// Look up a form by slug
    async fn get_form_by_slug(&self, slug: &str) -> Result<Option<FormSchema>, StoreError>;

    /// Look up a form by numeric id
    async fn get_form_by_id(&self, id: i64) -> Result<Option<FormSchema>, StoreError>;

    /// One page of forms matching the query, and the total match count
    async fn list_forms(&self, query: &FormQuery) -> Result<(Vec<FormSummary>, u64), StoreError>;

    /// Insert (id 0) or update a form, returning its id
    async fn save_form(&self, schema: &FormSchema) -> Result<i64, StoreError>;

    /// Delete a form; returns false if it did not exist
    async fn delete_form(&self, id: i64) -> Result<bool, StoreError>;

    /// Persist a submission record, returning its id
    async fn store_submission(&self, record: &SubmissionRecord) -> Result<i64, StoreError>;

    /// Stored submissions of a form, oldest first
    async fn list_submissions(&self, form_id: i64) -> Result<Vec<SubmissionRecord>, StoreError>;
}

pub type DynFormStore = Arc<dyn FormStore>;

/// Create a store backend from a connection URI.
///
/// # Errors
///
/// Returns an error for unsupported schemes or if the database cannot be opened.
pub async fn open(uri: &str) -> anyhow::Result<DynFormStore> {
    if uri.starts_with("sqlite:") {
        Ok(Arc::new(sqlite::SqliteFormStore::new(uri).await?))
    } else {
        Err(anyhow::anyhow!("unsupported database URI: {uri}"))
    }
}
