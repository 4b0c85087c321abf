//! Submission pipeline
//!
//! resolve schema -> check uploads -> authorize + sanitize -> validate ->
//! write uploads -> deliver -> aggregate. Every stage before delivery short-circuits on
//! error; delivery failures are collected per channel.

use chrono::{DateTime, Local};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::audit;
use crate::config::Config;
use crate::error::FormError;
use crate::format::PAGE_URL_KEY;
use crate::loader::SchemaLoader;
use crate::schema::FormSchema;
use crate::uploads::{Attachment, PreparedUploads, UploadStore, UploadedFile};

pub mod authorize;
pub mod deliver;
pub mod outcome;
pub mod sanitize;
pub mod validate;

use deliver::Dispatcher;
use outcome::SubmissionOutcome;
use sanitize::{clean_text, clean_url};

/// Who sent a request, as far as the server can tell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMeta {
    pub ip: String,
    pub user_agent: String,
    /// Page the form was posted from: `_http_referer` field or `Referer` header
    pub referer: Option<String>,
}

impl Default for RequestMeta {
    fn default() -> Self {
        Self {
            ip: "unknown".to_string(),
            user_agent: "unknown".to_string(),
            referer: None,
        }
    }
}

/// An authorized, sanitized and validated submission ready for delivery
#[derive(Debug, Clone)]
pub struct Submission {
    pub schema: Arc<FormSchema>,
    pub data: Map<String, Value>,
    pub meta: RequestMeta,
    /// Absolute URL of the originating page, empty if unknown
    pub page_url: String,
    pub attachments: Vec<Attachment>,
    pub received_at: DateTime<Local>,
}

/// Absolute page URL from a referer.
///
/// Absolute http(s) referers are kept; relative ones are joined to the
/// public base URL.
#[must_use]
pub fn resolve_page_url(referer: Option<&str>, site_url: &str) -> String {
    let Some(raw) = referer.map(clean_text).filter(|r| !r.is_empty()) else {
        return String::new();
    };
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return clean_url(&raw);
    }
    let base = site_url.trim_end_matches('/');
    let path = raw.trim_start_matches('/');
    clean_url(&format!("{base}/{path}"))
}

pub struct Pipeline {
    config: Arc<Config>,
    loader: SchemaLoader,
    dispatcher: Dispatcher,
    uploads: UploadStore,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        loader: SchemaLoader,
        dispatcher: Dispatcher,
        uploads: UploadStore,
    ) -> Self {
        Self {
            config,
            loader,
            dispatcher,
            uploads,
        }
    }

    #[must_use]
    pub fn loader(&self) -> &SchemaLoader {
        &self.loader
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one submission through every stage.
    ///
    /// # Errors
    ///
    /// Any stage failure, or [`FormError::Send`] when no enabled channel
    /// delivered.
    #[tracing::instrument(skip_all, fields(form = identifier, ip = %meta.ip))]
    pub async fn submit(
        &self,
        identifier: &str,
        raw: Map<String, Value>,
        meta: RequestMeta,
        files: &[UploadedFile],
    ) -> Result<SubmissionOutcome, FormError> {
        let schema = self.loader.resolve(identifier).await?;

        let (mut data, uploads) = match self.check(&schema, raw, &meta, files) {
            Ok((data, uploads)) if !uploads.is_empty() => {
                self.uploads.write(&uploads).await.map(|()| (data, uploads))
            }
            other => other,
        }
        .inspect_err(|e| audit::rejected(schema.id, e, &meta))?;

        let page_url = resolve_page_url(meta.referer.as_deref(), &self.config.site_url);
        if !page_url.is_empty() {
            data.insert(PAGE_URL_KEY.to_string(), Value::String(page_url.clone()));
        }

        let submission = Submission {
            schema: schema.clone(),
            data,
            meta,
            page_url,
            attachments: uploads.attachments,
            received_at: Local::now(),
        };
        let results = self.dispatcher.deliver(&submission).await;
        audit::submission(schema.id, results.any_success(), &submission.meta);

        outcome::aggregate(results)
    }

    /// Uploads, authorization and validation. Nothing is written to disk
    /// until all of them pass.
    fn check<'a>(
        &self,
        schema: &FormSchema,
        mut raw: Map<String, Value>,
        meta: &RequestMeta,
        files: &'a [UploadedFile],
    ) -> Result<(Map<String, Value>, PreparedUploads<'a>), FormError> {
        let mut uploads = PreparedUploads::default();
        if files.iter().any(|f| !f.file_name.is_empty()) {
            uploads = self.uploads.prepare(schema, files)?;
            raw.extend(std::mem::take(&mut uploads.data_updates));
        }

        let extra = self.config.extra_allowed_fields(&schema.slug);
        let data = authorize::filter(&raw, schema, &extra, meta)?;

        if !schema.accept_any_fields {
            validate::validate(&data, schema)?;
        }
        Ok((data, uploads))
    }
}
