//! File upload handling
//!
//! Files arrive as multipart parts named after a `file` field of the schema.
//! Accepted files are written into the uploads directory; the field value
//! becomes the public URL (or a list of URLs) and the stored path is kept
//! for email attachments.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::FormError;
use crate::pipeline::validate::format_number;
use crate::schema::{FieldKind, FileRules, FormSchema};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One uploaded multipart part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// A stored file to attach to the notification email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: String,
}

/// Checked uploads of one submission, named but not yet written.
///
/// Field values already carry the final public URLs so the submission can
/// be validated before anything touches the disk.
#[derive(Debug, Default)]
pub struct PreparedUploads<'a> {
    pub data_updates: Map<String, Value>,
    pub attachments: Vec<Attachment>,
    /// File contents, in the same order as `attachments`
    pending: Vec<&'a [u8]>,
}

impl PreparedUploads<'_> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    base_url: String,
}

fn safe_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

fn extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

fn validation(message: String) -> FormError {
    FormError::Validation(message)
}

/// Check one field's files against its rules
fn check_rules(label: &str, rules: &FileRules, files: &[&UploadedFile]) -> Result<(), FormError> {
    if files.len() > rules.max_files {
        return Err(validation(format!(
            "Field '{label}' exceeds max files ({})",
            rules.max_files
        )));
    }
    for file in files {
        #[allow(clippy::cast_precision_loss)]
        let size_mb = file.bytes.len() as f64 / BYTES_PER_MB;
        if size_mb > rules.max_size_mb {
            return Err(validation(format!(
                "File too large for field '{label}' (max {} MB)",
                format_number(rules.max_size_mb)
            )));
        }
        if !rules.allowed_extensions.is_empty()
            && !rules
                .allowed_extensions
                .iter()
                .any(|e| *e == extension(&file.file_name))
        {
            return Err(validation(format!(
                "File type not allowed for field '{label}'"
            )));
        }
    }
    Ok(())
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.into(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Check the uploads of one submission against the schema rules and
    /// assign their stored names. Nothing is written.
    ///
    /// Parts for names that are not `file` fields of the schema, and parts
    /// without a file name, are ignored.
    ///
    /// # Errors
    ///
    /// `Validation` for rule violations.
    #[tracing::instrument(skip_all, fields(form = %schema.slug, files = files.len()))]
    pub fn prepare<'a>(
        &self,
        schema: &FormSchema,
        files: &'a [UploadedFile],
    ) -> Result<PreparedUploads<'a>, FormError> {
        let mut by_field: HashMap<&str, Vec<&UploadedFile>> = HashMap::new();
        for file in files.iter().filter(|f| !f.file_name.is_empty()) {
            by_field.entry(file.field.as_str()).or_default().push(file);
        }

        let mut prepared = PreparedUploads::default();
        for field in &schema.fields {
            let FieldKind::File(rules) = &field.kind else {
                continue;
            };
            let label = field.display_label();
            let field_files = by_field.remove(field.name.as_str()).unwrap_or_default();
            if field_files.is_empty() {
                if field.required {
                    return Err(validation(format!("Field '{label}' is required")));
                }
                continue;
            }
            check_rules(label, rules, &field_files)?;

            let mut urls = Vec::with_capacity(field_files.len());
            for file in field_files {
                let (url, attachment) = self.assign(file);
                urls.push(Value::String(url));
                prepared.pending.push(&file.bytes);
                prepared.attachments.push(attachment);
            }

            let value = if rules.multiple {
                Value::Array(urls)
            } else {
                urls.into_iter().next().unwrap_or_default()
            };
            prepared.data_updates.insert(field.name.clone(), value);
        }
        Ok(prepared)
    }

    /// Write prepared uploads into the uploads directory.
    ///
    /// On failure the files already written for this submission are removed.
    ///
    /// # Errors
    ///
    /// `Upload` if a file cannot be written.
    pub async fn write(&self, prepared: &PreparedUploads<'_>) -> Result<(), FormError> {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            tracing::error!(dir = %self.dir.display(), error = %e, "failed to create uploads directory");
            return Err(FormError::Upload("Failed to store uploaded file".to_string()));
        }
        let files = prepared.attachments.iter().zip(&prepared.pending);
        for (written, (attachment, bytes)) in files.enumerate() {
            if let Err(e) = tokio::fs::write(&attachment.path, bytes).await {
                tracing::error!(path = %attachment.path.display(), error = %e, "failed to store upload");
                for stale in &prepared.attachments[..written] {
                    if let Err(e) = tokio::fs::remove_file(&stale.path).await {
                        tracing::warn!(path = %stale.path.display(), error = %e, "failed to remove partial upload");
                    }
                }
                return Err(FormError::Upload(format!(
                    "Failed to store uploaded file '{}'",
                    attachment.file_name
                )));
            }
        }
        Ok(())
    }

    fn assign(&self, file: &UploadedFile) -> (String, Attachment) {
        let file_name = safe_file_name(&file.file_name);
        let stored_name = format!("{}-{file_name}", uuid::Uuid::new_v4());
        let content_type = file.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&file.file_name)
                .first_or_octet_stream()
                .to_string()
        });
        let url = format!("{}/{stored_name}", self.base_url.trim_end_matches('/'));
        (
            url,
            Attachment {
                path: self.dir.join(&stored_name),
                file_name,
                content_type,
            },
        )
    }
}
