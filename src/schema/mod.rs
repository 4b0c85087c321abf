//! Form schemas
//!
//! A schema is the per-form configuration record: identity, delivery
//! settings for each channel, and the ordered field definitions.

mod field;

pub use field::{FieldDefinition, FieldKind, FileRules, RawField, decode_fields};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::pipeline::sanitize::sanitize_key;

/// Slug of the form created by `bootstrap`
pub const DEFAULT_FORM_SLUG: &str = "contact-form";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub enabled: bool,
    /// Comma-separated recipient addresses
    pub recipients: String,
    pub bcc: Option<String>,
    pub subject: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub enabled: bool,
    pub bot_token: String,
    /// Comma-separated chat ids
    pub chat_ids: String,
    /// Message template with placeholders; the built-in layout is used when empty
    pub template: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsSettings {
    pub enabled: bool,
    pub spreadsheet_id: String,
    pub sheet_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormSchema {
    #[serde(default)]
    pub id: i64,
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub email: EmailSettings,
    #[serde(default)]
    pub telegram: TelegramSettings,
    #[serde(default)]
    pub sheets: SheetsSettings,
    #[serde(default)]
    pub save_to_admin: bool,
    /// Skip field authorization and validation; values are still sanitized
    #[serde(default)]
    pub accept_any_fields: bool,
    #[serde(default, deserialize_with = "field::deserialize_fields")]
    pub fields: Vec<FieldDefinition>,
}

impl FormSchema {
    /// Decode a schema from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid schema.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(text)?)
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    #[must_use]
    pub fn has_file_fields(&self) -> bool {
        self.fields
            .iter()
            .any(|f| matches!(f.kind, FieldKind::File(_)))
    }

    /// Email delivery is switched on but cannot possibly succeed
    #[must_use]
    pub fn email_misconfigured(&self) -> bool {
        self.email.enabled
            && (self.email.recipients.trim().is_empty() || self.email.subject.trim().is_empty())
    }

    /// Normalize a schema before it is written.
    ///
    /// Slug is reduced to an identifier-safe token and every admin-supplied
    /// pattern must compile.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty slug or an invalid pattern.
    pub fn prepare_for_save(mut self) -> Result<Self, SchemaError> {
        self.slug = sanitize_key(&self.slug);
        if self.slug.is_empty() {
            return Err(SchemaError::EmptySlug);
        }
        if self.title.trim().is_empty() {
            self.title = self.slug.clone();
        }
        check_patterns(&self.fields)?;
        Ok(self)
    }

    /// The contact form created on first run
    #[must_use]
    pub fn default_contact_form(recipient: &str) -> Self {
        Self {
            id: 0,
            slug: DEFAULT_FORM_SLUG.to_string(),
            title: "Contact Form".to_string(),
            email: EmailSettings {
                enabled: true,
                recipients: recipient.to_string(),
                bcc: None,
                subject: "New contact form submission".to_string(),
            },
            fields: vec![
                FieldDefinition::new("name", FieldKind::Text { pattern: None })
                    .with_label("Name")
                    .required(),
                FieldDefinition::new("email", FieldKind::Email)
                    .with_label("Email")
                    .required(),
                FieldDefinition::new("phone", FieldKind::Tel { pattern: None }).with_label("Phone"),
                FieldDefinition::new("message", FieldKind::Textarea)
                    .with_label("Message")
                    .required(),
            ],
            ..Self::default()
        }
    }
}

fn check_patterns(fields: &[FieldDefinition]) -> Result<(), SchemaError> {
    for field in fields {
        if let Some(pattern) = field.kind.pattern().filter(|p| !p.is_empty()) {
            Regex::new(pattern).map_err(|source| SchemaError::InvalidPattern {
                field: field.name.clone(),
                source,
            })?;
        }
        check_patterns(field.nested_fields())?;
    }
    Ok(())
}
