//! Administrative operations behind the command line

use crate::loader::SchemaLoader;
use crate::prelude::*;
use crate::schema::{DEFAULT_FORM_SLUG, FormSchema};
use crate::store::{FormQuery, FormSummary, SubmissionRecord};

/// Create the default contact form unless it already exists.
///
/// Returns the id of the new form, or `None` if nothing was created.
pub async fn bootstrap(loader: &SchemaLoader, recipient: &str) -> Result<Option<i64>> {
    if loader.lookup(DEFAULT_FORM_SLUG).await?.is_some() {
        return Ok(None);
    }
    let id = loader
        .save(FormSchema::default_contact_form(recipient))
        .await?;
    Ok(Some(id))
}

/// Create or replace a form from its JSON definition.
///
/// A definition without an id replaces the form with the same slug.
pub async fn import_form(loader: &SchemaLoader, json: &str) -> Result<i64> {
    let mut schema = FormSchema::from_json(json)?;
    if schema.id == 0 {
        if let Some(existing) = loader.lookup(&schema.slug).await? {
            schema.id = existing.id;
        }
    }
    Ok(loader.save(schema).await?)
}

/// Every form matching `search`, walking all pages
pub async fn list_forms(loader: &SchemaLoader, search: Option<String>) -> Result<Vec<FormSummary>> {
    let mut query = FormQuery {
        page: 1,
        per_page: 100,
        search,
    };
    let mut forms = Vec::new();
    loop {
        let (page, total) = loader.store().list_forms(&query).await?;
        let done = page.is_empty() || forms.len() + page.len() >= usize::try_from(total)?;
        forms.extend(page);
        if done {
            return Ok(forms);
        }
        query.page += 1;
    }
}

/// Stored submissions of a form, by slug or id
pub async fn submissions(loader: &SchemaLoader, identifier: &str) -> Result<Vec<SubmissionRecord>> {
    let Some(schema) = loader.lookup(identifier).await? else {
        anyhow::bail!("form not found: {identifier}");
    };
    Ok(loader.store().list_submissions(schema.id).await?)
}
