//! Schema resolution with caching
//!
//! Submissions address a form by slug or numeric id. Resolved schemas are
//! cached under both spellings until the form is saved or deleted.

use std::sync::Arc;

use crate::cache::{DynSchemaCache, cache_key};
use crate::error::FormError;
use crate::schema::FormSchema;
use crate::store::DynFormStore;

#[derive(Clone)]
pub struct SchemaLoader {
    store: DynFormStore,
    cache: DynSchemaCache,
}

impl SchemaLoader {
    pub fn new(store: DynFormStore, cache: DynSchemaCache) -> Self {
        Self { store, cache }
    }

    #[must_use]
    pub fn store(&self) -> &DynFormStore {
        &self.store
    }

    /// Resolve a form for submission.
    ///
    /// Only schemas that can be delivered are cached, so a misconfigured
    /// form is re-read on every request until it is fixed.
    ///
    /// # Errors
    ///
    /// `NotFound` when no form matches, `Misconfigured` when email delivery
    /// is enabled without recipients or subject.
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, identifier: &str) -> Result<Arc<FormSchema>, FormError> {
        let key = cache_key(identifier);
        if let Some(schema) = self.cache.get(&key) {
            tracing::trace!(form = %schema.slug, "schema cache hit");
            return Ok(schema);
        }

        let schema = self
            .lookup(identifier)
            .await?
            .ok_or_else(|| FormError::NotFound(identifier.to_string()))?;

        if schema.email_misconfigured() {
            tracing::warn!(form = %schema.slug, "email enabled without recipients or subject");
            return Err(FormError::Misconfigured(schema.slug));
        }

        let schema = Arc::new(schema);
        self.cache.put(key, schema.clone());
        Ok(schema)
    }

    /// Look a form up in the store, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn lookup(&self, identifier: &str) -> Result<Option<FormSchema>, FormError> {
        if let Some(schema) = self.store.get_form_by_slug(identifier).await? {
            return Ok(Some(schema));
        }
        match identifier.parse::<i64>() {
            Ok(id) if id > 0 => Ok(self.store.get_form_by_id(id).await?),
            _ => Ok(None),
        }
    }

    /// Normalize and persist a schema, evicting every cached spelling.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid schema or a storage failure.
    #[tracing::instrument(skip_all, fields(form = %schema.slug))]
    pub async fn save(&self, schema: FormSchema) -> Result<i64, FormError> {
        let schema = schema.prepare_for_save()?;

        let previous_slug = if schema.id > 0 {
            self.store
                .get_form_by_id(schema.id)
                .await?
                .map(|old| old.slug)
        } else {
            None
        };

        let id = self.store.save_form(&schema).await?;

        if let Some(old) = previous_slug {
            self.invalidate(&old);
        }
        self.invalidate(&schema.slug);
        self.invalidate(&id.to_string());

        tracing::info!(id, "form saved");
        Ok(id)
    }

    /// Delete a form by slug or id.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, identifier: &str) -> Result<bool, FormError> {
        let Some(schema) = self.lookup(identifier).await? else {
            return Ok(false);
        };
        let deleted = self.store.delete_form(schema.id).await?;
        self.invalidate(&schema.slug);
        self.invalidate(&schema.id.to_string());
        self.invalidate(identifier);
        Ok(deleted)
    }

    /// Evict the cache entry for one identifier
    pub fn invalidate(&self, identifier: &str) {
        self.cache.remove(&cache_key(identifier));
    }
}
