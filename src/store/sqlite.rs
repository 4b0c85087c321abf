use super::{FormQuery, FormStore, FormSummary, SubmissionRecord};
use crate::error::StoreError;
use crate::schema::FormSchema;
use async_trait::async_trait;
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
};
use std::str::FromStr;

const FORMS_TABLE: &str = "CREATE TABLE IF NOT EXISTS forms (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        slug TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        definition TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )";

const SUBMISSIONS_TABLE: &str = "CREATE TABLE IF NOT EXISTS submissions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        form_id INTEGER NOT NULL,
        form_title TEXT NOT NULL,
        title TEXT NOT NULL,
        data TEXT NOT NULL,
        ip TEXT NOT NULL,
        user_agent TEXT NOT NULL,
        page_url TEXT NOT NULL,
        submitted_at TEXT NOT NULL
    )";

const SUBMISSIONS_FORM_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS submissions_form ON submissions(form_id)";

#[derive(Clone)]
pub struct SqliteFormStore {
    pool: SqlitePool,
}

impl SqliteFormStore {
    #[tracing::instrument(skip_all)]
    /// Create a new SQLite form store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)?.create_if_missing(true);

        // every connection to :memory: opens its own empty database
        let max_connections = if path.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::query(FORMS_TABLE).execute(&pool).await?;
        sqlx::query(SUBMISSIONS_TABLE).execute(&pool).await?;
        sqlx::query(SUBMISSIONS_FORM_INDEX).execute(&pool).await?;

        Ok(Self { pool })
    }

    fn decode_form(row: &SqliteRow) -> Result<FormSchema, StoreError> {
        let definition: String = row.try_get("definition")?;
        let mut schema: FormSchema = serde_json::from_str(&definition)?;
        schema.id = row.try_get("id")?;
        schema.slug = row.try_get("slug")?;
        schema.title = row.try_get("title")?;
        Ok(schema)
    }

    fn decode_submission(row: &SqliteRow) -> Result<SubmissionRecord, StoreError> {
        let data: String = row.try_get("data")?;
        Ok(SubmissionRecord {
            id: row.try_get("id")?,
            form_id: row.try_get("form_id")?,
            form_title: row.try_get("form_title")?,
            title: row.try_get("title")?,
            data: serde_json::from_str(&data)?,
            ip: row.try_get("ip")?,
            user_agent: row.try_get("user_agent")?,
            page_url: row.try_get("page_url")?,
            submitted_at: row.try_get("submitted_at")?,
        })
    }
}

fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl FormStore for SqliteFormStore {
    #[tracing::instrument(skip_all)]
    async fn get_form_by_slug(&self, slug: &str) -> Result<Option<FormSchema>, StoreError> {
        let row = sqlx::query("SELECT id, slug, title, definition FROM forms WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode_form).transpose()
    }

    #[tracing::instrument(skip_all)]
    async fn get_form_by_id(&self, id: i64) -> Result<Option<FormSchema>, StoreError> {
        let row = sqlx::query("SELECT id, slug, title, definition FROM forms WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode_form).transpose()
    }

    #[tracing::instrument(skip_all)]
    async fn list_forms(&self, query: &FormQuery) -> Result<(Vec<FormSummary>, u64), StoreError> {
        let pattern = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map_or_else(|| "%".to_string(), like_pattern);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM forms WHERE title LIKE ?1 ESCAPE '\\' OR slug LIKE ?1 ESCAPE '\\'",
        )
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(
            "SELECT id, slug, title FROM forms \
             WHERE title LIKE ?1 ESCAPE '\\' OR slug LIKE ?1 ESCAPE '\\' \
             ORDER BY title, id LIMIT ?2 OFFSET ?3",
        )
        .bind(&pattern)
        .bind(i64::from(query.per_page))
        .bind(i64::try_from(query.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let mut forms = Vec::with_capacity(rows.len());
        for row in rows {
            forms.push(FormSummary {
                id: row.try_get("id")?,
                slug: row.try_get("slug")?,
                title: row.try_get("title")?,
            });
        }
        Ok((forms, u64::try_from(total).unwrap_or(0)))
    }

    #[tracing::instrument(skip_all)]
    async fn save_form(&self, schema: &FormSchema) -> Result<i64, StoreError> {
        let definition = serde_json::to_string(schema)?;
        let now = chrono::Utc::now().timestamp();

        let clash: Option<i64> =
            sqlx::query_scalar("SELECT id FROM forms WHERE slug = ? AND id != ?")
                .bind(&schema.slug)
                .bind(schema.id)
                .fetch_optional(&self.pool)
                .await?;
        if clash.is_some() {
            return Err(StoreError::DuplicateSlug(schema.slug.clone()));
        }

        if schema.id > 0 {
            let updated = sqlx::query(
                "UPDATE forms SET slug = ?, title = ?, definition = ?, updated_at = ? WHERE id = ?",
            )
            .bind(&schema.slug)
            .bind(&schema.title)
            .bind(&definition)
            .bind(now)
            .bind(schema.id)
            .execute(&self.pool)
            .await?;
            if updated.rows_affected() > 0 {
                return Ok(schema.id);
            }
        }

        let inserted = sqlx::query(
            "INSERT INTO forms (slug, title, definition, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&schema.slug)
        .bind(&schema.title)
        .bind(&definition)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(inserted.last_insert_rowid())
    }

    #[tracing::instrument(skip_all)]
    async fn delete_form(&self, id: i64) -> Result<bool, StoreError> {
        let deleted = sqlx::query("DELETE FROM forms WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected() > 0)
    }

    #[tracing::instrument(skip_all)]
    async fn store_submission(&self, record: &SubmissionRecord) -> Result<i64, StoreError> {
        let data = serde_json::to_string(&record.data)?;
        let inserted = sqlx::query(
            "INSERT INTO submissions \
             (form_id, form_title, title, data, ip, user_agent, page_url, submitted_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.form_id)
        .bind(&record.form_title)
        .bind(&record.title)
        .bind(&data)
        .bind(&record.ip)
        .bind(&record.user_agent)
        .bind(&record.page_url)
        .bind(&record.submitted_at)
        .execute(&self.pool)
        .await?;
        Ok(inserted.last_insert_rowid())
    }

    #[tracing::instrument(skip_all)]
    async fn list_submissions(&self, form_id: i64) -> Result<Vec<SubmissionRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, form_id, form_title, title, data, ip, user_agent, page_url, submitted_at \
             FROM submissions WHERE form_id = ? ORDER BY id",
        )
        .bind(form_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::decode_submission).collect()
    }
}
