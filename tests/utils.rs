#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::Request;
use formrelay::cache::MemoryCache;
use formrelay::channels::email::{EmailChannel, MailError, Mailer, OutgoingEmail};
use formrelay::channels::storage::AdminStorageChannel;
use formrelay::config::Config;
use formrelay::filters::factory::{GuardDeps, create_filter_chain};
use formrelay::http::{AppState, router};
use formrelay::limits::MemoryRateLimiter;
use formrelay::loader::SchemaLoader;
use formrelay::pipeline::deliver::Dispatcher;
use formrelay::pipeline::Pipeline;
use formrelay::schema::{FieldDefinition, FieldKind, FormSchema};
use formrelay::store::DynFormStore;
use formrelay::store::sqlite::SqliteFormStore;
use formrelay::uploads::UploadStore;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Create an empty in-memory store for tests.
pub async fn memory_store() -> DynFormStore {
    Arc::new(SqliteFormStore::new("sqlite::memory:").await.unwrap())
}

pub fn memory_loader(store: DynFormStore) -> SchemaLoader {
    SchemaLoader::new(store, Arc::new(MemoryCache::new(Duration::from_secs(60))))
}

/// name, email and message, all required; email to `team@example.com`
pub fn contact_schema(slug: &str) -> FormSchema {
    let mut schema = FormSchema::default_contact_form("team@example.com");
    schema.slug = slug.to_string();
    schema.title = "Contact".to_string();
    schema.fields = vec![
        FieldDefinition::new("name", FieldKind::Text { pattern: None })
            .with_label("Name")
            .required(),
        FieldDefinition::new("email", FieldKind::Email)
            .with_label("Email")
            .required(),
        FieldDefinition::new("message", FieldKind::Textarea)
            .with_label("Message")
            .required(),
    ];
    schema
}

/// Mailer keeping every message in memory
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Protocol("relay unavailable".into()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Dispatcher with a recording mailer and local storage
pub fn test_dispatcher(mailer: Arc<RecordingMailer>, store: DynFormStore) -> Dispatcher {
    Dispatcher::new()
        .add_channel(Box::new(EmailChannel::new(mailer)))
        .add_channel(Box::new(AdminStorageChannel::new(store)))
}

pub fn test_state(config: Config, store: DynFormStore, dispatcher: Dispatcher) -> AppState {
    let config = Arc::new(config);
    let loader = memory_loader(store);
    let uploads = UploadStore::new(
        config.uploads.directory.clone(),
        config.uploads.base_url.clone(),
    );
    let deps = GuardDeps {
        limits: config.limits.clone(),
        rate_limiter: Arc::new(MemoryRateLimiter::new(
            Duration::from_secs(config.limits.rate_limit_secs),
            Duration::from_secs(config.limits.marker_ttl_secs),
        )),
    };
    let guards = create_filter_chain(&config.guards, &deps).unwrap();
    AppState {
        pipeline: Arc::new(Pipeline::new(config, loader, dispatcher, uploads)),
        guards: Arc::new(guards),
    }
}

pub fn test_router(config: Config, store: DynFormStore, dispatcher: Dispatcher) -> Router {
    router(test_state(config, store, dispatcher))
}

pub fn json_request(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("user-agent", "formrelay-tests")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn form_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Status and decoded JSON body of a response
pub async fn read_json(response: axum::response::Response) -> (u16, Value) {
    let status = response.status().as_u16();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}
