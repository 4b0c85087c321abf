//! REST and form-POST surface

use axum::extract::{ConnectInfo, DefaultBodyLimit, Path, Query, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::FormError;
use crate::filters::{FilterChain, GuardContext};
use crate::format::display_value;
use crate::pipeline::outcome::SubmissionOutcome;
use crate::pipeline::sanitize::{clean_text, sanitize_key};
use crate::pipeline::{Pipeline, RequestMeta};
use crate::store::FormQuery;

pub mod payload;
pub mod response;

use payload::Payload;

const TOTAL_COUNT: HeaderName = HeaderName::from_static("x-total-count");
const TOTAL_PAGES: HeaderName = HeaderName::from_static("x-total-pages");
const MAX_PER_PAGE: u32 = 100;
const DEFAULT_PER_PAGE: u32 = 10;

/// Form-POST fields that steer the request and are never submitted data
const SYSTEM_FIELDS: [&str; 3] = ["form_id", "action", "_http_referer"];

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub guards: Arc<FilterChain>,
}

impl AppState {
    fn config(&self) -> &Config {
        self.pipeline.config()
    }
}

pub fn router(state: AppState) -> Router {
    let prefix = state.config().route_prefix();
    let body_limit = usize::try_from(state.config().limits.max_body_bytes).unwrap_or(usize::MAX);

    Router::new()
        .route(&format!("{prefix}/forms"), get(list_forms))
        .route(&format!("{prefix}/forms/:slug"), get(get_form))
        .route(&format!("{prefix}/forms/:slug/submit"), post(submit_form))
        .route("/submit", post(submit_posted_form))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers([TOTAL_COUNT, TOTAL_PAGES]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn header_text(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(clean_text)
        .filter(|v| !v.is_empty())
}

/// Requester details from the connection and headers.
///
/// `referer` from a form field wins over the `Referer` header.
fn request_meta(
    config: &Config,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    referer: Option<String>,
) -> RequestMeta {
    let forwarded = config
        .trust_forwarded_for
        .then(|| header_text(headers, HeaderName::from_static("x-forwarded-for")))
        .flatten()
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty());
    let ip = forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    RequestMeta {
        ip,
        user_agent: header_text(headers, header::USER_AGENT).unwrap_or_else(|| "unknown".into()),
        referer: referer
            .filter(|r| !r.trim().is_empty())
            .or_else(|| header_text(headers, header::REFERER)),
    }
}

/// Guards, then the pipeline
async fn run_submission(
    state: &AppState,
    identifier: &str,
    payload: Payload,
    meta: RequestMeta,
) -> Result<Json<SubmissionOutcome>, FormError> {
    let file_count = payload.file_count();
    let Payload { mut data, files } = payload;

    let ctx = GuardContext {
        form: identifier,
        data: &data,
        file_count,
        meta: &meta,
    };
    state.guards.validate(&ctx).await?;
    data.remove(&state.config().limits.honeypot_field);

    let outcome = state.pipeline.submit(identifier, data, meta, &files).await?;
    Ok(Json(outcome))
}

async fn submit_form(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    request: Request,
) -> Result<Json<SubmissionOutcome>, FormError> {
    let payload = payload::read(request).await?;
    let meta = request_meta(state.config(), &headers, peer.map(|c| c.0), None);
    run_submission(&state, &slug, payload, meta).await
}

async fn submit_posted_form(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    request: Request,
) -> Result<Json<SubmissionOutcome>, FormError> {
    let mut payload = payload::read(request).await?;

    let form_id = payload
        .data
        .get("form_id")
        .map(|v| clean_text(&display_value(v)))
        .unwrap_or_default();
    let referer = payload
        .data
        .get("_http_referer")
        .map(|v| clean_text(&display_value(v)));
    for name in SYSTEM_FIELDS {
        payload.data.remove(name);
    }

    let meta = request_meta(state.config(), &headers, peer.map(|c| c.0), referer);
    run_submission(&state, &form_id, payload, meta).await
}

#[derive(Debug, Deserialize)]
struct ListParams {
    page: Option<i64>,
    per_page: Option<i64>,
    search: Option<String>,
}

impl ListParams {
    fn query(&self) -> FormQuery {
        let per_page = self
            .per_page
            .unwrap_or(i64::from(DEFAULT_PER_PAGE))
            .clamp(1, i64::from(MAX_PER_PAGE));
        let page = self.page.unwrap_or(1).clamp(1, i64::from(u32::MAX));
        FormQuery {
            page: u32::try_from(page).unwrap_or(1),
            per_page: u32::try_from(per_page).unwrap_or(DEFAULT_PER_PAGE),
            search: self
                .search
                .as_deref()
                .map(clean_text)
                .filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Serialize)]
struct FormListItem {
    id: i64,
    slug: String,
    title: String,
    submit_url: String,
}

#[derive(Debug, Serialize)]
struct FormDetail {
    id: i64,
    slug: String,
    title: String,
    submit_url: String,
    fields: Value,
}

/// Clean every string in a JSON document
fn clean_strings(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(clean_text(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(clean_strings).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, clean_strings(v)))
                .collect(),
        ),
        other => other,
    }
}

async fn list_forms(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, FormError> {
    let query = params.query();
    let (forms, total) = state.pipeline.loader().store().list_forms(&query).await?;
    let pages = total.div_ceil(u64::from(query.per_page));

    let config = state.config();
    let items: Vec<FormListItem> = forms
        .into_iter()
        .map(|f| FormListItem {
            submit_url: config.submit_url(&f.slug),
            id: f.id,
            slug: f.slug,
            title: f.title,
        })
        .collect();

    let mut response = Json(items).into_response();
    let headers = response.headers_mut();
    headers.insert(TOTAL_COUNT, HeaderValue::from(total));
    headers.insert(TOTAL_PAGES, HeaderValue::from(pages));
    Ok(response)
}

async fn get_form(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response, FormError> {
    let slug = sanitize_key(&slug);
    if slug.is_empty() {
        return Ok(response::message(StatusCode::BAD_REQUEST, "Invalid slug"));
    }
    let Some(schema) = state.pipeline.loader().store().get_form_by_slug(&slug).await? else {
        return Ok(response::message(StatusCode::NOT_FOUND, "Form not found"));
    };

    let fields = serde_json::to_value(&schema.fields)
        .map_err(|e| FormError::Store(e.into()))?;
    Ok(Json(FormDetail {
        id: schema.id,
        submit_url: state.config().submit_url(&schema.slug),
        slug: schema.slug,
        title: clean_text(&schema.title),
        fields: clean_strings(fields),
    })
    .into_response())
}
