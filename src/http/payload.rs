//! Request body decoding
//!
//! JSON objects are taken as-is. Urlencoded and multipart bodies use
//! bracketed keys for structure: `tags[]=a` appends to a list,
//! `items[0][name]=x` nests, and maps keyed `0..n` become lists.

use axum::extract::{FromRequest, Multipart, Request};
use axum::http::{StatusCode, header};
use serde_json::{Map, Value};

use crate::error::FormError;
use crate::uploads::UploadedFile;

/// Decoded submission body
#[derive(Debug, Default)]
pub struct Payload {
    pub data: Map<String, Value>,
    pub files: Vec<UploadedFile>,
}

impl Payload {
    /// Files that were actually chosen by the submitter
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.iter().filter(|f| !f.file_name.is_empty()).count()
    }
}

enum BodyKind {
    Json,
    Multipart,
    Urlencoded,
}

fn body_kind(request: &Request) -> BodyKind {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if content_type.starts_with("application/json") {
        BodyKind::Json
    } else if content_type.starts_with("multipart/form-data") {
        BodyKind::Multipart
    } else {
        BodyKind::Urlencoded
    }
}

/// Decode a submission body by its content type.
///
/// # Errors
///
/// [`FormError::DataTooLarge`] when the body exceeds the configured cap,
/// [`FormError::InvalidData`] when it cannot be decoded.
pub async fn read(request: Request) -> Result<Payload, FormError> {
    match body_kind(&request) {
        BodyKind::Multipart => read_multipart(request).await,
        BodyKind::Json => {
            let bytes = body_bytes(request).await?;
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Ok(Payload::default());
            }
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(data)) => Ok(Payload {
                    data,
                    files: Vec::new(),
                }),
                _ => Err(FormError::InvalidData),
            }
        }
        BodyKind::Urlencoded => {
            let bytes = body_bytes(request).await?;
            let mut data = Map::new();
            for (key, value) in url::form_urlencoded::parse(&bytes) {
                insert_field(&mut data, &key, Value::String(value.into_owned()));
            }
            Ok(Payload {
                data: normalize_map(data),
                files: Vec::new(),
            })
        }
    }
}

async fn body_bytes(request: Request) -> Result<axum::body::Bytes, FormError> {
    // the body is already capped by the limit layer
    axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|_| FormError::DataTooLarge)
}

async fn read_multipart(request: Request) -> Result<Payload, FormError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|_| FormError::InvalidData)?;

    let mut data = Map::new();
    let mut files = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(multipart_error(e.status())),
        };
        let name = field.name().unwrap_or_default().to_string();
        if name.is_empty() {
            continue;
        }

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| multipart_error(e.status()))?;
            let (base, _) = split_key(&name);
            files.push(UploadedFile {
                field: base.to_string(),
                file_name,
                content_type,
                bytes: bytes.to_vec(),
            });
        } else {
            let text = field.text().await.map_err(|e| multipart_error(e.status()))?;
            insert_field(&mut data, &name, Value::String(text));
        }
    }

    Ok(Payload {
        data: normalize_map(data),
        files,
    })
}

fn multipart_error(status: StatusCode) -> FormError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        FormError::DataTooLarge
    } else {
        FormError::InvalidData
    }
}

/// Split `a[b][]` into `a` and `["b", ""]`. Malformed keys are literal.
fn split_key(key: &str) -> (&str, Vec<&str>) {
    let Some(open) = key.find('[') else {
        return (key, Vec::new());
    };
    let (base, mut rest) = key.split_at(open);
    let mut segments = Vec::new();
    while let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            return (key, Vec::new());
        };
        segments.push(&inner[..close]);
        rest = &inner[close + 1..];
    }
    if base.is_empty() || !rest.is_empty() {
        return (key, Vec::new());
    }
    (base, segments)
}

/// Insert one decoded pair, honoring bracketed structure in the key.
pub fn insert_field(data: &mut Map<String, Value>, key: &str, value: Value) {
    let (base, path) = split_key(key);
    let slot = data.entry(base.to_string()).or_insert(Value::Null);
    assign(slot, &path, value);
}

fn assign(slot: &mut Value, path: &[&str], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        *slot = value;
        return;
    };
    if head.is_empty() {
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(items) = slot {
            let mut item = Value::Null;
            assign(&mut item, rest, value);
            items.push(item);
        }
    } else {
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(fields) = slot {
            let entry = fields.entry((*head).to_string()).or_insert(Value::Null);
            assign(entry, rest, value);
        }
    }
}

fn normalize_map(data: Map<String, Value>) -> Map<String, Value> {
    data.into_iter().map(|(k, v)| (k, normalize(v))).collect()
}

fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sequential = !map.is_empty()
                && map
                    .keys()
                    .enumerate()
                    .all(|(i, k)| k.parse::<usize>().ok() == Some(i));
            if sequential {
                Value::Array(map.into_iter().map(|(_, v)| normalize(v)).collect())
            } else {
                Value::Object(normalize_map(map))
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}
