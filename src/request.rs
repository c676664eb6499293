use std::{collections::BTreeMap, time::Duration};

use reqwest::Method;
use serde_json::{Map, Value};

/// One file in a multipart upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePart {
    /// Form field name.
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FilePart {
    pub fn new(
        field: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// Request payload.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    Json(Value),
    /// Multipart form: files plus plain text fields.
    Multipart {
        files: Vec<FilePart>,
        fields: Vec<(String, String)>,
    },
}

/// Everything the pipeline needs to issue one API call.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    /// Path relative to the API root, e.g. `/merchants`.
    pub path: String,
    pub query: Map<String, Value>,
    pub body: Option<RequestBody>,
    pub headers: Vec<(String, String)>,
    /// Overrides the configured timeout.
    pub timeout: Option<Duration>,
    /// Overrides the configured transient retry count.
    pub retry: Option<usize>,
    /// Overrides the configured transient backoff step.
    pub retry_delay: Option<Duration>,
    /// Return a 404 as a normal response instead of an error.
    pub allow_not_found: bool,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Map::new(),
            body: None,
            headers: Vec::new(),
            timeout: None,
            retry: None,
            retry_delay: None,
            allow_not_found: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Adds one query parameter. `null` values are dropped on the wire.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Merges a JSON object of query parameters; non-objects are ignored.
    pub fn query_object(mut self, params: Value) -> Self {
        if let Value::Object(map) = params {
            self.query.extend(map);
        }
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn multipart(mut self, files: Vec<FilePart>, fields: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Multipart { files, fields });
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, retries: usize) -> Self {
        self.retry = Some(retries);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn allow_not_found(mut self) -> Self {
        self.allow_not_found = true;
        self
    }

    /// Login, registration and friends skip the queue so they never wait
    /// behind throttled traffic.
    pub fn is_auth_endpoint(&self) -> bool {
        is_auth_path(&self.path) && matches!(self.method, Method::GET | Method::POST)
    }

    pub fn is_upload(&self) -> bool {
        matches!(self.body, Some(RequestBody::Multipart { .. }))
    }

    /// `path + json(query)`, only for GET.
    pub fn cache_key(&self) -> Option<String> {
        if self.method != Method::GET {
            return None;
        }
        Some(cache_key(&self.path, &self.query))
    }

    /// Query parameters flattened to string pairs; arrays repeat the key.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.query.len());
        for (key, value) in sorted(&self.query) {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items {
                        if let Some(text) = scalar_to_string(item) {
                            pairs.push((key.clone(), text));
                        }
                    }
                }
                other => {
                    if let Some(text) = scalar_to_string(other) {
                        pairs.push((key.clone(), text));
                    }
                }
            }
        }
        pairs
    }
}

pub(crate) fn is_auth_path(path: &str) -> bool {
    let path = if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    };
    path.starts_with("/auth/")
}

/// Cache key for a GET: the path followed by the JSON form of its query
/// object (`{}` when empty).
pub fn cache_key(path: &str, query: &Map<String, Value>) -> String {
    let serialized = serde_json::to_string(&sorted(query)).unwrap_or_else(|_| "{}".to_owned());
    format!("{path}{serialized}")
}

fn sorted(query: &Map<String, Value>) -> BTreeMap<&String, &Value> {
    query.iter().collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}
