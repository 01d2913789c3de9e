// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Cloud Firestore backend over the REST API
//!
//! Firestore wraps every field in a typed value (`stringValue`,
//! `integerValue`, `mapValue`, ...). Documents cross this boundary as plain
//! JSON objects; the codec below converts in both directions.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::credentials::AccessTokenSource;
use super::document_store::{require_object, validate_collection, Document, DocumentStore};
use super::error::{status_error, StorageError};

pub const FIRESTORE_API_BASE: &str = "https://firestore.googleapis.com";
pub const DEFAULT_DATABASE: &str = "(default)";
const PAGE_SIZE: u32 = 300;

#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    /// Overridable for the emulator
    pub api_base: String,
    pub timeout_seconds: u64,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: DEFAULT_DATABASE.to_string(),
            api_base: FIRESTORE_API_BASE.to_string(),
            timeout_seconds: 30,
        }
    }
}

/// Convert plain JSON to a Firestore typed value
pub fn to_firestore_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or(0.0) })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            if items.is_empty() {
                json!({ "arrayValue": {} })
            } else {
                let values: Vec<Value> = items.iter().map(to_firestore_value).collect();
                json!({ "arrayValue": { "values": values } })
            }
        }
        Value::Object(map) => json!({ "mapValue": { "fields": to_firestore_fields(map) } }),
    }
}

pub fn to_firestore_fields(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), to_firestore_value(v)))
        .collect()
}

/// Convert a Firestore typed value back to plain JSON
pub fn from_firestore_value(value: &Value) -> Result<Value, StorageError> {
    let typed = value.as_object().ok_or_else(|| {
        StorageError::SerializationError(format!("Expected typed value, got {}", value))
    })?;

    let (kind, inner) = typed.iter().next().ok_or_else(|| {
        StorageError::SerializationError("Empty typed value".to_string())
    })?;

    let plain = match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => Value::Bool(inner.as_bool().unwrap_or(false)),
        "integerValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            };
            let i = parsed.ok_or_else(|| {
                StorageError::SerializationError(format!("Bad integerValue: {}", inner))
            })?;
            Value::Number(i.into())
        }
        "doubleValue" => match inner {
            Value::Number(_) => inner.clone(),
            // NaN and infinities arrive as strings and have no JSON form
            Value::String(s) => s
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            _ => Value::Null,
        },
        "stringValue" | "timestampValue" | "bytesValue" | "referenceValue" => {
            Value::String(inner.as_str().unwrap_or_default().to_string())
        }
        "geoPointValue" => inner.clone(),
        "arrayValue" => {
            let values = match inner.get("values").and_then(Value::as_array) {
                Some(values) => values
                    .iter()
                    .map(from_firestore_value)
                    .collect::<Result<Vec<_>, _>>()?,
                None => Vec::new(),
            };
            Value::Array(values)
        }
        "mapValue" => match inner.get("fields").and_then(Value::as_object) {
            Some(fields) => Value::Object(from_firestore_fields(fields)?),
            None => Value::Object(Map::new()),
        },
        other => {
            return Err(StorageError::SerializationError(format!(
                "Unknown Firestore value type: {}",
                other
            )))
        }
    };

    Ok(plain)
}

pub fn from_firestore_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>, StorageError> {
    fields
        .iter()
        .map(|(k, v)| Ok((k.clone(), from_firestore_value(v)?)))
        .collect()
}

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl FirestoreDocument {
    fn into_document(self) -> Result<Document, StorageError> {
        let id = self
            .name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(Document {
            id,
            data: Value::Object(from_firestore_fields(&self.fields)?),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<FirestoreDocument>,
}

/// Quote a field name for use as a field path when it is not a simple identifier
pub fn field_path(field: &str) -> String {
    let simple = field
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if simple {
        field.to_string()
    } else {
        format!("`{}`", field.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

/// Body of an equality `runQuery` over one collection
pub fn equality_query(collection: &str, field: &str, value: &Value) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": field_path(field) },
                    "op": "EQUAL",
                    "value": to_firestore_value(value),
                }
            }
        }
    })
}

pub struct FirestoreDocumentStore {
    client: reqwest::Client,
    config: FirestoreConfig,
    tokens: Arc<dyn AccessTokenSource>,
}

impl std::fmt::Debug for FirestoreDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreDocumentStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FirestoreDocumentStore {
    pub fn new(
        config: FirestoreConfig,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Result<Self, StorageError> {
        if config.project_id.trim().is_empty() {
            return Err(StorageError::ConfigError("Project id is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            config,
            tokens,
        })
    }

    /// `{api}/v1/projects/{project}/databases/{db}/documents/{extra...}`
    pub fn documents_url(&self, extra: &[&str]) -> Result<Url, StorageError> {
        let mut url = Url::parse(&self.config.api_base)
            .map_err(|e| StorageError::ConfigError(format!("Invalid API base: {}", e)))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                StorageError::ConfigError("API base cannot be a base URL".to_string())
            })?;
            segments.pop_if_empty().extend([
                "v1",
                "projects",
                self.config.project_id.as_str(),
                "databases",
                self.config.database.as_str(),
            ]);
            match extra.split_first() {
                // runQuery is addressed as `documents:runQuery`
                Some((first, rest)) if first.starts_with(':') => {
                    segments.push(&format!("documents{}", first));
                    segments.extend(rest);
                }
                _ => {
                    segments.push("documents");
                    segments.extend(extra);
                }
            }
        }
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<Value, StorageError> {
        let token = self.tokens.access_token().await?;
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Firestore {} failed with {}", what, status);
            return Err(status_error(status, what, &body));
        }

        Ok(response.json().await?)
    }

    async fn list_pages(&self, collection: &str) -> Result<Vec<Document>, StorageError> {
        validate_collection(collection)?;

        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.documents_url(&[collection])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("pageSize", &PAGE_SIZE.to_string());
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let body = self.send(self.client.get(url), "List").await?;
            let page: ListResponse = serde_json::from_value(body)?;

            for doc in page.documents {
                documents.push(doc.into_document()?);
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Listed {} documents from {}", documents.len(), collection);
        Ok(documents)
    }
}

#[async_trait]
impl DocumentStore for FirestoreDocumentStore {
    async fn insert(&self, collection: &str, data: Value) -> Result<Document, StorageError> {
        validate_collection(collection)?;
        require_object(&data)?;

        let fields = data
            .as_object()
            .map(to_firestore_fields)
            .unwrap_or_default();

        let url = self.documents_url(&[collection])?;
        let body = self
            .send(self.client.post(url).json(&json!({ "fields": fields })), "Create")
            .await?;

        let created: FirestoreDocument = serde_json::from_value(body)?;
        created.into_document()
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StorageError> {
        self.list_pages(collection).await
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StorageError> {
        validate_collection(collection)?;

        let url = self.documents_url(&[":runQuery"])?;
        let body = self
            .send(
                self.client.post(url).json(&equality_query(collection, field, value)),
                "Query",
            )
            .await?;

        let items: Vec<RunQueryItem> = serde_json::from_value(body)?;
        items
            .into_iter()
            .filter_map(|item| item.document)
            .map(FirestoreDocument::into_document)
            .collect()
    }

    fn backend_name(&self) -> &'static str {
        "firestore"
    }
}
