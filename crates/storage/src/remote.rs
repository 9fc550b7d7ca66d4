use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::adapter::{StorageAdapter, MARKDOWN_CONTENT_TYPE};
use crate::paths::{normalize_object_path, normalize_storage_path};
use crate::{Result, StorageError};

pub const DEFAULT_SNAPSHOTS_BUCKET: &str = "memory-snapshots";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const LIST_PAGE_SIZE: usize = 100;
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Object storage speaking the Supabase Storage REST dialect.
///
/// Keys are the normalized relative paths; "folders" are implied by `/` in keys and `list`
/// walks them recursively.
#[derive(Debug, Clone)]
pub struct ObjectStorage {
    client: Client,
    endpoint: Url,
    bucket: String,
}

#[derive(Debug, Serialize)]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: usize,
    offset: usize,
    #[serde(rename = "sortBy")]
    sort_by: SortBy,
}

#[derive(Debug, Serialize)]
struct SortBy {
    column: &'static str,
    order: &'static str,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    name: String,
    /// Folders come back without an object id.
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    prefixes: [&'a str; 1],
}

impl ObjectStorage {
    pub fn new(endpoint: &str, bucket: &str, service_key: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint.trim())
            .map_err(|err| StorageError::Config(format!("invalid endpoint '{endpoint}': {err}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(StorageError::Config(format!(
                "endpoint '{endpoint}' cannot be used as a base URL"
            )));
        }
        let bucket = bucket.trim();
        if bucket.is_empty() || bucket.contains('/') {
            return Err(StorageError::Config(format!("invalid bucket name '{bucket}'")));
        }
        let service_key = service_key.trim();
        if service_key.is_empty() {
            return Err(StorageError::Config(
                "object storage requires a service key".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {service_key}"))
            .map_err(|_| StorageError::Config("service key is not a valid header".to_string()))?;
        let mut apikey = HeaderValue::from_str(service_key)
            .map_err(|_| StorageError::Config("service key is not a valid header".to_string()))?;
        bearer.set_sensitive(true);
        apikey.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("apikey", apikey);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            bucket: bucket.to_string(),
        })
    }

    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn url(&self, segments: &[&str], key: Option<&str>) -> Result<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                StorageError::Config(format!("endpoint '{}' has no path", self.endpoint))
            })?;
            path.pop_if_empty();
            path.extend(["storage", "v1", "object"]);
            path.extend(segments);
            if let Some(key) = key {
                path.extend(key.split('/'));
            }
        }
        Ok(url)
    }

    fn object_url(&self, key: &str) -> Result<Url> {
        self.url(&[self.bucket.as_str()], Some(key))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url)
    }

    async fn list_level(&self, prefix: &str) -> Result<Vec<ListEntry>> {
        let url = self.url(&["list", self.bucket.as_str()], None)?;
        let mut entries = Vec::new();
        let mut offset = 0usize;
        loop {
            let body = ListRequest {
                prefix,
                limit: LIST_PAGE_SIZE,
                offset,
                sort_by: SortBy {
                    column: "name",
                    order: "asc",
                },
            };
            let response = self
                .request(Method::POST, url.clone())
                .json(&body)
                .send()
                .await?;
            if is_not_found(response.status()) {
                return Ok(entries);
            }
            let response = ensure_success(response, "list", prefix).await?;
            let page: Vec<ListEntry> = response.json().await?;
            let page_len = page.len();
            entries.extend(page);
            if page_len < LIST_PAGE_SIZE {
                return Ok(entries);
            }
            offset += page_len;
        }
    }
}

#[async_trait]
impl StorageAdapter for ObjectStorage {
    async fn put_text(&self, path: &str, text: &str) -> Result<()> {
        let key = normalize_object_path(path)?;
        let response = self
            .request(Method::POST, self.object_url(&key)?)
            .header(CONTENT_TYPE, MARKDOWN_CONTENT_TYPE)
            .header("x-upsert", "true")
            .body(text.to_string())
            .send()
            .await?;
        ensure_success(response, "put", &key).await?;
        Ok(())
    }

    async fn get_text(&self, path: &str) -> Result<Option<String>> {
        let key = normalize_object_path(path)?;
        let response = self
            .request(Method::GET, self.object_url(&key)?)
            .send()
            .await?;
        if is_not_found(response.status()) {
            return Ok(None);
        }
        if response.status() == StatusCode::BAD_REQUEST {
            // Supabase reports missing objects as 400 with a not_found payload.
            let body = response.text().await.unwrap_or_default();
            if looks_like_not_found(&body) {
                return Ok(None);
            }
            return Err(remote_error("get", &key, StatusCode::BAD_REQUEST, &body));
        }
        let response = ensure_success(response, "get", &key).await?;
        Ok(Some(response.text().await?))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let key = normalize_object_path(path)?;
        let response = self
            .request(Method::HEAD, self.object_url(&key)?)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if is_not_found(status) || status == StatusCode::BAD_REQUEST {
            return Ok(false);
        }
        Err(remote_error("exists", &key, status, ""))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = normalize_storage_path(prefix)?;
        let mut out = Vec::new();
        let mut pending = vec![root];
        while let Some(folder) = pending.pop() {
            for entry in self.list_level(&folder).await? {
                let full = if folder.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{folder}/{}", entry.name)
                };
                if entry.id.is_some() {
                    out.push(full);
                } else {
                    pending.push(full);
                }
            }
        }
        Ok(out)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let key = normalize_object_path(path)?;
        let url = self.url(&[self.bucket.as_str()], None)?;
        let response = self
            .request(Method::DELETE, url)
            .json(&DeleteRequest { prefixes: [key.as_str()] })
            .send()
            .await?;
        if is_not_found(response.status()) {
            return Ok(());
        }
        ensure_success(response, "delete", &key).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "remote"
    }
}

fn is_not_found(status: StatusCode) -> bool {
    status == StatusCode::NOT_FOUND
}

fn looks_like_not_found(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("not_found") || lower.contains("not found")
}

async fn ensure_success(response: Response, operation: &'static str, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(remote_error(operation, path, status, &body))
}

fn remote_error(operation: &'static str, path: &str, status: StatusCode, body: &str) -> StorageError {
    let message: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    StorageError::Remote {
        operation,
        path: path.to_string(),
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn storage(endpoint: &str) -> ObjectStorage {
        ObjectStorage::new(endpoint, "memory-snapshots", "service-key").unwrap()
    }

    #[test]
    fn builds_object_urls_with_encoded_segments() {
        let store = storage("https://project.example.co");
        let url = store.object_url("users/u 1/overview.md").unwrap();
        assert_eq!(
            url.as_str(),
            "https://project.example.co/storage/v1/object/memory-snapshots/users/u%201/overview.md"
        );

        let store = storage("https://project.example.co/base/");
        let url = store.url(&["list", "memory-snapshots"], None).unwrap();
        assert_eq!(
            url.as_str(),
            "https://project.example.co/base/storage/v1/object/list/memory-snapshots"
        );
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(matches!(
            ObjectStorage::new("not a url", "b", "k"),
            Err(StorageError::Config(_))
        ));
        assert!(matches!(
            ObjectStorage::new("https://x.example", "", "k"),
            Err(StorageError::Config(_))
        ));
        assert!(matches!(
            ObjectStorage::new("https://x.example", "b", "  "),
            Err(StorageError::Config(_))
        ));
    }

    #[tokio::test]
    async fn traversal_is_rejected_before_any_request() {
        // Port 9 (discard) is never contacted: validation fails first.
        let store = storage("http://127.0.0.1:9");
        for raw in ["../secret", "/etc/passwd", "a/../../b"] {
            assert!(store.get_text(raw).await.unwrap_err().is_path_traversal());
            assert!(store.put_text(raw, "x").await.unwrap_err().is_path_traversal());
            assert!(store.exists(raw).await.unwrap_err().is_path_traversal());
            assert!(store.delete(raw).await.unwrap_err().is_path_traversal());
        }
        assert!(store.list("../").await.unwrap_err().is_path_traversal());
    }

    #[test]
    fn detects_not_found_payloads() {
        assert!(looks_like_not_found(
            r#"{"statusCode":"404","error":"not_found","message":"Object not found"}"#
        ));
        assert!(!looks_like_not_found(r#"{"error":"InvalidJWT"}"#));
    }
}
