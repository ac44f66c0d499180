//! Google Cloud Storage backend
//!
//! Talks to the XML API. Conditional requests use the
//! `x-goog-if-generation-match` header, and a write reports the new
//! generation in `x-goog-generation`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderMap, LAST_MODIFIED};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::path::Path;
use url::Url;

use super::{Generation, ObjectAttributes, ObjectStore};
use crate::config::GCS_PUBLIC_ENDPOINT;
use crate::error::{RepoError, Result};

const GENERATION_HEADER: &str = "x-goog-generation";
const IF_GENERATION_MATCH: &str = "x-goog-if-generation-match";

/// Environment variables checked for an OAuth access token, in order
const TOKEN_ENV_VARS: &[&str] = &["CHARTWRIGHT_GCS_TOKEN", "GOOGLE_OAUTH_ACCESS_TOKEN"];

/// GCS bucket client
pub struct GcsStore {
    client: reqwest::Client,
    endpoint: Url,
    bucket: String,
    token: Option<String>,
}

impl GcsStore {
    /// Create a client for `bucket` on the public endpoint
    ///
    /// The access token is read from `CHARTWRIGHT_GCS_TOKEN` or
    /// `GOOGLE_OAUTH_ACCESS_TOKEN`; without one, requests are anonymous.
    pub fn new(bucket: impl Into<String>) -> Result<Self> {
        let token = TOKEN_ENV_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok())
            .filter(|t| !t.is_empty());
        Self::with_endpoint(GCS_PUBLIC_ENDPOINT, bucket, token)
    }

    /// Create a client against a custom endpoint
    pub fn with_endpoint(
        endpoint: &str,
        bucket: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| RepoError::InvalidRepositoryUrl {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            bucket: bucket.into(),
            token,
        })
    }

    /// Bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_url(&self, path: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| RepoError::InvalidRepositoryUrl {
                url: self.endpoint.to_string(),
                reason: "endpoint cannot be a base URL".to_string(),
            })?
            .pop_if_empty()
            .push(&self.bucket)
            .extend(path.split('/'));
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn put(
        &self,
        path: &str,
        body: Vec<u8>,
        content_type: &str,
        cache_control: Option<&str>,
        if_generation: Option<Generation>,
    ) -> Result<Generation> {
        let mut request = self
            .client
            .put(self.object_url(path)?)
            .header(CONTENT_TYPE, content_type)
            .body(body);
        if let Some(cache_control) = cache_control {
            request = request.header(CACHE_CONTROL, cache_control);
        }
        if let Some(generation) = if_generation {
            request = request.header(IF_GENERATION_MATCH, generation.to_string());
        }

        let response = check(path, self.authorize(request).send().await?).await?;
        generation_of(path, response.headers())
    }
}

/// Map HTTP status codes onto store errors
async fn check(path: &str, response: Response) -> Result<Response> {
    match response.status() {
        s if s.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(RepoError::ObjectNotFound {
            path: path.to_string(),
        }),
        StatusCode::PRECONDITION_FAILED => Err(RepoError::PreconditionFailed {
            path: path.to_string(),
        }),
        status => {
            let body = response.text().await.unwrap_or_default();
            Err(RepoError::Store {
                message: format!("{} for {}: {}", status, path, body.trim()),
            })
        }
    }
}

fn generation_of(path: &str, headers: &HeaderMap) -> Result<Generation> {
    headers
        .get(GENERATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| RepoError::Store {
            message: format!("missing {} header for {}", GENERATION_HEADER, path),
        })
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn attributes(&self, path: &str) -> Result<ObjectAttributes> {
        let request = self.client.head(self.object_url(path)?);
        let response = check(path, self.authorize(request).send().await?).await?;
        let headers = response.headers();

        let created = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|t| t.with_timezone(&Utc))
            .ok_or_else(|| RepoError::Store {
                message: format!("missing Last-Modified header for {}", path),
            })?;

        Ok(ObjectAttributes {
            generation: generation_of(path, headers)?,
            created,
            size: response.content_length().unwrap_or(0),
        })
    }

    async fn upload(&self, local: &Path, path: &str, cache_control: &str) -> Result<Generation> {
        let body = tokio::fs::read(local).await?;
        let content_type = match local.extension().and_then(|e| e.to_str()) {
            Some("tgz") => "application/gzip",
            Some("yaml") => "application/x-yaml",
            _ => "application/octet-stream",
        };
        tracing::debug!(path, bucket = %self.bucket, "uploading object");
        self.put(path, body, content_type, Some(cache_control), None)
            .await
    }

    async fn download(&self, path: &str, local: &Path) -> Result<()> {
        let request = self.client.get(self.object_url(path)?);
        let response = check(path, self.authorize(request).send().await?).await?;
        let bytes = response.bytes().await?;
        tokio::fs::write(local, &bytes).await?;
        Ok(())
    }

    async fn create_if_absent(&self, path: &str, contents: &[u8]) -> Result<Generation> {
        self.put(path, contents.to_vec(), "text/plain", None, Some(0))
            .await
    }

    async fn delete_if_generation(&self, path: &str, generation: Generation) -> Result<()> {
        let request = self
            .client
            .delete(self.object_url(path)?)
            .header(IF_GENERATION_MATCH, generation.to_string());
        check(path, self.authorize(request).send().await?).await?;
        Ok(())
    }
}
