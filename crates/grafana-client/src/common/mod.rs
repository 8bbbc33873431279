//! Common utilities for the Grafana API client
//!
//! Provides the request/response plumbing shared by every endpoint. Each
//! helper performs exactly one round trip and never retries.

use crate::error::GrafanaError;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// HTTP client wrapper with authentication
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url: String, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a full URL from a path
    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Percent-encode a single path segment (datasource names, slugs)
    pub fn segment(value: &str) -> String {
        urlencoding::encode(value).into_owned()
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("Accept", "application/json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn api_error(response: Response) -> GrafanaError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        GrafanaError::Api { status, body }
    }

    /// GET a resource that may legitimately be absent.
    ///
    /// 200 decodes the body, 404 yields `None`, anything else is an error
    /// carrying the status and body.
    pub async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, GrafanaError> {
        let url = self.build_url(path);
        debug!("GET {}", url);

        let response = self.authorize(self.client.get(&url)).send().await?;

        match response.status() {
            StatusCode::OK => {
                let text = response.text().await?;
                Ok(Some(serde_json::from_str(&text)?))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::api_error(response).await),
        }
    }

    /// POST a JSON body
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), GrafanaError> {
        let url = self.build_url(path);
        debug!("POST {}", url);

        let response = self
            .authorize(self.client.post(&url))
            .json(body)
            .send()
            .await?;
        Self::expect_success(response).await
    }

    /// PUT a JSON body
    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), GrafanaError> {
        let url = self.build_url(path);
        debug!("PUT {}", url);

        let response = self
            .authorize(self.client.put(&url))
            .json(body)
            .send()
            .await?;
        Self::expect_success(response).await
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Result<(), GrafanaError> {
        let url = self.build_url(path);
        debug!("DELETE {}", url);

        let response = self.authorize(self.client.delete(&url)).send().await?;
        Self::expect_success(response).await
    }

    /// Reachability check: any HTTP answer counts, only transport errors fail.
    pub async fn probe(&self, path: &str) -> Result<(), GrafanaError> {
        let url = self.build_url(path);
        debug!("probing {}", url);

        let response = self.authorize(self.client.get(&url)).send().await?;
        debug!("probe answered with {}", response.status());
        Ok(())
    }

    async fn expect_success(response: Response) -> Result<(), GrafanaError> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::api_error(response).await)
        }
    }
}
