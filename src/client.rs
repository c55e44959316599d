//! Typed HTTP client for a NetBox-compatible registry API.

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ApiConfig;

/// A paginated list response.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub count: usize,
    #[serde(default)]
    pub next: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: u64,
}

/// Response to a write the server did not accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    pub status: StatusCode,
    pub body: String,
}

pub struct NetBoxClient {
    base_url: String,
    http: Client,
}

impl NetBoxClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        // Every request carries JSON headers and, when set, the API token
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = config.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Token {token}"))
                .context("NETBOX_TOKEN is not a valid header value")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Id of the first cluster with this exact name.
    pub async fn cluster_id(&self, name: &str) -> Result<Option<u64>> {
        self.first_id("/api/plugins/osd/clusters/", name).await
    }

    /// Id of the first device with this exact name.
    pub async fn device_id(&self, name: &str) -> Result<Option<u64>> {
        self.first_id("/api/dcim/devices/", name).await
    }

    /// Create OSDs in one bulk request. Returns the created objects, or the
    /// status and body of a non-2xx response.
    pub async fn create_osds<T: Serialize>(&self, osds: &[T]) -> Result<Result<Vec<Value>, Rejected>> {
        let url = format!("{}/api/plugins/osd/osds/", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(osds)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;

        // Non-2xx is an answer, not a transport failure
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Ok(Err(Rejected { status, body }));
        }
        let created = resp
            .json()
            .await
            .with_context(|| format!("parsing response from {}", url))?;
        Ok(Ok(created))
    }

    /// GET a list endpoint with query parameters.
    pub async fn list<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<Page<T>> {
        self.get(path, query).await
    }

    async fn first_id(&self, path: &str, name: &str) -> Result<Option<u64>> {
        let page: Page<IdOnly> = self.get(path, &[("name", name.to_string())]).await?;
        Ok(page.results.first().map(|r| r.id))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        if !resp.status().is_success() {
            bail!("{} returned {}", url, resp.status());
        }

        resp.json()
            .await
            .with_context(|| format!("parsing response from {}", url))
    }
}
