//! HTTP client for container registry communication.
//!
//! This module provides a thin HTTP client built on reqwest for the parts of
//! the registry v2 API the resolver needs: the `/v2/` version check, manifests, blobs,
//! tags and the catalog. Underlying reqwest clients are pooled per TLS and
//! proxy setting so registries that share those settings share connections.

use crate::auth::AuthChallenge;
use crate::config::{Config, HttpProxy, RegistryConfiguration};
use crate::error::{Result, ScoutError};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, LINK, WWW_AUTHENTICATE};
use reqwest::{Client as ReqwestClient, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;


/// Response from the catalog API endpoint.
#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    repositories: Vec<String>,
}

/// Response from the tags list API endpoint.
#[derive(Debug, Deserialize)]
struct TagsResponse {
    name: String,
    // Registries answer `null` for repositories without tags
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Outcome of probing the `/v2/` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiVersionCheck {
    /// The registry answered 2xx; no token is needed.
    Open,

    /// The registry answered 401 with a parseable `WWW-Authenticate` header.
    Challenge(AuthChallenge),
}

/// Configuration for the HTTP client.
///
/// # Examples
///
/// ```
/// use libscout::client::ClientConfig;
///
/// let config = ClientConfig::new()
///     .with_timeout(60)
///     .with_max_idle_per_host(20);
/// assert_eq!(config.timeout_seconds, 60);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout in seconds (default: 30)
    pub timeout_seconds: u64,
    /// Connect timeout in seconds (default: 10)
    pub connect_timeout_seconds: u64,
    /// Maximum idle connections per host (default: 10)
    pub max_idle_per_host: usize,
    /// Proxy used by registries with `use_http_proxy`
    pub http_proxy: Option<HttpProxy>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            connect_timeout_seconds: 10,
            max_idle_per_host: 10,
            http_proxy: None,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes network and proxy settings from the application configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout_seconds: config.network.timeout,
            connect_timeout_seconds: config.network.connect_timeout,
            max_idle_per_host: config.network.max_idle_per_host,
            http_proxy: config.http_proxy.clone(),
        }
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_connect_timeout(mut self, seconds: u64) -> Self {
        self.connect_timeout_seconds = seconds;
        self
    }

    pub fn with_max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = max;
        self
    }

    pub fn with_http_proxy(mut self, proxy: HttpProxy) -> Self {
        self.http_proxy = Some(proxy);
        self
    }
}

/// Key of a pooled client: (skip TLS verification, use HTTP proxy).
type ClientKey = (bool, bool);

/// Hands out registry clients backed by shared reqwest clients.
///
/// At most one reqwest client exists per TLS/proxy combination. reqwest
/// clients are internally reference counted, so handing out clones is cheap
/// and safe to use from concurrent tasks.
#[derive(Debug, Default)]
pub struct ClientPool {
    config: ClientConfig,
    clients: Mutex<HashMap<ClientKey, ReqwestClient>>,
}

impl ClientPool {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns a client bound to the registry described by `registry`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the registry wants the HTTP proxy
    /// but none is configured, or a transport error if the underlying client
    /// cannot be built.
    pub fn client(&self, registry: &RegistryConfiguration) -> Result<Client> {
        let http_client =
            self.http_client(registry.disable_ssl_verification, registry.use_http_proxy)?;
        let registry_url = format!("{}://{}", registry.scheme(), registry.registry_host);

        Ok(Client {
            http_client,
            registry_url,
            timeout_seconds: self.config.timeout_seconds,
        })
    }

    /// Number of distinct reqwest clients built so far.
    pub fn len(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn http_client(&self, skip_tls_verification: bool, use_proxy: bool) -> Result<ReqwestClient> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (skip_tls_verification, use_proxy);
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = self.build_http_client(skip_tls_verification, use_proxy)?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    fn build_http_client(
        &self,
        skip_tls_verification: bool,
        use_proxy: bool,
    ) -> Result<ReqwestClient> {
        let mut builder = ReqwestClient::builder()
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .connect_timeout(Duration::from_secs(self.config.connect_timeout_seconds))
            .pool_max_idle_per_host(self.config.max_idle_per_host)
            .danger_accept_invalid_certs(skip_tls_verification);

        if use_proxy {
            let proxy = self.config.http_proxy.as_ref().ok_or_else(|| {
                ScoutError::config(
                    "Registry requires an HTTP proxy but none is configured",
                    None,
                )
            })?;
            let proxy = reqwest::Proxy::all(proxy.url()).map_err(|e| {
                ScoutError::config_with_source(
                    format!("Invalid HTTP proxy {}", proxy.url()),
                    None,
                    e,
                )
            })?;
            builder = builder.proxy(proxy);
        } else {
            builder = builder.no_proxy();
        }

        debug!(
            skip_tls_verification,
            use_proxy, "Building pooled registry HTTP client"
        );

        builder
            .build()
            .map_err(|e| ScoutError::transport_with_source("Failed to create HTTP client", e))
    }
}

/// HTTP client bound to one registry.
#[derive(Debug, Clone)]
pub struct Client {
    http_client: ReqwestClient,
    /// Base registry URL (e.g., "https://registry.example.com")
    registry_url: String,
    timeout_seconds: u64,
}

impl Client {
    /// Returns the base registry URL.
    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }

    /// Requests `/v2/` without credentials to learn how the registry wants to
    /// be authorized.
    ///
    /// # Errors
    ///
    /// A 401 without a usable `WWW-Authenticate` header, and every other
    /// non-success status, is a transport error.
    pub async fn check_version(&self) -> Result<ApiVersionCheck> {
        let url = format!("{}/v2/", self.registry_url);
        debug!(url = %url, "Probing registry API version");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.translate_reqwest_error(e))?;

        if response.status() == StatusCode::UNAUTHORIZED
            && let Some(challenge) = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| AuthChallenge::parse(v).ok())
        {
            return Ok(ApiVersionCheck::Challenge(challenge));
        }

        Self::check_response_status(response).await?;
        Ok(ApiVersionCheck::Open)
    }

    /// Fetches the manifest for `reference` (tag or digest) as a JSON tree.
    ///
    /// The body is decoded as JSON whatever `Content-Type` the registry
    /// declares.
    pub async fn fetch_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        headers: &HeaderMap,
    ) -> Result<Value> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.registry_url, repository, reference
        );
        let accept = HeaderValue::from_str(media_type).map_err(|e| {
            ScoutError::config_with_source(
                format!("Invalid manifest media type: {}", media_type),
                None,
                e,
            )
        })?;

        let mut headers = headers.clone();
        headers.insert(ACCEPT, accept);

        let body = self.get_bytes(&url, headers).await?;
        serde_json::from_slice(&body).map_err(|e| {
            ScoutError::malformed_manifest_with_source(
                format!("Manifest from {} is not valid JSON", url),
                e,
            )
        })
    }

    /// Fetches a blob (typically an image config) as a JSON tree.
    ///
    /// Redirects to storage backends are followed by reqwest, which drops
    /// the `Authorization` header when the redirect leaves the registry host.
    pub async fn fetch_blob(
        &self,
        repository: &str,
        digest: &str,
        headers: &HeaderMap,
    ) -> Result<Value> {
        let url = format!("{}/v2/{}/blobs/{}", self.registry_url, repository, digest);

        let body = self.get_bytes(&url, headers.clone()).await?;
        serde_json::from_slice(&body).map_err(|e| {
            ScoutError::malformed_manifest_with_source(
                format!("Blob from {} is not valid JSON", url),
                e,
            )
        })
    }

    /// Fetches every tag of `repository`, following `Link` pagination.
    pub async fn fetch_tags(&self, repository: &str, headers: &HeaderMap) -> Result<Vec<String>> {
        let mut all_tags = Vec::new();
        let mut url = format!("{}/v2/{}/tags/list", self.registry_url, repository);

        loop {
            let (body, next_path) = self.get_page(&url, headers).await?;
            let page: TagsResponse = serde_json::from_slice(&body).map_err(|e| {
                ScoutError::transport_with_source("Failed to parse tags response", e)
            })?;

            if page.name != repository {
                return Err(ScoutError::transport(
                    format!(
                        "Registry returned tags for '{}' but expected '{}'",
                        page.name, repository
                    ),
                    None,
                ));
            }
            all_tags.extend(page.tags.unwrap_or_default());

            match next_path {
                Some(path) => url = self.resolve_link(&path),
                None => break,
            }
        }

        Ok(all_tags)
    }

    /// Fetches the repository catalog, following `Link` pagination.
    pub async fn fetch_catalog(&self, headers: &HeaderMap) -> Result<Vec<String>> {
        let mut all_repositories = Vec::new();
        let mut url = format!("{}/v2/_catalog", self.registry_url);

        loop {
            let (body, next_path) = self.get_page(&url, headers).await?;
            let page: CatalogResponse = serde_json::from_slice(&body).map_err(|e| {
                ScoutError::transport_with_source("Failed to parse catalog response", e)
            })?;
            all_repositories.extend(page.repositories);

            match next_path {
                Some(path) => url = self.resolve_link(&path),
                None => break,
            }
        }

        Ok(all_repositories)
    }

    /// GETs an absolute URL and decodes the body as JSON.
    ///
    /// Used for token endpoints, which usually live on another host than the
    /// registry itself.
    pub async fn get_json(&self, url: &str, headers: HeaderMap) -> Result<Value> {
        let body = self.get_bytes(url, headers).await?;
        serde_json::from_slice(&body).map_err(|e| {
            ScoutError::transport_with_source(format!("Response from {} is not valid JSON", url), e)
        })
    }

    async fn get_bytes(&self, url: &str, headers: HeaderMap) -> Result<Vec<u8>> {
        debug!(url = %url, "GET");
        let response = self
            .http_client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| self.translate_reqwest_error(e))?;

        let response = Self::check_response_status(response).await?;
        self.read_body(response).await
    }

    async fn get_page(&self, url: &str, headers: &HeaderMap) -> Result<(Vec<u8>, Option<String>)> {
        debug!(url = %url, "GET page");
        let response = self
            .http_client
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| self.translate_reqwest_error(e))?;

        // Extract Link header for pagination before consuming response
        let next_path = Self::extract_next_link(response.headers());

        let response = Self::check_response_status(response).await?;
        let body = self.read_body(response).await?;
        Ok((body, next_path))
    }

    async fn read_body(&self, response: Response) -> Result<Vec<u8>> {
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| self.translate_reqwest_error(e))
    }

    /// Link targets are usually registry-relative paths, but some registries
    /// hand out absolute URLs.
    fn resolve_link(&self, link: &str) -> String {
        if link.starts_with("http://") || link.starts_with("https://") {
            link.to_string()
        } else {
            format!("{}{}", self.registry_url, link)
        }
    }

    /// Extracts the next page URL from the Link header.
    ///
    /// Format: `Link: </v2/_catalog?n=100&last=repo99>; rel="next"`
    fn extract_next_link(headers: &HeaderMap) -> Option<String> {
        let link_str = headers.get(LINK)?.to_str().ok()?;

        for link_part in link_str.split(',') {
            let link_part = link_part.trim();

            if (link_part.contains("rel=\"next\"") || link_part.contains("rel='next'"))
                && let Some(start) = link_part.find('<')
                && let Some(end) = link_part.find('>')
                && start < end
            {
                return Some(link_part[start + 1..end].to_string());
            }
        }

        None
    }

    /// Translates a reqwest error into a transport error.
    fn translate_reqwest_error(&self, error: reqwest::Error) -> ScoutError {
        let status_code = error.status().map(|s| s.as_u16());
        let message = if error.is_timeout() {
            format!(
                "Request to {} timed out after {} seconds",
                self.registry_url, self.timeout_seconds
            )
        } else if error.is_connect() {
            format!("Failed to connect to registry at {}", self.registry_url)
        } else if error.is_request() {
            format!("Failed to send request to {}", self.registry_url)
        } else {
            format!("Network error communicating with {}", self.registry_url)
        };

        ScoutError::Transport {
            message,
            status_code,
            source: Some(Box::new(error)),
        }
    }

    /// Checks the HTTP response status and translates failures into
    /// transport errors carrying the status code.
    async fn check_response_status(response: Response) -> Result<Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        // Try to extract error message from response body
        let url = response.url().to_string();
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("(unable to read response body)"));

        let message = match status {
            StatusCode::UNAUTHORIZED => {
                format!("Authentication required for {}: {}", url, error_body)
            }
            StatusCode::FORBIDDEN => format!("Access forbidden for {}: {}", url, error_body),
            StatusCode::NOT_FOUND => format!("Not found: {}", url),
            StatusCode::TOO_MANY_REQUESTS => format!("Rate limit exceeded for {}", url),
            s if s.is_server_error() => {
                format!("Server error from {}: {}", url, error_body)
            }
            _ => format!("HTTP {} from {}: {}", status.as_u16(), url, error_body),
        };

        Err(ScoutError::transport(message, Some(status.as_u16())))
    }
}
