//! Registry operations module.
//!
//! [`ContainerRegistryService`] ties together the image parser, the registry
//! configurations, the installed authorizers and the client pool. It turns an
//! image string into an authorized [`RegistryRequest`] and performs the
//! manifest, blob, tag and catalog calls against the registry v2 API.

use crate::auth::Authorizers;
use crate::client::{Client, ClientPool};
use crate::config::{RegistryConfiguration, SUPPORTED_MANIFEST_MEDIA_TYPES};
use crate::error::{Result, ScoutError};
use crate::reference::{ImageParser, ImageReference};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};


/// Repository name used to authorize catalog listings.
const CATALOG_REPOSITORY: &str = "catalog";

/// An image together with everything needed to talk to its registry.
#[derive(Debug, Clone)]
pub struct RegistryRequest {
    image: ImageReference,
    registry: RegistryConfiguration,
    headers: HeaderMap,
    client: Client,
}

impl RegistryRequest {
    pub fn image(&self) -> &ImageReference {
        &self.image
    }

    pub fn registry(&self) -> &RegistryConfiguration {
        &self.registry
    }

    /// Authorization headers produced for this image.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// High-level registry access driven by configuration.
pub struct ContainerRegistryService {
    parser: ImageParser,
    /// Registry configurations keyed by `host[:port]`.
    registries: HashMap<String, RegistryConfiguration>,
    authorizers: Authorizers,
    pool: Arc<ClientPool>,
}

impl ContainerRegistryService {
    /// Creates a new service.
    ///
    /// `registries` must be keyed by registry host, as returned by
    /// [`Config::registry_configurations`](crate::config::Config::registry_configurations).
    pub fn new(
        parser: ImageParser,
        registries: HashMap<String, RegistryConfiguration>,
        authorizers: Authorizers,
        pool: Arc<ClientPool>,
    ) -> Self {
        Self {
            parser,
            registries,
            authorizers,
            pool,
        }
    }

    pub fn parser(&self) -> &ImageParser {
        &self.parser
    }

    pub fn registry_configuration(&self, registry_host: &str) -> Option<&RegistryConfiguration> {
        self.registries.get(registry_host)
    }

    /// Parses `raw`, looks up its registry and authorizer, and obtains the
    /// authorization headers.
    ///
    /// # Errors
    ///
    /// - `InvalidReference` when `raw` does not parse
    /// - `UnknownRegistry` when no configuration exists for the image's host
    /// - `NoAuthorizer` when no authorizer handles the configured type
    /// - `AuthorizationFailed` when the authorizer declines
    /// - `Transport` when the authorizer fails
    pub async fn registry_request(&self, raw: &str) -> Result<RegistryRequest> {
        let image = self
            .parser
            .parse(raw)
            .map_err(|e| ScoutError::invalid_reference(raw, e))?;
        self.authorize(image).await
    }

    async fn authorize(&self, image: ImageReference) -> Result<RegistryRequest> {
        let registry_host = image.registry_host();
        let registry = self
            .registries
            .get(&registry_host)
            .ok_or_else(|| ScoutError::unknown_registry(&registry_host))?;

        let authorization_type = registry.authorization_type;
        let authorizer = self
            .authorizers
            .get(authorization_type)
            .ok_or_else(|| ScoutError::no_authorizer(authorization_type.to_string()))?;

        let headers = match authorizer.authorization_headers(&image, registry).await {
            Ok(Some(headers)) => headers,
            Ok(None) => {
                return Err(ScoutError::authorization_failed(format!(
                    "Could not obtain authorization headers for {} from the {} authorizer",
                    image, authorization_type
                )));
            }
            Err(e) => {
                return Err(ScoutError::Transport {
                    message: format!(
                        "The {} authorizer failed for {}",
                        authorization_type, registry_host
                    ),
                    status_code: e.status_code(),
                    source: Some(Box::new(e)),
                });
            }
        };

        let client = self.pool.client(registry)?;
        Ok(RegistryRequest {
            image,
            registry: registry.clone(),
            headers,
            client,
        })
    }

    /// Fetches the image manifest as a JSON tree with a `config` object.
    ///
    /// The manifest is requested with the configured media type first. When
    /// the answer has no `config` object, as schema 1 documents don't, it is
    /// requested once more with the other supported media type.
    ///
    /// # Errors
    ///
    /// - `Config` when the configured media type is not supported
    /// - `MalformedManifest` when neither answer has a `config` object
    /// - `Transport` for HTTP failures
    pub async fn image_manifest(&self, request: &RegistryRequest) -> Result<Value> {
        let media_type = request.registry.manifest_media_type.as_str();
        if !SUPPORTED_MANIFEST_MEDIA_TYPES.contains(&media_type) {
            return Err(ScoutError::config(
                format!("Not supported image manifest media type: {}", media_type),
                None,
            ));
        }

        let manifest = self.fetch_manifest(request, media_type).await?;
        if has_config(&manifest) {
            return Ok(manifest);
        }

        for alternative in SUPPORTED_MANIFEST_MEDIA_TYPES
            .iter()
            .filter(|m| **m != media_type)
        {
            debug!(
                image = %request.image,
                media_type = alternative,
                "Manifest has no config, requesting another media type"
            );
            let manifest = self.fetch_manifest(request, alternative).await?;
            if has_config(&manifest) {
                return Ok(manifest);
            }
        }

        Err(ScoutError::malformed_manifest(format!(
            "Manifest for {} has no config object",
            request.image
        )))
    }

    async fn fetch_manifest(&self, request: &RegistryRequest, media_type: &str) -> Result<Value> {
        request
            .client
            .fetch_manifest(
                &request.image.repository(),
                request.image.repository_reference(),
                media_type,
                &request.headers,
            )
            .await
    }

    /// Fetches the blob `digest` of the request's repository as a JSON tree.
    pub async fn image_blob(&self, request: &RegistryRequest, digest: &str) -> Result<Value> {
        request
            .client
            .fetch_blob(&request.image.repository(), digest, &request.headers)
            .await
    }

    /// Lists the tags of `repository` on the registry at `registry_host`.
    pub async fn list_tags(&self, registry_host: &str, repository: &str) -> Result<Vec<String>> {
        let request = self
            .request_for_repository(registry_host, repository)
            .await?;
        let tags = request
            .client
            .fetch_tags(repository, &json_headers(&request.headers))
            .await?;

        info!(registry_host, repository, count = tags.len(), "Listed tags");
        Ok(tags)
    }

    /// Lists the repositories in the catalog of the registry at `registry_host`.
    pub async fn list_repositories(&self, registry_host: &str) -> Result<Vec<String>> {
        let request = self
            .request_for_repository(registry_host, CATALOG_REPOSITORY)
            .await?;
        let repositories = request
            .client
            .fetch_catalog(&json_headers(&request.headers))
            .await?;

        info!(registry_host, count = repositories.len(), "Listed repositories");
        Ok(repositories)
    }

    async fn request_for_repository(
        &self,
        registry_host: &str,
        repository: &str,
    ) -> Result<RegistryRequest> {
        if !self.registries.contains_key(registry_host) {
            return Err(ScoutError::unknown_registry(registry_host));
        }

        let image = self
            .parser
            .parse_in_registry(registry_host, repository)
            .map_err(|e| {
                ScoutError::invalid_reference(format!("{}/{}", registry_host, repository), e)
            })?;

        self.authorize(image).await
    }
}

fn has_config(manifest: &Value) -> bool {
    manifest.get("config").is_some_and(Value::is_object)
}

fn json_headers(headers: &HeaderMap) -> HeaderMap {
    let mut headers = headers.clone();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}
