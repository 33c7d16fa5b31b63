use super::{AuthChallenge, Credentials, RegistryAuthorizer};
use crate::cache::{CachedToken, TokenCache};
use crate::client::{ApiVersionCheck, Client, ClientPool};
use crate::config::{AuthorizationType, RegistryConfiguration};
use crate::error::{Result, ScoutError};
use crate::reference::{DOCKER_HUB_HOST, ImageReference};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

/// `extra` key holding a token endpoint template.
pub const REGISTRY_AUTH_URI_KEY: &str = "registry_auth_uri";

/// Placeholder replaced by the image repository in token endpoint templates.
pub const REPOSITORY_PLACEHOLDER: &str = "{repository}";

/// Token endpoint for Docker Hub.
pub const DOCKER_HUB_TOKEN_URI: &str =
    "https://auth.docker.io/token?service=registry.docker.io&scope=repository:{repository}:pull";

/// Lifetime assumed when the token response carries no `expires_in`.
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60);

/// How a registry wants to be authorized, learned once per host.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenEndpoint {
    /// `/v2/` answered 2xx.
    Open,
    /// Bearer token from this endpoint template.
    Template(String),
    /// The registry challenged with something other than Bearer.
    Basic,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Bearer token authorization following the registry token flow.
///
/// The token endpoint comes from `extra.registry_auth_uri`, from the Docker
/// Hub default, or from the `WWW-Authenticate` challenge of the registry's
/// `/v2/` endpoint. Tokens are cached per registry host and repository.
pub struct DockerOAuth2Authorizer {
    pool: Arc<ClientPool>,
    tokens: TokenCache,
    /// Discovered endpoints per registry host, one discovery at a time per host.
    endpoints: Mutex<HashMap<String, EndpointSlot>>,
}

type EndpointSlot = Arc<AsyncMutex<Option<TokenEndpoint>>>;

impl DockerOAuth2Authorizer {
    pub fn new(pool: Arc<ClientPool>) -> Self {
        Self {
            pool,
            tokens: TokenCache::default(),
            endpoints: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the configured or well-known endpoint, asking `/v2/` when
    /// neither exists.
    async fn token_endpoint(
        &self,
        client: &Client,
        registry: &RegistryConfiguration,
    ) -> Result<TokenEndpoint> {
        if let Some(template) = registry.extra.get(REGISTRY_AUTH_URI_KEY) {
            return Ok(TokenEndpoint::Template(template.clone()));
        }
        if registry.registry_host == DOCKER_HUB_HOST {
            return Ok(TokenEndpoint::Template(DOCKER_HUB_TOKEN_URI.to_string()));
        }

        let slot = self.endpoint_slot(&registry.registry_host);
        let mut known = slot.lock().await;
        if let Some(endpoint) = known.as_ref() {
            return Ok(endpoint.clone());
        }

        let endpoint = match client.check_version().await? {
            ApiVersionCheck::Open => TokenEndpoint::Open,
            ApiVersionCheck::Challenge(challenge) if challenge.is_bearer() => {
                TokenEndpoint::Template(token_uri_template(&challenge))
            }
            ApiVersionCheck::Challenge(challenge) => {
                warn!(
                    registry_host = %registry.registry_host,
                    scheme = %challenge.scheme,
                    "Registry does not issue bearer tokens, falling back to Basic"
                );
                TokenEndpoint::Basic
            }
        };

        debug!(registry_host = %registry.registry_host, ?endpoint, "Discovered token endpoint");
        *known = Some(endpoint.clone());
        Ok(endpoint)
    }

    fn endpoint_slot(&self, registry_host: &str) -> EndpointSlot {
        let mut slots = self.endpoints.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(registry_host.to_string()).or_default())
    }

    async fn exchange(
        client: &Client,
        url: &str,
        registry: &RegistryConfiguration,
    ) -> Result<CachedToken> {
        let headers = match Credentials::from_registry(registry) {
            Some(credentials) => credentials.to_headers()?,
            None => HeaderMap::new(),
        };

        debug!(url = %url, "Requesting registry token");
        let body = client.get_json(url, headers).await?;
        let response: TokenResponse = serde_json::from_value(body).map_err(|e| {
            ScoutError::transport_with_source(format!("Unexpected token response from {}", url), e)
        })?;

        let token = response
            .token
            .or(response.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ScoutError::authorization_failed(format!("Token response from {} has no token", url))
            })?;
        let ttl = response
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);

        Ok(CachedToken::new(token, ttl))
    }
}

/// Builds a token endpoint template from a Bearer challenge.
///
/// The pull scope for [`REPOSITORY_PLACEHOLDER`] is always requested; the
/// challenge's own scope, if any, is ignored.
pub fn token_uri_template(challenge: &AuthChallenge) -> String {
    let separator = if challenge.realm.contains('?') { '&' } else { '?' };
    let mut template = format!(
        "{}{}scope=repository:{}:pull",
        challenge.realm, separator, REPOSITORY_PLACEHOLDER
    );
    if let Some(service) = &challenge.service {
        template.push_str("&service=");
        template.push_str(service);
    }
    template
}

#[async_trait]
impl RegistryAuthorizer for DockerOAuth2Authorizer {
    fn authorization_type(&self) -> AuthorizationType {
        AuthorizationType::DockerOAuth2
    }

    async fn authorization_headers(
        &self,
        image: &ImageReference,
        registry: &RegistryConfiguration,
    ) -> Result<Option<HeaderMap>> {
        let client = self.pool.client(registry)?;

        let template = match self.token_endpoint(&client, registry).await? {
            TokenEndpoint::Open => return Ok(Some(HeaderMap::new())),
            TokenEndpoint::Basic => {
                return Credentials::from_registry(registry)
                    .map(|c| c.to_headers())
                    .transpose();
            }
            TokenEndpoint::Template(template) => template,
        };

        let repository = image.repository();
        let url = template.replace(REPOSITORY_PLACEHOLDER, &repository);
        let key = format!("{}/{}", registry.registry_host, repository);

        let token = self
            .tokens
            .get_or_refresh(&key, || Self::exchange(&client, &url, registry))
            .await?;

        Credentials::bearer(token).to_headers().map(Some)
    }
}

#[cfg(test)]
#[path = "oauth2_tests.rs"]
mod tests;
