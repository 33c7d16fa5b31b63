use super::{Credentials, RegistryAuthorizer};
use crate::config::{AuthorizationType, RegistryConfiguration};
use crate::error::Result;
use crate::reference::ImageReference;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use tracing::warn;

/// HTTP Basic authorization with the configured user and secret.
///
/// Suits registries that accept Basic credentials on every request, such as
/// Artifactory or Azure Container Registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicAuthorizer;

#[async_trait]
impl RegistryAuthorizer for BasicAuthorizer {
    fn authorization_type(&self) -> AuthorizationType {
        AuthorizationType::BasicAuth
    }

    async fn authorization_headers(
        &self,
        _image: &ImageReference,
        registry: &RegistryConfiguration,
    ) -> Result<Option<HeaderMap>> {
        let Some(credentials) = Credentials::from_registry(registry) else {
            warn!(
                registry_host = %registry.registry_host,
                "Basic authorization needs both user and secret"
            );
            return Ok(None);
        };

        credentials.to_headers().map(Some)
    }
}

#[cfg(test)]
#[path = "basic_tests.rs"]
mod tests;
