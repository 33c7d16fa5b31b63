use super::RegistryAuthorizer;
use crate::config::{AuthorizationType, RegistryConfiguration};
use crate::error::Result;
use crate::reference::ImageReference;
use async_trait::async_trait;
use reqwest::header::HeaderMap;

/// Authorizer for public registries: always an empty header map.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousAuthorizer;

#[async_trait]
impl RegistryAuthorizer for AnonymousAuthorizer {
    fn authorization_type(&self) -> AuthorizationType {
        AuthorizationType::Anonymous
    }

    async fn authorization_headers(
        &self,
        _image: &ImageReference,
        _registry: &RegistryConfiguration,
    ) -> Result<Option<HeaderMap>> {
        Ok(Some(HeaderMap::new()))
    }
}

#[cfg(test)]
#[path = "anonymous_tests.rs"]
mod tests;
