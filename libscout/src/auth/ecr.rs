use super::{Credentials, RegistryAuthorizer};
use crate::cache::{CachedToken, TokenCache};
use crate::config::{AuthorizationType, RegistryConfiguration};
use crate::error::{Result, ScoutError};
use crate::reference::ImageReference;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ecr::Client as EcrClient;
use reqwest::header::HeaderMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// `extra` key naming the AWS region. Required.
pub const REGION_KEY: &str = "region";

/// `extra` key with comma separated AWS account ids whose registries the
/// token should cover.
pub const REGISTRY_IDS_KEY: &str = "registry_ids";

/// ECR tokens are valid for 12 hours
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Amazon ECR authorization.
///
/// `user` and `secret` are used as static AWS access and secret keys. When
/// they are absent the default AWS credential chain applies.
#[derive(Debug, Default)]
pub struct AwsEcrAuthorizer {
    tokens: TokenCache,
}

impl AwsEcrAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    async fn fetch_token(registry: &RegistryConfiguration, region: &str) -> Result<CachedToken> {
        // Build AWS config
        let loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()));
        let aws_config = match registry.credentials() {
            Some((access_key, secret_key)) => {
                // Use static credentials if provided
                let creds = aws_sdk_ecr::config::Credentials::new(
                    access_key, secret_key, None, None, "static",
                );
                loader.credentials_provider(creds).load().await
            }
            None => loader.load().await,
        };
        let client = EcrClient::new(&aws_config);

        info!(
            registry_host = %registry.registry_host,
            region,
            "Getting ECR authorization token"
        );

        let mut request = client.get_authorization_token();
        for id in registry_ids(registry) {
            request = request.registry_ids(id);
        }
        let response = request.send().await.map_err(|e| {
            ScoutError::transport_with_source("Failed to get ECR authorization token", e)
        })?;

        let auth_data = response.authorization_data().first().ok_or_else(|| {
            ScoutError::authorization_failed("No authorization data returned from ECR")
        })?;
        let token = auth_data.authorization_token().ok_or_else(|| {
            ScoutError::authorization_failed("No authorization token in ECR response")
        })?;

        let ttl = auth_data
            .expires_at()
            .and_then(|expires_at| {
                let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
                u64::try_from(expires_at.secs())
                    .ok()
                    .map(|at| Duration::from_secs(at.saturating_sub(now)))
            })
            .unwrap_or(DEFAULT_TOKEN_TTL);

        Ok(CachedToken::new(token, ttl))
    }
}

/// Account ids from `extra.registry_ids`, blanks dropped.
fn registry_ids(registry: &RegistryConfiguration) -> Vec<String> {
    registry
        .extra
        .get(REGISTRY_IDS_KEY)
        .map(|ids| {
            ids.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl RegistryAuthorizer for AwsEcrAuthorizer {
    fn authorization_type(&self) -> AuthorizationType {
        AuthorizationType::AwsEcr
    }

    async fn authorization_headers(
        &self,
        _image: &ImageReference,
        registry: &RegistryConfiguration,
    ) -> Result<Option<HeaderMap>> {
        let Some(region) = registry.extra.get(REGION_KEY).filter(|r| !r.is_empty()) else {
            warn!(
                registry_host = %registry.registry_host,
                "ECR authorization needs extra.{}", REGION_KEY
            );
            return Ok(None);
        };

        let key = format!("{}|{}", registry.registry_host, region);
        let token = self
            .tokens
            .get_or_refresh(&key, || Self::fetch_token(registry, region))
            .await?;

        // The token is already base64("AWS:<password>")
        Credentials::encoded_basic(token).to_headers().map(Some)
    }
}

#[cfg(test)]
#[path = "ecr_tests.rs"]
mod tests;
