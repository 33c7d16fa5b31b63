use super::*;

fn ecr_registry() -> RegistryConfiguration {
    RegistryConfiguration::new(
        "123456789012.dkr.ecr.eu-west-1.amazonaws.com",
        AuthorizationType::AwsEcr,
    )
    .with_credentials("AKIAEXAMPLE", "secret")
}

#[tokio::test]
async fn test_ecr_declines_without_region() {
    let registry = ecr_registry();
    let image: ImageReference = "123456789012.dkr.ecr.eu-west-1.amazonaws.com/app:1"
        .parse()
        .unwrap();

    let headers = AwsEcrAuthorizer::new()
        .authorization_headers(&image, &registry)
        .await
        .unwrap();

    assert!(headers.is_none());
}

#[test]
fn test_registry_ids_parsing() {
    let registry = ecr_registry().with_extra(REGISTRY_IDS_KEY, " 123456789012, ,210987654321 ");

    assert_eq!(registry_ids(&registry), vec!["123456789012", "210987654321"]);
    assert!(registry_ids(&ecr_registry()).is_empty());
}

#[test]
fn test_ecr_authorization_type() {
    assert_eq!(
        AwsEcrAuthorizer::new().authorization_type(),
        AuthorizationType::AwsEcr
    );
}
