use libscout::{
    AuthorizationType, Config, ImageParser, ImageReference, ParseError, ParserDefaults,
    ReferenceType, Scout, ScoutError,
};

#[test]
fn test_version() {
    assert!(!libscout::version().is_empty());
}

#[test]
fn test_parse_with_docker_hub_defaults() {
    let image: ImageReference = "nginx".parse().unwrap();

    assert_eq!(image.registry_host(), "registry-1.docker.io");
    assert_eq!(image.repository(), "library/nginx");
    assert_eq!(image.reference_type(), ReferenceType::Tag);
    assert_eq!(image.to_string(), "registry-1.docker.io/library/nginx:latest");
}

#[test]
fn test_parse_with_custom_defaults() {
    let parser = ImageParser::new(ParserDefaults {
        registry_host: "harbor.example.com:8443".to_string(),
        tag: "stable".to_string(),
        namespace: "apps".to_string(),
    });

    let image = parser.parse("timestamp").unwrap();

    assert_eq!(image.hostname(), "harbor.example.com");
    assert_eq!(image.port(), Some("8443"));
    assert_eq!(image.repository(), "apps/timestamp");
    assert_eq!(image.tag(), Some("stable"));
}

#[test]
fn test_parse_digest_reference() {
    let image: ImageReference = "springsource/spring-cloud-dataflow-server@sha256:9d1b"
        .parse()
        .unwrap();

    assert_eq!(image.reference_type(), ReferenceType::Digest);
    assert_eq!(image.digest(), Some("sha256:9d1b"));
    assert_eq!(image.tag(), None);
}

#[test]
fn test_parse_errors_are_typed() {
    let result = "localhost:80bla/scdf/spring-image:123".parse::<ImageReference>();
    assert!(matches!(result, Err(ParseError::InvalidPort { .. })));
}

#[test]
fn test_config_from_yaml() {
    let config = Config::from_yaml_str(
        r#"
registries:
  harbor:
    registry_host: demo.goharbor.io
    authorization_type: basicauth
    user: admin
    secret: Harbor12345
"#,
    )
    .unwrap();

    let registries = config.registry_configurations().unwrap();
    let harbor = &registries["demo.goharbor.io"];
    assert_eq!(harbor.authorization_type, AuthorizationType::BasicAuth);
    assert!(!format!("{:?}", harbor).contains("Harbor12345"));
}

#[tokio::test]
async fn test_resolve_labels_for_unconfigured_registry() {
    let scout = Scout::from_config(Config::default()).await.unwrap();

    let err = scout.resolve_labels("nginx").await.unwrap_err();

    assert!(matches!(err, ScoutError::UnknownRegistry { .. }));
    assert!(!err.is_retryable());
}
