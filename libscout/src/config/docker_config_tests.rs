use super::*;

fn known_insecure(server: &mockito::Server) -> HashMap<String, RegistryConfiguration> {
    let registry = RegistryConfiguration::new(server.host_with_port(), AuthorizationType::Anonymous)
        .with_insecure(true);
    HashMap::from([(registry.registry_host.clone(), registry)])
}

#[test]
fn test_registry_host_for_docker_hub_aliases() {
    assert_eq!(registry_host_for(DOCKER_HUB_INDEX_URL, true), DOCKER_HUB_HOST);
    assert_eq!(registry_host_for(DOCKER_IO, true), DOCKER_HUB_HOST);
    assert_eq!(registry_host_for("demo.goharbor.io", true), "demo.goharbor.io");
    assert_eq!(registry_host_for(DOCKER_IO, false), DOCKER_IO);
}

#[test]
fn test_entry_credentials_from_username_and_password() {
    let entry = DockerAuthEntry {
        username: Some("admin".to_string()),
        password: Some("Harbor12345".to_string()),
        auth: Some("b3RoZXI6dmFsdWU=".to_string()),
    };

    assert_eq!(
        entry.credentials(),
        Some(("admin".to_string(), "Harbor12345".to_string()))
    );
}

#[test]
fn test_entry_credentials_from_auth_field() {
    let entry = DockerAuthEntry {
        auth: Some("YWRtaW46SGFyYm9yMTIzNDU=".to_string()),
        ..DockerAuthEntry::default()
    };

    assert_eq!(
        entry.credentials(),
        Some(("admin".to_string(), "Harbor12345".to_string()))
    );
}

#[test]
fn test_entry_credentials_invalid_auth_field() {
    let entry = DockerAuthEntry {
        auth: Some("not base64!".to_string()),
        ..DockerAuthEntry::default()
    };
    assert_eq!(entry.credentials(), None);

    assert_eq!(DockerAuthEntry::default().credentials(), None);
}

#[tokio::test]
async fn test_invalid_json_yields_empty_map() {
    let pool = ClientPool::default();

    for json in ["", "   ", "{not json", r#"{"auths": 5}"#] {
        let registries = registry_configurations_from_docker_config(
            json,
            &DockerConfigSecrets::default(),
            &HashMap::new(),
            &pool,
        )
        .await;
        assert!(registries.is_empty(), "{} should yield nothing", json);
    }
}

#[tokio::test]
async fn test_bearer_challenge_yields_oauth2() {
    let mut server = mockito::Server::new_async().await;
    let version_check = server
        .mock("GET", "/v2/")
        .with_status(401)
        .with_header(
            "www-authenticate",
            r#"Bearer realm="https://auth.example.com/token",service="registry.example.com""#,
        )
        .create_async()
        .await;

    let host = server.host_with_port();
    let json = format!(
        r#"{{"auths":{{"{}":{{"username":"admin","password":"Harbor12345"}}}}}}"#,
        host
    );

    let registries = registry_configurations_from_docker_config(
        &json,
        &DockerConfigSecrets::default(),
        &known_insecure(&server),
        &ClientPool::default(),
    )
    .await;

    version_check.assert_async().await;
    let registry = &registries[&host];
    assert_eq!(registry.authorization_type, AuthorizationType::DockerOAuth2);
    assert!(registry.insecure);
    assert_eq!(registry.credentials(), Some(("admin", "Harbor12345")));
    assert_eq!(
        registry.extra[REGISTRY_AUTH_URI_KEY],
        "https://auth.example.com/token?scope=repository:{repository}:pull&service=registry.example.com"
    );
}

#[tokio::test]
async fn test_basic_challenge_yields_basic_auth() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v2/")
        .with_status(401)
        .with_header("www-authenticate", r#"Basic realm="Registry""#)
        .create_async()
        .await;

    let host = server.host_with_port();
    let json = format!(
        r#"{{"auths":{{"{}":{{"auth":"YWRtaW46SGFyYm9yMTIzNDU="}}}}}}"#,
        host
    );

    let registries = registry_configurations_from_docker_config(
        &json,
        &DockerConfigSecrets::default(),
        &known_insecure(&server),
        &ClientPool::default(),
    )
    .await;

    let registry = &registries[&host];
    assert_eq!(registry.authorization_type, AuthorizationType::BasicAuth);
    assert_eq!(registry.credentials(), Some(("admin", "Harbor12345")));
    assert!(!registry.extra.contains_key(REGISTRY_AUTH_URI_KEY));
}

#[tokio::test]
async fn test_open_registry_without_credentials_is_anonymous() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v2/")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let host = server.host_with_port();
    let json = format!(r#"{{"auths":{{"{}":{{}}}}}}"#, host);

    let registries = registry_configurations_from_docker_config(
        &json,
        &DockerConfigSecrets::default(),
        &known_insecure(&server),
        &ClientPool::default(),
    )
    .await;

    assert_eq!(
        registries[&host].authorization_type,
        AuthorizationType::Anonymous
    );
}

#[tokio::test]
async fn test_unreachable_registry_with_credentials_is_basic_auth() {
    let registry = RegistryConfiguration::new("127.0.0.1:1", AuthorizationType::Anonymous)
        .with_insecure(true);
    let known = HashMap::from([(registry.registry_host.clone(), registry)]);
    let json = r#"{"auths":{"127.0.0.1:1":{"username":"u","password":"p"}}}"#;

    let registries = registry_configurations_from_docker_config(
        json,
        &DockerConfigSecrets::default(),
        &known,
        &ClientPool::default(),
    )
    .await;

    assert_eq!(
        registries["127.0.0.1:1"].authorization_type,
        AuthorizationType::BasicAuth
    );
}

#[test]
fn test_merge_prefers_explicit_configuration() {
    let from_secret = RegistryConfiguration::new("demo.goharbor.io", AuthorizationType::DockerOAuth2)
        .with_credentials("admin", "Harbor12345")
        .with_extra(REGISTRY_AUTH_URI_KEY, "https://demo.goharbor.io/service/token")
        .with_extra("shared", "secret");
    let explicit = RegistryConfiguration::new("demo.goharbor.io", AuthorizationType::BasicAuth)
        .with_extra("shared", "explicit");
    let only_secret = RegistryConfiguration::new("other.io", AuthorizationType::Anonymous);

    let merged = merge_registry_configurations(
        HashMap::from([
            (from_secret.registry_host.clone(), from_secret),
            (only_secret.registry_host.clone(), only_secret),
        ]),
        HashMap::from([(explicit.registry_host.clone(), explicit)]),
    );

    assert_eq!(merged.len(), 2);
    let registry = &merged["demo.goharbor.io"];
    assert_eq!(registry.authorization_type, AuthorizationType::BasicAuth);
    assert_eq!(registry.credentials(), Some(("admin", "Harbor12345")));
    assert_eq!(registry.extra["shared"], "explicit");
    assert!(registry.extra.contains_key(REGISTRY_AUTH_URI_KEY));
    assert_eq!(
        merged["other.io"].authorization_type,
        AuthorizationType::Anonymous
    );
}

#[test]
fn test_merge_explicit_credentials_win() {
    let from_secret = RegistryConfiguration::new("r.io", AuthorizationType::BasicAuth)
        .with_credentials("old", "old-secret");
    let explicit = RegistryConfiguration::new("r.io", AuthorizationType::BasicAuth)
        .with_credentials("new", "new-secret");

    let merged = merge_registry_configurations(
        HashMap::from([("r.io".to_string(), from_secret)]),
        HashMap::from([("r.io".to_string(), explicit)]),
    );

    assert_eq!(merged["r.io"].credentials(), Some(("new", "new-secret")));
}
