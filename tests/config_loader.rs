//! Loadable integration tests: the compact string format across schemes and
//! serialization tags.

use serde_json::json;

use headwater::config::Loadable;

#[tokio::test]
async fn loading_a_yaml_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("sources.yaml");
    std::fs::write(
        &file,
        "sources:\n  - type: service_broker\n    config:\n      brokers:\n        - https://hello\n",
    )
    .unwrap();

    let data = Loadable::parse(&format!("file://{}", file.display()))
        .unwrap()
        .load()
        .await
        .unwrap();
    assert_eq!(
        data,
        json!({
            "sources": [{"type": "service_broker", "config": {"brokers": ["https://hello"]}}]
        })
    );
}

#[tokio::test]
async fn loading_a_json_file_with_tag() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("sources.json");
    std::fs::write(&file, r#"{"sources": [{"type": "service_broker", "config": {}}]}"#).unwrap();

    let data = Loadable::parse(&format!("file+json://{}", file.display()))
        .unwrap()
        .load()
        .await
        .unwrap();
    assert_eq!(data, json!({"sources": [{"type": "service_broker", "config": {}}]}));
}

#[tokio::test]
async fn loading_a_file_as_raw_text() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("template.yaml.j2");
    std::fs::write(&file, "resources: []\n").unwrap();

    let text = Loadable::parse(&format!("file+string://{}", file.display()))
        .unwrap()
        .load_string()
        .await
        .unwrap();
    assert_eq!(text, "resources: []\n");
}

#[tokio::test]
async fn loading_environment_variables() {
    std::env::set_var("CONFIG_LOADER_TEST", r#"{"hello": "world"}"#);
    for spec in [
        "env://CONFIG_LOADER_TEST",
        "env+yaml://CONFIG_LOADER_TEST",
        "env+json://CONFIG_LOADER_TEST",
    ] {
        let data = Loadable::parse(spec).unwrap().load().await.unwrap();
        assert_eq!(data, json!({"hello": "world"}), "spec {}", spec);
    }
}

#[tokio::test]
async fn a_non_parseable_line_loads_as_a_string() {
    let data = Loadable::parse("helloworld").unwrap().load().await.unwrap();
    assert_eq!(data, json!("helloworld"));
}

#[tokio::test]
async fn loading_a_file_over_http() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/snippet.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "sources:\n  - type: service_broker\n    config:\n      brokers:\n        - https://google.com/\n",
        ))
        .mount(&server)
        .await;

    let address = server.uri();
    let address = address.strip_prefix("http://").unwrap();
    let data = Loadable::parse(&format!("http://{}/snippet.yaml", address))
        .unwrap()
        .load()
        .await
        .unwrap();
    assert_eq!(
        data,
        json!({
            "sources": [{"type": "service_broker", "config": {"brokers": ["https://google.com/"]}}]
        })
    );
}

#[tokio::test]
async fn missing_environment_variable_is_an_error() {
    std::env::remove_var("CONFIG_LOADER_ABSENT");
    assert!(Loadable::parse("env://CONFIG_LOADER_ABSENT")
        .unwrap()
        .load()
        .await
        .is_err());
}
