//! HTTP-backed collaborators against a local mock server.

use std::time::Duration;

use portsync_agent::identity::{InstanceMetadata, MetadataClient};
use portsync_agent::source::{FileFetcher, HttpFetcher};
use portsync_agent::SourceResolver;
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn resolver() -> SourceResolver {
    let http = Arc::new(HttpFetcher::new(TIMEOUT).unwrap());
    SourceResolver::new()
        .with_fetcher("file", Arc::new(FileFetcher))
        .with_fetcher("http", http)
}

#[tokio::test]
async fn test_catalog_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"[{"serviceName":"web","loadBalancerName":"web-lb","exposedContainerName":"app"}]"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let services = resolver()
        .load_catalog(&format!("{}/services.json", server.uri()))
        .await
        .unwrap();

    assert_eq!(services.len(), 1);
    assert_eq!(services[0].load_balancer_name, "web-lb");
}

#[tokio::test]
async fn test_configuration_over_http_ignores_unknown_keys() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"cluster":"production","sleepTimeSeconds":15,"owner":"platform"}"#,
        ))
        .mount(&server)
        .await;

    let configuration = resolver()
        .load_configuration(&format!("{}/config.json", server.uri()))
        .await
        .unwrap();

    assert_eq!(configuration.cluster, "production");
    assert_eq!(configuration.sleep_interval(), Duration::from_secs(15));
}

#[tokio::test]
async fn test_http_error_status_fails_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services.json"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such key"))
        .mount(&server)
        .await;

    let err = resolver()
        .load_catalog(&format!("{}/services.json", server.uri()))
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("404"));
}

#[tokio::test]
async fn test_metadata_with_session_token() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/latest/api/token"))
        .and(header("X-aws-ec2-metadata-token-ttl-seconds", "21600"))
        .respond_with(ResponseTemplate::new(200).set_body_string("session-token"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/latest/meta-data/instance-id"))
        .and(header("X-aws-ec2-metadata-token", "session-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("i-0a1b2c3d4e5f60718\n"))
        .expect(1)
        .mount(&server)
        .await;

    let client = MetadataClient::new(&server.uri(), TIMEOUT).unwrap();

    assert_eq!(client.instance_id().await.unwrap(), "i-0a1b2c3d4e5f60718");
}

#[tokio::test]
async fn test_metadata_without_session_token() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/latest/api/token"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/latest/meta-data/instance-id"))
        .respond_with(ResponseTemplate::new(200).set_body_string("i-legacy"))
        .mount(&server)
        .await;

    let client = MetadataClient::new(&format!("{}/", server.uri()), TIMEOUT).unwrap();

    assert_eq!(client.instance_id().await.unwrap(), "i-legacy");
}

#[tokio::test]
async fn test_metadata_empty_instance_id_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/latest/api/token"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/latest/meta-data/instance-id"))
        .respond_with(ResponseTemplate::new(200).set_body_string("  "))
        .mount(&server)
        .await;

    let client = MetadataClient::new(&server.uri(), TIMEOUT).unwrap();

    assert!(client.instance_id().await.is_err());
}

#[tokio::test]
async fn test_metadata_unanswered_token_request_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/latest/api/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late-token")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/latest/meta-data/instance-id"))
        .respond_with(ResponseTemplate::new(200).set_body_string("i-legacy"))
        .expect(1)
        .mount(&server)
        .await;

    let client = MetadataClient::new(&server.uri(), TIMEOUT)
        .unwrap()
        .with_token_timeout(Duration::from_millis(200));

    assert_eq!(client.instance_id().await.unwrap(), "i-legacy");
}
