use std::collections::BTreeMap;
use std::time::Duration;

use archiver_core::ArchivePolicy;
use archiver_engine::{ClientBuildError, FailureKind, FetchSettings, Fetcher, ReqwestFetcher};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html_policy() -> ArchivePolicy {
    ArchivePolicy::new(["text/html"], Vec::<String>::new()).unwrap()
}

#[tokio::test]
async fn matching_content_type_reads_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html>ok</html>", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(&FetchSettings::default()).unwrap();
    let output = fetcher
        .fetch(&format!("{}/doc", server.uri()), &html_policy())
        .await
        .expect("fetch ok");

    assert_eq!(output.status_code, 200);
    assert!(output.content_type.unwrap().starts_with("text/html"));
    assert_eq!(output.body.as_deref(), Some(&b"<html>ok</html>"[..]));
}

#[tokio::test]
async fn other_content_type_skips_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/image"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1u8, 2, 3], "image/png"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(&FetchSettings::default()).unwrap();
    let output = fetcher
        .fetch(&format!("{}/image", server.uri()), &html_policy())
        .await
        .expect("fetch ok");

    assert_eq!(output.content_type.as_deref(), Some("image/png"));
    assert_eq!(output.body, None);
}

#[tokio::test]
async fn http_error_status_is_a_response_not_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_raw("gone", "text/html"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(&FetchSettings::default()).unwrap();
    let output = fetcher
        .fetch(&format!("{}/missing", server.uri()), &html_policy())
        .await
        .expect("status codes are data");

    assert_eq!(output.status_code, 404);
    assert_eq!(output.body.as_deref(), Some(&b"gone"[..]));
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_raw("late", "text/html"),
        )
        .mount(&server)
        .await;

    let settings = FetchSettings {
        request_timeout: Duration::from_millis(200),
        ..FetchSettings::default()
    };
    let fetcher = ReqwestFetcher::new(&settings).unwrap();
    let err = fetcher
        .fetch(&format!("{}/slow", server.uri()), &html_policy())
        .await
        .expect_err("should time out");

    assert_eq!(err.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn invalid_url_is_reported() {
    let fetcher = ReqwestFetcher::new(&FetchSettings::default()).unwrap();
    let err = fetcher
        .fetch("http://exa mple.com/", &html_policy())
        .await
        .expect_err("invalid url");
    assert_eq!(err.kind, FailureKind::InvalidUrl);
}

#[tokio::test]
async fn configured_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/h"))
        .and(header("user-agent", "archiver-test/1.0"))
        .and(header("x-token", "abc"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let settings = FetchSettings {
        user_agent: Some("archiver-test/1.0".to_string()),
        request_headers: BTreeMap::from([("X-Token".to_string(), "abc".to_string())]),
        ..FetchSettings::default()
    };
    let fetcher = ReqwestFetcher::new(&settings).unwrap();
    let output = fetcher
        .fetch(&format!("{}/h", server.uri()), &html_policy())
        .await
        .unwrap();
    assert_eq!(output.status_code, 204);
}

#[test]
fn malformed_header_name_is_rejected() {
    let settings = FetchSettings {
        request_headers: BTreeMap::from([("bad header".to_string(), "x".to_string())]),
        ..FetchSettings::default()
    };
    let err = ReqwestFetcher::new(&settings).unwrap_err();
    assert!(matches!(err, ClientBuildError::InvalidHeader { ref name, .. } if name == "bad header"));
}
