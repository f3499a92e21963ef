use mockdiff::engine::{Client, ErrorCode};
use mockdiff::{
    BoxError, BufferSink, FailureKind, JsonPayloadParser, Mock, PayloadParseError, PayloadParser,
    RecoveredPayload, ReportConfig, RunError,
};
use serde_json::{json, Value};

fn mock_with_buffer() -> (Mock, BufferSink) {
    let sink = BufferSink::new();
    let mock = Mock::builder()
        .report_config(ReportConfig::default().color(false))
        .sink(sink.clone())
        .build();
    (mock, sink)
}

fn register_foo_rule(mock: &Mock) {
    mock.scope("http://example.com")
        .unwrap()
        .post("/foo")
        .match_header("X-API-KEY", "secret")
        .query([("a", "b")])
        .json_body(json!({ "foo": "bar" }))
        .reply_json(200, json!({ "status": "success" }));
}

async fn post_foo(client: Client, api_key: &str) -> Result<Value, BoxError> {
    let response = client
        .post("http://example.com/foo")
        .query(&[("a", "b")])
        .header("X-API-KEY", api_key)
        .json(&json!({ "foo": "bar" }))
        .send()
        .await?;
    Ok(response.json::<Value>()?)
}

#[tokio::test]
async fn matching_request_resolves_test() {
    // Arrange
    let _ = env_logger::try_init();
    let (mock, sink) = mock_with_buffer();
    register_foo_rule(&mock);
    let client = mock.client();

    // Act
    let result = mock
        .run_in_context(|| async move { post_foo(client, "secret").await })
        .await;

    // Assert
    assert_eq!(result.unwrap(), json!({ "status": "success" }));
    assert_eq!(sink.contents(), "");
    assert!(mock.is_done());
}

#[tokio::test]
async fn unmatched_request_is_reported_test() {
    // Arrange
    let _ = env_logger::try_init();
    let (mock, sink) = mock_with_buffer();
    register_foo_rule(&mock);
    let client = mock.client();

    // Act
    let result = mock
        .run_in_context(|| async move { post_foo(client, "wrong").await })
        .await;

    // Assert
    let err = result.unwrap_err();
    assert!(matches!(err, RunError::NoMatch));
    assert_eq!(err.to_string(), "No match for request");
    assert_eq!(err.failure_kind(), FailureKind::NoMatch);

    let report = sink.contents();
    assert_eq!(report.matches("Possible match").count(), 1);
    assert!(report.contains("URL: POST http://example.com/foo\n"));
    assert!(report.contains("-   \"x-api-key\": \"secret\"\n"));
    assert!(report.contains("+   \"x-api-key\": \"wrong\"\n"));
    assert!(report.contains("    \"a\": \"b\"\n"));
    assert!(report.contains("    \"foo\": \"bar\"\n"));

    // Headers the rule does not name stay out of the report.
    assert!(!report.contains("content-type"));

    // The rule was not consumed.
    assert_eq!(mock.active_mocks(), vec!["POST http://example.com:80/foo"]);
}

#[tokio::test]
async fn unrelated_failure_is_passed_through_test() {
    // Arrange
    let _ = env_logger::try_init();
    let (mock, sink) = mock_with_buffer();
    register_foo_rule(&mock);

    // Act
    let result: Result<(), RunError> = mock
        .run_in_context(|| async { Err::<(), BoxError>("database is down".into()) })
        .await;

    // Assert
    let err = result.unwrap_err();
    assert_eq!(err.failure_kind(), FailureKind::Other);
    assert_eq!(err.to_string(), "database is down");
    assert_eq!(sink.contents(), "");
}

#[tokio::test]
async fn every_active_rule_is_reported_in_scope_order_test() {
    // Arrange
    let _ = env_logger::try_init();
    let (mock, sink) = mock_with_buffer();
    mock.scope("http://a.example.com")
        .unwrap()
        .get("/first")
        .reply(200, "first");
    mock.scope("http://b.example.com")
        .unwrap()
        .get("/second")
        .reply(200, "second");
    let client = mock.client();

    // Act
    let result = mock
        .run_in_context(|| async move {
            client.get("http://a.example.com/missing").send().await?;
            Ok(())
        })
        .await;

    // Assert
    assert!(matches!(result, Err(RunError::NoMatch)));

    let report = sink.contents();
    assert_eq!(report.matches("Possible match").count(), 2);

    let first = report.find("URL: GET http://a.example.com/first").unwrap();
    let second = report.find("URL: GET http://b.example.com/second").unwrap();
    assert!(first < second);
}

#[tokio::test]
async fn consumed_rules_are_not_reported_test() {
    // Arrange
    let _ = env_logger::try_init();
    let (mock, sink) = mock_with_buffer();
    mock.scope("http://example.com")
        .unwrap()
        .get("/used")
        .reply(200, "")
        .get("/unused")
        .reply(200, "");
    let client = mock.client();

    // Act
    let result = mock
        .run_in_context(|| async move {
            client.get("http://example.com/used").send().await?;
            client.get("http://example.com/other").send().await?;
            Ok(())
        })
        .await;

    // Assert
    assert!(matches!(result, Err(RunError::NoMatch)));

    let report = sink.contents();
    assert_eq!(report.matches("Possible match").count(), 1);
    assert!(report.contains("URL: GET http://example.com/unused"));
    assert!(!report.contains("/used"));
}

#[tokio::test]
async fn raw_body_is_compared_as_string_test() {
    // Arrange
    let _ = env_logger::try_init();
    let (mock, sink) = mock_with_buffer();
    mock.scope("http://example.com")
        .unwrap()
        .post("/form")
        .body("name=fred")
        .reply(204, "");
    let client = mock.client();

    // Act
    let result = mock
        .run_in_context(|| async move {
            client
                .post("http://example.com/form")
                .body("name=bob")
                .send()
                .await?;
            Ok(())
        })
        .await;

    // Assert
    assert!(matches!(result, Err(RunError::NoMatch)));

    let report = sink.contents();
    assert!(report.contains("- \"name=fred\"\n"));
    assert!(report.contains("+ \"name=bob\"\n"));
}

#[tokio::test]
async fn header_names_are_folded_test() {
    // Arrange
    let _ = env_logger::try_init();
    let (mock, sink) = mock_with_buffer();
    mock.scope("http://example.com")
        .unwrap()
        .get("/secure")
        .match_header("X-API-KEY", "secret")
        .reply(200, "ok");
    let client = mock.client();

    // Act
    let matched = mock
        .run_in_context(|| {
            let client = client.clone();
            async move {
                let response = client
                    .get("http://example.com/secure")
                    .header("x-api-key", "secret")
                    .send()
                    .await?;
                Ok(response.text().to_string())
            }
        })
        .await;

    mock.scope("http://example.com")
        .unwrap()
        .get("/secure")
        .match_header("X-API-KEY", "secret")
        .reply(200, "ok");

    let unmatched = mock
        .run_in_context(|| async move {
            client
                .get("http://example.com/secure")
                .header("X-Api-Key", "other")
                .send()
                .await?;
            Ok(())
        })
        .await;

    // Assert
    assert_eq!(matched.unwrap(), "ok");
    assert!(matches!(unmatched, Err(RunError::NoMatch)));

    let report = sink.contents();
    assert!(report.contains("-   \"x-api-key\": \"secret\"\n"));
    assert!(report.contains("+   \"x-api-key\": \"other\"\n"));
}

#[tokio::test]
async fn net_connect_error_is_passed_through_test() {
    // Arrange
    let _ = env_logger::try_init();
    let (mock, sink) = mock_with_buffer();
    register_foo_rule(&mock);
    let client = mock.client();

    // Act
    let result = mock
        .run_in_context(|| async move {
            client.get("http://unknown.example.com/").send().await?;
            Ok(())
        })
        .await;

    // Assert
    match result {
        Err(RunError::Other(err)) => {
            let engine_err = err.downcast_ref::<mockdiff::engine::Error>().unwrap();
            assert_eq!(engine_err.code(), ErrorCode::NetConnectNotAllowed);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(sink.contents(), "");
}

#[tokio::test]
async fn scope_handle_from_before_clean_all_test() {
    // Arrange
    let _ = env_logger::try_init();
    let (mock, sink) = mock_with_buffer();
    let stale = mock.scope("http://example.com").unwrap();
    mock.clean_all();
    stale.get("/a").reply(200, "");
    mock.scope("http://example.com")
        .unwrap()
        .get("/c")
        .reply(200, "");
    let client = mock.client();

    // Act
    let result = mock
        .run_in_context(|| async move {
            client.get("http://example.com/b").send().await?;
            Ok(())
        })
        .await;

    // Assert
    assert!(matches!(result, Err(RunError::NoMatch)));
    assert_eq!(mock.active_mocks(), vec!["GET http://example.com:80/c"]);
    assert_eq!(mock.registry().len(), 1);

    let report = sink.contents();
    assert_eq!(report.matches("Possible match").count(), 1);
    assert!(report.contains("URL: GET http://example.com/c"));
}

#[tokio::test]
async fn consumed_rule_sharing_a_key_is_not_reported_test() {
    // Arrange
    let _ = env_logger::try_init();
    let (mock, sink) = mock_with_buffer();
    mock.scope("http://example.com")
        .unwrap()
        .get("/a")
        .reply(200, "first")
        .get("/a")
        .reply(200, "second");
    let client = mock.client();

    // Act
    let result = mock
        .run_in_context(|| async move {
            client.get("http://example.com/a").send().await?;
            client.get("http://example.com/b").send().await?;
            Ok(())
        })
        .await;

    // Assert
    assert!(matches!(result, Err(RunError::NoMatch)));
    assert_eq!(mock.get_active_interceptors()["GET http://example.com:80/a"].len(), 2);
    assert_eq!(sink.contents().matches("Possible match").count(), 1);
}

struct FailingParser;

impl PayloadParser for FailingParser {
    fn parse(&self, _message: &str) -> Result<RecoveredPayload, PayloadParseError> {
        JsonPayloadParser.parse("no payload here")
    }
}

#[tokio::test]
async fn reporting_failure_still_fails_with_no_match_test() {
    // Arrange
    let _ = env_logger::try_init();
    let sink = BufferSink::new();
    let mock = Mock::builder()
        .parser(FailingParser)
        .sink(sink.clone())
        .build();
    register_foo_rule(&mock);
    let client = mock.client();

    // Act
    let result = mock
        .run_in_context(|| async move { post_foo(client, "wrong").await })
        .await;

    // Assert
    assert!(matches!(result, Err(RunError::NoMatch)));
    assert_eq!(sink.contents(), "");
}

#[test]
fn blocking_runner_test() {
    // Arrange
    let _ = env_logger::try_init();
    let (mock, sink) = mock_with_buffer();
    register_foo_rule(&mock);
    let client = mock.client();

    // Act
    let first = mock.run_in_context_blocking(|| {
        let client = client.clone();
        async move { post_foo(client, "secret").await }
    });
    let second = mock.run_in_context_blocking(|| async move { post_foo(client, "secret").await });

    // Assert
    assert_eq!(first.unwrap(), json!({ "status": "success" }));

    // The only rule was consumed by the first request, so there is nothing to compare with.
    assert!(matches!(second, Err(RunError::NoMatch)));
    assert_eq!(sink.contents(), "");
}
