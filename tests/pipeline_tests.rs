//! Tests for the template-to-wire pipeline: a curl-style command is
//! parsed, resolved against a variable row, and executed, and what
//! arrives at the server must match what the command described.

use tokio::time::Duration;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use curlstress::data_source::{RowSource, VariableRow};
use curlstress::errors::ErrorKind;
use curlstress::executor::{RequestExecutor, RequestOutcome};
use curlstress::substitute::{SubstitutionPolicy, VariableSubstitutor};
use curlstress::template::RequestTemplate;

fn executor() -> RequestExecutor {
    RequestExecutor::new(reqwest::Client::new(), Duration::from_secs(5))
}

fn lenient() -> VariableSubstitutor {
    VariableSubstitutor::new(SubstitutionPolicy::Lenient)
}

#[tokio::test]
async fn parsed_curl_command_reaches_the_wire_intact() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/items/9"))
        .and(header("Content-Type", "application/json"))
        .and(header("X-Trace", "abc-123"))
        .and(body_string(r#"{"name":"widget"}"#))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let command = format!(
        "curl -X PUT {}/api/items/9 \\\n  -H 'Content-Type: application/json' \\\n  -H 'X-Trace: abc-123' \\\n  -d '{{\"name\":\"widget\"}}'",
        server.uri()
    );
    let template = RequestTemplate::parse(&command).unwrap();
    let resolved = lenient().resolve(&template, &VariableRow::default()).unwrap();

    let result = executor().execute(resolved, 7, Duration::from_millis(50)).await;

    assert_eq!(result.attempt_id, 7);
    assert_eq!(result.issued_at, Duration::from_millis(50));
    assert_eq!(result.outcome, RequestOutcome::Status(200));
    assert!(result.outcome.is_response());
}

#[tokio::test]
async fn row_values_flow_into_url_headers_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/users/42"))
        .and(query_param("region", "eu"))
        .and(header("X-Auth", "token-abc"))
        .and(body_string(r#"{"user":"42"}"#))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let command = format!(
        "curl -X POST '{}/users/{{{{row.id}}}}?region={{{{row.region}}}}' -H 'X-Auth: {{{{row.token}}}}' -d '{{\"user\":\"{{{{row.id}}}}\"}}'",
        server.uri()
    );
    let template = RequestTemplate::parse(&command).unwrap();

    let row = VariableRow::from_pairs([
        ("id", "42"),
        ("region", "eu"),
        ("token", "token-abc"),
    ]);
    let resolved = lenient().resolve(&template, &row).unwrap();
    assert!(resolved.unresolved.is_empty());

    let result = executor().execute(resolved, 1, Duration::ZERO).await;

    assert_eq!(result.outcome, RequestOutcome::Status(201));
}

#[tokio::test]
async fn executor_times_out_slow_responses() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let template = RequestTemplate::parse(&server.uri()).unwrap();
    let resolved = lenient().resolve(&template, &VariableRow::default()).unwrap();

    let executor = RequestExecutor::new(reqwest::Client::new(), Duration::from_millis(100));
    let result = executor.execute(resolved, 1, Duration::ZERO).await;

    assert_eq!(result.outcome, RequestOutcome::Failure(ErrorKind::Timeout));
    assert!(
        result.latency >= Duration::from_millis(100),
        "timeout latency should cover the waiting time, got {:?}",
        result.latency
    );
}

#[tokio::test]
async fn executor_classifies_refused_connections() {
    let template = RequestTemplate::parse("http://127.0.0.1:1/unreachable").unwrap();
    let resolved = lenient().resolve(&template, &VariableRow::default()).unwrap();

    let result = executor().execute(resolved, 1, Duration::ZERO).await;

    assert_eq!(
        result.outcome,
        RequestOutcome::Failure(ErrorKind::Connection)
    );
}

#[tokio::test]
async fn rows_cycle_in_file_order_through_resolution() {
    let rows = RowSource::from_string("name\nalpha\nbeta").unwrap();
    let template = RequestTemplate::parse(
        "curl -X POST http://localhost/ignored -d 'name={{row.name}}'",
    )
    .unwrap();
    let substitutor = lenient();

    let bodies: Vec<String> = (0..4)
        .map(|_| {
            let resolved = substitutor.resolve(&template, &rows.next_row()).unwrap();
            resolved.body.unwrap()
        })
        .collect();

    assert_eq!(bodies, vec!["name=alpha", "name=beta", "name=alpha", "name=beta"]);
}
