//! End-to-end tests driving complete runs through the controller.
//!
//! These tests validate:
//! - Full runs against a live mock server, including success accounting
//! - Rate pacing and the concurrency cap under slow responses
//! - Graceful stop, grace-period cancellation, and state transitions
//! - Error classification for timeouts and refused connections

use tokio::time::{sleep, Duration, Instant};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use curlstress::config::TestConfig;
use curlstress::controller::{LoadTestController, RunState};
use curlstress::data_source::RowSource;
use curlstress::substitute::SubstitutionPolicy;
use curlstress::template::RequestTemplate;

fn config(target_rps: f64, duration_ms: u64) -> TestConfig {
    TestConfig {
        target_rps,
        duration: Duration::from_millis(duration_ms),
        per_request_timeout: Duration::from_secs(10),
        max_concurrency: 8,
        substitution: SubstitutionPolicy::Lenient,
        shutdown_grace: Duration::from_secs(5),
    }
}

fn get_template(url: &str) -> RequestTemplate {
    RequestTemplate::parse(&format!("curl {}", url)).unwrap()
}

// --- Complete runs ---

#[tokio::test]
async fn run_completes_and_reports_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1..)
        .mount(&server)
        .await;

    let template = get_template(&format!("{}/ping", server.uri()));
    let controller =
        LoadTestController::new(config(20.0, 1_000), template, RowSource::empty()).unwrap();
    let handle = controller.handle();

    let summary = controller.run().await.unwrap();

    assert!(
        summary.issued >= 10,
        "expected roughly 20 requests in 1s at 20 rps, issued={}",
        summary.issued
    );
    assert_eq!(summary.completed, summary.issued);
    assert_eq!(summary.success_count, summary.completed);
    assert_eq!(summary.success_rate, 100.0);
    assert_eq!(summary.failure_count(), 0);
    assert!(summary.latency.is_some());
    assert_eq!(handle.state(), RunState::Completed);
}

#[tokio::test]
async fn run_honors_target_rate() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let template = get_template(&server.uri());
    let controller =
        LoadTestController::new(config(5.0, 2_000), template, RowSource::empty()).unwrap();

    let start = Instant::now();
    let summary = controller.run().await.unwrap();
    let elapsed = start.elapsed();

    // 5 rps for 2s should land near 10 requests, never an unpaced flood
    assert!(
        (6..=14).contains(&summary.issued),
        "expected ~10 requests at 5 rps over 2s, issued={}",
        summary.issued
    );
    assert!(
        elapsed.as_secs() >= 1 && elapsed.as_secs() <= 5,
        "run should last about its configured duration, ran for {:?}",
        elapsed
    );
}

#[tokio::test]
async fn unbounded_rate_is_limited_only_by_concurrency() {
    let server = MockServer::start().await;

    // Responses slow enough that the concurrency cap is the bottleneck
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("ok")
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;

    let template = get_template(&server.uri());
    let test_config = TestConfig {
        max_concurrency: 2,
        ..config(0.0, 1_000)
    };
    let controller = LoadTestController::new(test_config, template, RowSource::empty()).unwrap();

    let summary = controller.run().await.unwrap();

    // Two slots recycling every ~400ms over 1s permits ~6 requests
    assert!(
        summary.issued >= 2 && summary.issued <= 12,
        "concurrency cap of 2 should bound throughput, issued={}",
        summary.issued
    );
    assert_eq!(
        summary.completed, summary.issued,
        "all requests should drain within the grace period"
    );
}

// --- CSV-driven substitution ---

#[tokio::test]
async fn run_cycles_csv_rows_through_template() {
    let server = MockServer::start().await;

    for id in ["1", "2", "3"] {
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(body_string_contains(format!("\"id\":\"{}\"", id)))
            .respond_with(ResponseTemplate::new(200))
            .expect(1..)
            .mount(&server)
            .await;
    }

    let command = format!(
        "curl -X POST {}/submit -d '{{\"id\":\"{{{{row.id}}}}\"}}'",
        server.uri()
    );
    let template = RequestTemplate::parse(&command).unwrap();
    let rows = RowSource::from_string("id\n1\n2\n3").unwrap();

    let controller = LoadTestController::new(config(30.0, 1_000), template, rows).unwrap();
    let summary = controller.run().await.unwrap();

    // Each of the three rows cycles through at least once
    assert_eq!(summary.success_count, summary.completed);
    assert_eq!(summary.missing_variable_warnings, 0);
}

#[tokio::test]
async fn lenient_policy_sends_unknown_placeholders_literally() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("{{row.absent}}"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1..)
        .mount(&server)
        .await;

    let command = format!("curl -X POST {} -d 'value={{{{row.absent}}}}'", server.uri());
    let template = RequestTemplate::parse(&command).unwrap();

    let controller =
        LoadTestController::new(config(10.0, 500), template, RowSource::empty()).unwrap();
    let summary = controller.run().await.unwrap();

    assert!(summary.success_count > 0);
    assert!(
        summary.missing_variable_warnings >= summary.completed,
        "every request should log its unresolved placeholder, warnings={} completed={}",
        summary.missing_variable_warnings,
        summary.completed
    );
    assert!(
        summary.failure_by_kind.get("missing_variable").is_none(),
        "lenient mode must not record unresolved placeholders as failures"
    );
}

#[tokio::test]
async fn strict_policy_fails_attempts_without_dispatching() {
    let command = "curl -X POST http://127.0.0.1:1/never -d 'value={{row.absent}}'";
    let template = RequestTemplate::parse(command).unwrap();
    let test_config = TestConfig {
        substitution: SubstitutionPolicy::Strict,
        ..config(10.0, 500)
    };

    let controller = LoadTestController::new(test_config, template, RowSource::empty()).unwrap();
    let summary = controller.run().await.unwrap();

    assert!(summary.issued > 0);
    assert_eq!(summary.success_count, 0);
    assert_eq!(
        summary.failure_by_kind.get("missing_variable"),
        Some(&summary.completed),
        "every attempt should fail on the unresolved placeholder"
    );
    assert_eq!(summary.completed, summary.issued);
}

// --- Error classification ---

#[tokio::test]
async fn timeouts_are_classified_and_counted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let template = get_template(&server.uri());
    let test_config = TestConfig {
        per_request_timeout: Duration::from_millis(200),
        ..config(10.0, 1_000)
    };

    let controller = LoadTestController::new(test_config, template, RowSource::empty()).unwrap();
    let summary = controller.run().await.unwrap();

    assert_eq!(summary.success_count, 0);
    let timeouts = summary.failure_by_kind.get("timeout").copied().unwrap_or(0);
    assert!(
        timeouts >= 5,
        "expected most attempts to time out, timeouts={} issued={}",
        timeouts,
        summary.issued
    );
    assert_eq!(summary.completed, summary.issued);
}

#[tokio::test]
async fn refused_connections_are_classified() {
    // Port 1 refuses connections immediately
    let template = get_template("http://127.0.0.1:1/unreachable");

    let controller =
        LoadTestController::new(config(10.0, 500), template, RowSource::empty()).unwrap();
    let summary = controller.run().await.unwrap();

    assert_eq!(summary.success_count, 0);
    let refused = summary
        .failure_by_kind
        .get("connection_error")
        .copied()
        .unwrap_or(0);
    assert!(
        refused > 0,
        "expected connection errors, failure_by_kind={:?}",
        summary.failure_by_kind
    );
}

#[tokio::test]
async fn status_codes_are_counted_by_value() {
    let server = MockServer::start().await;

    // First three requests hit the 500 mock, the rest fall through to 200
    Mock::given(method("GET"))
        .and(path("/mixed"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mixed"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let template = get_template(&format!("{}/mixed", server.uri()));
    let controller =
        LoadTestController::new(config(20.0, 1_000), template, RowSource::empty()).unwrap();
    let summary = controller.run().await.unwrap();

    assert_eq!(summary.status_codes.get(&500), Some(&3));
    assert!(summary.status_codes.get(&200).copied().unwrap_or(0) > 0);
    // Error statuses still count as completed exchanges
    assert_eq!(summary.success_count, summary.completed);
    assert_eq!(summary.failure_count(), 0);
}

// --- Stop and shutdown behaviour ---

#[tokio::test]
async fn stop_request_ends_run_early() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let template = get_template(&server.uri());
    let controller =
        LoadTestController::new(config(50.0, 30_000), template, RowSource::empty()).unwrap();
    let handle = controller.handle();

    let stopper = handle.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(300)).await;
        stopper.stop();
    });

    let start = Instant::now();
    let summary = controller.run().await.unwrap();
    let elapsed = start.elapsed();

    assert!(
        elapsed.as_secs() < 5,
        "stop should end a 30s run promptly, ran for {:?}",
        elapsed
    );
    assert!(
        summary.issued < 100,
        "a 300ms slice of a 50 rps run should issue far fewer than 100, issued={}",
        summary.issued
    );
    assert_eq!(handle.state(), RunState::Completed);
}

#[tokio::test]
async fn grace_period_cancels_lingering_requests() {
    let server = MockServer::start().await;

    // Responses outlive both the run and its grace window
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let template = get_template(&server.uri());
    let test_config = TestConfig {
        target_rps: 0.0,
        duration: Duration::from_millis(500),
        per_request_timeout: Duration::from_secs(60),
        max_concurrency: 4,
        substitution: SubstitutionPolicy::Lenient,
        shutdown_grace: Duration::from_millis(300),
    };

    let controller = LoadTestController::new(test_config, template, RowSource::empty()).unwrap();

    let start = Instant::now();
    let summary = controller.run().await.unwrap();
    let elapsed = start.elapsed();

    assert!(
        elapsed.as_secs() < 5,
        "cancellation should not wait out the 30s responses, ran for {:?}",
        elapsed
    );
    assert_eq!(summary.issued, 4, "one request per concurrency slot");
    assert_eq!(summary.completed, summary.issued);
    assert_eq!(summary.failure_by_kind.get("cancelled"), Some(&4));
    assert!(
        summary.latency.is_none(),
        "cancelled attempts must not pollute the latency histogram"
    );
}

#[tokio::test]
async fn state_transitions_are_observable_from_a_handle() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let template = get_template(&server.uri());
    let controller =
        LoadTestController::new(config(5.0, 10_000), template, RowSource::empty()).unwrap();
    let handle = controller.handle();
    assert_eq!(handle.state(), RunState::Idle);

    let run = tokio::spawn(controller.run());

    let mut polls = 0;
    while handle.state() != RunState::Running {
        polls += 1;
        assert!(polls < 100, "run never reached Running state");
        sleep(Duration::from_millis(10)).await;
    }

    sleep(Duration::from_millis(400)).await;
    assert!(
        handle.snapshot().issued >= 1,
        "mid-run snapshots should reflect issued requests"
    );

    handle.stop();
    let summary = run.await.unwrap().unwrap();

    assert_eq!(handle.state(), RunState::Completed);
    assert_eq!(summary.issued, handle.snapshot().issued);
}
