use tokio::time::Duration;

use tracing::info;

use crate::config::TestConfig;

/// Idle connections are kept warm longer than any sane pause between
/// scheduled requests.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

/// Builds the shared HTTP client used by every request in a run.
///
/// The connection pool is sized to the configured concurrency limit so
/// that a saturated run can keep one warm connection per in-flight
/// request instead of re-handshaking under load.
pub fn build_client(config: &TestConfig) -> Result<reqwest::Client, reqwest::Error> {
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(config.max_concurrency)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .tcp_keepalive(TCP_KEEPALIVE)
        .build()?;

    info!(
        pool_max_idle_per_host = config.max_concurrency,
        "HTTP client configured"
    );

    Ok(client)
}
