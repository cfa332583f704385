use metrics_exporter_prometheus::PrometheusBuilder;
use mock_service::{Latency, MockConfig};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Serves the mock survey API on `MOCK_ADDR` (default `0.0.0.0:3002`).
///
/// `MOCK_LATENCY_MS`, `MOCK_MAX_TPS` and `MOCK_RESULT_OPEN=false` shape the answers; with
/// `METRICS_ADDR` set, call counts are exported for Prometheus.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mock_service=info,tower_http=info"));
    FmtSubscriber::builder().with_env_filter(filter).init();

    if let Some(addr) = env::<SocketAddr>("METRICS_ADDR")? {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
    }

    let mut config = MockConfig::default();
    if let Some(ms) = env::<u64>("MOCK_LATENCY_MS")? {
        config.latency = Some(Latency {
            mean: Duration::from_millis(ms),
            std_dev: Duration::from_millis(ms / 10),
        });
    }
    config.max_tps = env::<u32>("MOCK_MAX_TPS")?.and_then(NonZeroU32::new);
    if let Some(open) = env::<bool>("MOCK_RESULT_OPEN")? {
        config.fixtures.result_open = open;
    }

    let addr = env::<SocketAddr>("MOCK_ADDR")?.unwrap_or_else(|| ([0, 0, 0, 0], 3002).into());
    info!(%addr, "Mock survey service listening");
    mock_service::run(addr, config).await
}

fn env<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => Ok(Some(value.parse()?)),
        Err(_) => Ok(None),
    }
}
