use anyhow::Context;
use clap::Parser;
use mock_service::prelude::*;
use stampede::{HttpClient, ReqwestClient};
use serde_json::Value;
use stampede_survey::Cli;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_env_filter("stampede=debug,stampede_survey=debug,mock_service=debug")
            .try_init();
    });
}

#[allow(unused)]
pub async fn mock(config: MockConfig) -> MockService {
    init();
    spawn(config).await.expect("mock service starts")
}

#[allow(unused)]
pub fn client() -> Arc<dyn HttpClient> {
    Arc::new(ReqwestClient::new(Duration::from_secs(5)).expect("client builds"))
}

/// The CLI as if invoked with `args` against `service`.
#[allow(unused)]
pub fn cli(service: &MockService, args: &[&str]) -> Cli {
    let base = service.base_url();
    let mut argv = vec!["stampede-survey", "--base-url", base.as_str(), "--seed", "42"];
    argv.extend_from_slice(args);
    Cli::parse_from(argv)
}

/// Write `config` where `LOAD_CONFIG` can point at it.
#[allow(unused)]
pub fn load_config(name: &str, config: &Value) -> anyhow::Result<PathBuf> {
    let path = std::env::temp_dir().join(format!("stampede-{name}-{}.json", std::process::id()));
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)
        .with_context(|| format!("writing load config to {}", path.display()))?;
    Ok(path)
}
