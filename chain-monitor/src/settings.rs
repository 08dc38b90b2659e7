use anyhow::ensure;
use config::Config;
use serde::Deserialize;
use serde_with::serde_as;
use std::time::Duration;

/// Monitor tuning, layered from the process environment over defaults.
/// All pauses and timeouts are configured in milliseconds.
#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorSettings {
    /// Initial pause between block polls.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub get_block_pause: Duration,

    /// Multiplier applied to the poll pause on empty blocks, divisor on
    /// nonempty ones. Must be strictly greater than 1.
    pub block_pause_factor: f64,

    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub block_pause_upper_limit: Duration,

    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub block_pause_lower_limit: Duration,

    /// Per-endpoint timeout of the initial block-number probe.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub web3_timeout: Duration,

    /// Pause between retries when a freshly created contract still reports
    /// empty code.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub get_bytecode_retry_pause: Duration,

    /// Retry budget for the empty-code case.
    pub initial_get_bytecode_tries: u32,

    /// Monitor the test-chain list instead of the production one.
    pub use_test_chains: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            get_block_pause: Duration::from_millis(10_000),
            block_pause_factor: 1.1,
            block_pause_upper_limit: Duration::from_millis(30_000),
            block_pause_lower_limit: Duration::from_millis(500),
            web3_timeout: Duration::from_millis(3_000),
            get_bytecode_retry_pause: Duration::from_millis(5_000),
            initial_get_bytecode_tries: 3,
            use_test_chains: false,
        }
    }
}

impl MonitorSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        let settings: MonitorSettings = Config::builder()
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.block_pause_factor > 1.0,
            "BLOCK_PAUSE_FACTOR must be greater than 1, got {}",
            self.block_pause_factor
        );
        ensure!(
            self.block_pause_lower_limit <= self.block_pause_upper_limit,
            "BLOCK_PAUSE_LOWER_LIMIT exceeds BLOCK_PAUSE_UPPER_LIMIT"
        );
        Ok(())
    }

    /// Per-chain starting-block override, `MONITOR_START_<chainId>`.
    pub fn start_block_override(chain_id: u64) -> Option<u64> {
        std::env::var(format!("MONITOR_START_{chain_id}"))
            .ok()?
            .parse()
            .ok()
    }
}
