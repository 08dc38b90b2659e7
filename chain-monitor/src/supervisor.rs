use crate::{
    chains::{ChainConfig, ChainList},
    fetcher::SourceFetcher,
    monitor::ChainMonitor,
    settings::MonitorSettings,
    verifier::VerifierClient,
};
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Fans out one chain monitor per configured chain and owns the shared
/// source fetcher's lifecycle.
pub struct MonitorSupervisor {
    monitors: Vec<Arc<ChainMonitor>>,
    fetcher: Arc<SourceFetcher>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MonitorSupervisor {
    pub fn new(
        chains: Vec<ChainConfig>,
        settings: MonitorSettings,
        verifier: Arc<dyn VerifierClient>,
        fetcher: Arc<SourceFetcher>,
    ) -> anyhow::Result<Self> {
        settings.validate()?;
        let monitors = chains
            .into_iter()
            .map(|chain| {
                Arc::new(ChainMonitor::new(
                    chain,
                    settings.clone(),
                    verifier.clone(),
                    fetcher.clone(),
                ))
            })
            .collect();
        Ok(Self {
            monitors,
            fetcher,
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Picks the production or test partition of the chain list, as the
    /// settings dictate.
    pub fn from_chain_list(
        list: &ChainList,
        settings: MonitorSettings,
        verifier: Arc<dyn VerifierClient>,
        fetcher: Arc<SourceFetcher>,
    ) -> anyhow::Result<Self> {
        let chains = list.select(settings.use_test_chains);
        Self::new(chains, settings, verifier, fetcher)
    }

    /// Initializes every chain monitor in parallel; chains without a working
    /// endpoint are logged and skipped.
    pub async fn start(&self) {
        let started = join_all(
            self.monitors
                .iter()
                .map(|monitor| Arc::clone(monitor).start()),
        )
        .await;

        let mut handles = self.handles.lock();
        let total = started.len();
        handles.extend(started.into_iter().flatten());
        tracing::info!(
            started = handles.len(),
            configured = total,
            "chain monitors running"
        );
    }

    /// Signals every chain monitor, then the shared fetcher. Polling loops
    /// observe the flag before their next reschedule; pending fetches are
    /// dropped without callback delivery.
    pub async fn stop(&self) {
        for monitor in &self.monitors {
            monitor.stop();
        }
        self.fetcher.stop();

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        join_all(handles).await;
    }
}
