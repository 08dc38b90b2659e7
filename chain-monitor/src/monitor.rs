use crate::{
    chains::ChainConfig,
    fetcher::SourceFetcher,
    settings::MonitorSettings,
    source_address::SourceAddress,
    verifier::{InjectRequest, VerifierClient},
};
use alloy::{
    consensus::Transaction,
    network::TransactionResponse,
    primitives::{Address, Bytes, B256},
    providers::{DynProvider, Provider, ProviderBuilder},
};
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{
    task::JoinHandle,
    time::{sleep, timeout},
};

/// A block with the transaction fields the monitor reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTxs {
    pub number: u64,
    pub transactions: Vec<TxInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInfo {
    pub hash: B256,
    pub from: Address,
    /// Absent for contract creations.
    pub to: Option<Address>,
    pub nonce: u64,
    pub input: Bytes,
}

impl TxInfo {
    pub fn is_creation(&self) -> bool {
        self.to.is_none()
    }

    /// Address the creation deploys to, derived from (sender, nonce).
    pub fn created_address(&self) -> Address {
        self.from.create(self.nonce)
    }
}

/// RPC operations the monitor needs, behind a seam so tests can script the
/// chain.
#[async_trait]
pub trait EthRpc: Send + Sync {
    async fn block_number(&self) -> anyhow::Result<u64>;
    async fn block_with_transactions(&self, number: u64) -> anyhow::Result<Option<BlockTxs>>;
    async fn code_at(&self, address: Address) -> anyhow::Result<Bytes>;
}

/// Production transport over an alloy HTTP provider.
pub struct AlloyRpc {
    provider: DynProvider,
}

impl AlloyRpc {
    pub fn connect(url: &str) -> anyhow::Result<Self> {
        let url = url.parse()?;
        Ok(Self {
            provider: ProviderBuilder::new().connect_http(url).erased(),
        })
    }
}

#[async_trait]
impl EthRpc for AlloyRpc {
    async fn block_number(&self) -> anyhow::Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn block_with_transactions(&self, number: u64) -> anyhow::Result<Option<BlockTxs>> {
        let block = self
            .provider
            .get_block_by_number(number.into())
            .full()
            .await?;
        Ok(block.map(|block| BlockTxs {
            number,
            transactions: block
                .transactions
                .into_transactions()
                // both traits expose `to`/`input`, disambiguate explicitly
                .map(|tx| TxInfo {
                    hash: TransactionResponse::tx_hash(&tx),
                    from: TransactionResponse::from(&tx),
                    to: Transaction::to(&tx),
                    nonce: Transaction::nonce(&tx),
                    input: Transaction::input(&tx).clone(),
                })
                .collect(),
        }))
    }

    async fn code_at(&self, address: Address) -> anyhow::Result<Bytes> {
        Ok(self.provider.get_code_at(address).await?)
    }
}

/// Multiplies the pause on empty blocks, divides it on nonempty ones,
/// clamped to the configured window.
fn next_pause(
    pause: std::time::Duration,
    factor: f64,
    block_found: bool,
    lower: std::time::Duration,
    upper: std::time::Duration,
) -> std::time::Duration {
    let millis = pause.as_millis() as f64;
    let next = if block_found {
        millis / factor
    } else {
        millis * factor
    };
    std::time::Duration::from_millis(next as u64).clamp(lower, upper)
}

/// One chain's polling state machine. A single task walks the block stream
/// in strict ascending order; per-creation work is spawned off the loop so
/// verification latency never stalls block progress.
pub struct ChainMonitor {
    chain: ChainConfig,
    settings: MonitorSettings,
    verifier: Arc<dyn VerifierClient>,
    fetcher: Arc<SourceFetcher>,
    running: Arc<AtomicBool>,
}

impl ChainMonitor {
    pub fn new(
        chain: ChainConfig,
        settings: MonitorSettings,
        verifier: Arc<dyn VerifierClient>,
        fetcher: Arc<SourceFetcher>,
    ) -> Self {
        Self {
            chain,
            settings,
            verifier,
            fetcher,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain.id
    }

    /// Probes the configured endpoints and, on success, spawns the polling
    /// loop. Returns `None` when no endpoint answered, in which case the
    /// monitor is already stopped.
    pub async fn start(self: Arc<Self>) -> Option<JoinHandle<()>> {
        let (rpc, probed_block) = self.initialize().await?;
        let start_block =
            MonitorSettings::start_block_override(self.chain.id).unwrap_or(probed_block);
        tracing::info!(
            chain_id = self.chain.id,
            start_block,
            "chain monitor initialized"
        );
        Some(tokio::spawn(async move {
            self.poll_loop(rpc, start_block).await;
        }))
    }

    pub fn start_with_rpc(self: Arc<Self>, rpc: Arc<dyn EthRpc>, start_block: u64) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.poll_loop(rpc, start_block).await;
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn initialize(&self) -> Option<(Arc<dyn EthRpc>, u64)> {
        for url in &self.chain.rpc {
            let rpc = match AlloyRpc::connect(url) {
                Ok(rpc) => rpc,
                Err(err) => {
                    tracing::warn!(chain_id = self.chain.id, url = %url, error = ?err, "invalid rpc endpoint");
                    continue;
                }
            };
            match timeout(self.settings.web3_timeout, rpc.block_number()).await {
                Ok(Ok(block_number)) => return Some((Arc::new(rpc), block_number)),
                Ok(Err(err)) => {
                    tracing::warn!(chain_id = self.chain.id, url = %url, error = ?err, "endpoint probe failed");
                }
                Err(_) => {
                    tracing::warn!(chain_id = self.chain.id, url = %url, "endpoint probe timed out");
                }
            }
        }
        tracing::error!(
            chain_id = self.chain.id,
            "no working rpc endpoint, chain monitor will not start"
        );
        None
    }

    async fn poll_loop(self: Arc<Self>, rpc: Arc<dyn EthRpc>, mut current_block: u64) {
        let lower = self.settings.block_pause_lower_limit;
        let upper = self.settings.block_pause_upper_limit;
        let factor = self.settings.block_pause_factor;
        let mut pause = self.settings.get_block_pause.clamp(lower, upper);

        while self.running.load(Ordering::SeqCst) {
            sleep(pause).await;
            // stop() wins over a timer that already elapsed
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            match rpc.block_with_transactions(current_block).await {
                Ok(Some(block)) => {
                    pause = next_pause(pause, factor, true, lower, upper);
                    self.process_block(&rpc, block).await;
                    current_block += 1;
                }
                Ok(None) => {
                    pause = next_pause(pause, factor, false, lower, upper);
                    tracing::debug!(
                        chain_id = self.chain.id,
                        block = current_block,
                        pause_ms = pause.as_millis() as u64,
                        "block not mined yet"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        chain_id = self.chain.id,
                        block = current_block,
                        error = ?err,
                        "failed to fetch block"
                    );
                }
            }
        }
        tracing::info!(chain_id = self.chain.id, "chain monitor stopped");
    }

    async fn process_block(self: &Arc<Self>, rpc: &Arc<dyn EthRpc>, block: BlockTxs) {
        for tx in block.transactions {
            if !tx.is_creation() {
                continue;
            }
            let address = tx.created_address();
            tracing::info!(
                chain_id = self.chain.id,
                block = block.number,
                tx = %tx.hash,
                address = %address,
                "contract creation detected"
            );

            match self.verifier.find_by_address(address, self.chain.id).await {
                Ok(existing) if !existing.is_empty() => {
                    tracing::debug!(
                        chain_id = self.chain.id,
                        address = %address,
                        "contract already verified, skipping"
                    );
                    continue;
                }
                Ok(_) => {}
                Err(err) => {
                    // treat lookup failures as "not verified yet"
                    tracing::warn!(chain_id = self.chain.id, address = %address, error = ?err, "verified-status lookup failed");
                }
            }

            let monitor = Arc::clone(self);
            let rpc = Arc::clone(rpc);
            tokio::spawn(async move {
                monitor
                    .process_bytecode(
                        rpc,
                        tx.input,
                        address,
                        monitor.settings.initial_get_bytecode_tries,
                    )
                    .await;
            });
        }
    }

    /// Fetches deployed code, retrying while the deployment has not
    /// finalized, then resolves the embedded metadata pointer and enqueues a
    /// source fetch whose completion injects downstream.
    async fn process_bytecode(
        &self,
        rpc: Arc<dyn EthRpc>,
        creation_data: Bytes,
        address: Address,
        mut tries_left: u32,
    ) {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }

            let code = match rpc.code_at(address).await {
                Ok(code) => code,
                Err(err) => {
                    tracing::warn!(chain_id = self.chain.id, address = %address, error = ?err, "code fetch failed");
                    Bytes::new()
                }
            };

            if code.is_empty() {
                tries_left = tries_left.saturating_sub(1);
                if tries_left == 0 {
                    // deployment never materialized; give up silently
                    return;
                }
                sleep(self.settings.get_bytecode_retry_pause).await;
                continue;
            }

            match SourceAddress::from_deployed_code(&code) {
                Ok(source_address) => {
                    let verifier = self.verifier.clone();
                    let chain_id = self.chain.id;
                    self.fetcher.fetch(
                        source_address,
                        Box::new(move |contract| {
                            tokio::spawn(inject(
                                verifier,
                                InjectRequest {
                                    contract,
                                    bytecode: code,
                                    creation_data,
                                    chain_id,
                                    address,
                                },
                            ));
                        }),
                    );
                }
                Err(err) => {
                    tracing::info!(
                        chain_id = self.chain.id,
                        address = %address,
                        error = %err,
                        "deployed code carries no metadata pointer, skipping"
                    );
                }
            }
            return;
        }
    }
}

async fn inject(verifier: Arc<dyn VerifierClient>, request: InjectRequest) {
    let (chain_id, address) = (request.chain_id, request.address);
    match verifier.inject(request).await {
        Ok(()) => {
            tracing::info!(chain_id, address = %address, "contract injected into verification service");
        }
        Err(err) => {
            tracing::warn!(chain_id, address = %address, error = ?err, "injection failed");
        }
    }
}
