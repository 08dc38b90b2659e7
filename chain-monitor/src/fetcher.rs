use crate::source_address::SourceAddress;
use anyhow::Context;
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use source_validation::{check_files, recognize, CheckedContract, PathBlob, SourceEntry};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::task::JoinHandle;
use url::Url;

const METADATA_FILE_NAME: &str = "metadata.json";

pub const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";
pub const DEFAULT_SWARM_GATEWAY: &str = "https://swarm-gateways.net/bzz-raw:/";

/// The decentralized-store transport: resolves a content address to bytes.
#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn retrieve(&self, address: &SourceAddress) -> anyhow::Result<Vec<u8>>;
}

/// Gateway-backed store with the usual retrying client stack.
pub struct HttpSourceStore {
    client: ClientWithMiddleware,
    ipfs_gateway: Url,
    swarm_gateway: Url,
}

impl HttpSourceStore {
    pub fn new(ipfs_gateway: Url, swarm_gateway: Url, max_retries: u32) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
        let client = reqwest_middleware::ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        Self {
            client,
            ipfs_gateway,
            swarm_gateway,
        }
    }

    fn url_for(&self, address: &SourceAddress) -> Result<Url, url::ParseError> {
        let gateway = match address {
            SourceAddress::Ipfs(_) => &self.ipfs_gateway,
            SourceAddress::Bzzr0(_) | SourceAddress::Bzzr1(_) => &self.swarm_gateway,
        };
        gateway.join(&address.location())
    }
}

impl Default for HttpSourceStore {
    fn default() -> Self {
        Self::new(
            Url::parse(DEFAULT_IPFS_GATEWAY).expect("valid url"),
            Url::parse(DEFAULT_SWARM_GATEWAY).expect("valid url"),
            3,
        )
    }
}

#[async_trait]
impl SourceStore for HttpSourceStore {
    async fn retrieve(&self, address: &SourceAddress) -> anyhow::Result<Vec<u8>> {
        let url = self.url_for(address)?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

pub type FetchCallback = Box<dyn FnOnce(CheckedContract) + Send + 'static>;

/// Resolves source addresses to checked contracts in background tasks and
/// hands results to per-fetch callbacks. `stop` cancels pending fetches and
/// suppresses further deliveries.
pub struct SourceFetcher {
    store: Arc<dyn SourceStore>,
    running: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SourceFetcher {
    pub fn new(store: Arc<dyn SourceStore>) -> Self {
        Self {
            store,
            running: Arc::new(AtomicBool::new(true)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn fetch(&self, address: SourceAddress, callback: FetchCallback) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let store = self.store.clone();
        let running = self.running.clone();
        let handle = tokio::spawn(async move {
            match assemble(store.as_ref(), &address).await {
                Ok(contract) => {
                    // stop() must win over an in-flight completion
                    if running.load(Ordering::SeqCst) {
                        callback(contract);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        storage = address.storage_key(),
                        location = %address.location(),
                        error = ?err,
                        "failed to assemble contract sources"
                    );
                }
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Retrieves the manifest, then every non-inline source it references,
/// concurrently, and reconciles the result. Sources that cannot be resolved
/// simply stay missing on the returned contract.
async fn assemble(
    store: &dyn SourceStore,
    address: &SourceAddress,
) -> anyhow::Result<CheckedContract> {
    let metadata = store.retrieve(address).await?;
    let text = String::from_utf8(metadata).context("metadata is not utf-8")?;
    let manifest = recognize(&text).context("retrieved blob is not a metadata manifest")?;

    let fetches = manifest
        .sources
        .iter()
        .filter(|(_, entry)| entry.content.is_none())
        .map(|(path, entry)| fetch_source(store, path, entry));
    let fetched: Vec<PathBlob> = join_all(fetches).await.into_iter().flatten().collect();

    let mut blobs = vec![PathBlob::new(METADATA_FILE_NAME, text)];
    blobs.extend(fetched);

    let mut contracts = check_files(blobs, None)?;
    Ok(contracts.remove(0))
}

async fn fetch_source(
    store: &dyn SourceStore,
    path: &str,
    entry: &SourceEntry,
) -> Option<PathBlob> {
    for url in &entry.urls {
        let Some(address) = SourceAddress::from_url(url) else {
            continue;
        };
        match store.retrieve(&address).await {
            Ok(bytes) => return Some(PathBlob::new(path, bytes)),
            Err(err) => {
                tracing::debug!(url = %url, error = ?err, "source fetch attempt failed");
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use source_validation::{digest_hex, keccak256};
    use std::{collections::HashMap, time::Duration};

    const STORE_SOL: &str = "pragma solidity ^0.8.0;\ncontract Store {}\n";

    struct MapStore(HashMap<SourceAddress, Vec<u8>>);

    #[async_trait]
    impl SourceStore for MapStore {
        async fn retrieve(&self, address: &SourceAddress) -> anyhow::Result<Vec<u8>> {
            self.0
                .get(address)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("not pinned"))
        }
    }

    fn multihash(fill: u8) -> Vec<u8> {
        let mut multihash = vec![0x12, 0x20];
        multihash.extend([fill; 32]);
        multihash
    }

    fn manifest_with_source_url(url: &str) -> String {
        json!({
            "compiler": {"version": "0.8.19+commit.7dd6d404"},
            "language": "Solidity",
            "output": {
                "abi": [{"inputs": [], "name": "get", "outputs": [], "type": "function"}],
                "userdoc": {"methods": {}},
                "devdoc": {"methods": {}}
            },
            "settings": {"compilationTarget": {"contracts/Store.sol": "Store"}},
            "sources": {
                "contracts/Store.sol": {
                    "keccak256": digest_hex(&keccak256(STORE_SOL)),
                    "urls": [url]
                }
            },
            "version": 1
        })
        .to_string()
    }

    fn pinned_store() -> (MapStore, SourceAddress) {
        let metadata_address = SourceAddress::Ipfs(multihash(0xaa));
        let source_address = SourceAddress::Ipfs(multihash(0xbb));
        let source_url = format!("dweb:/ipfs/{}", source_address.location());

        let mut pins = HashMap::new();
        pins.insert(
            metadata_address.clone(),
            manifest_with_source_url(&source_url).into_bytes(),
        );
        pins.insert(source_address, STORE_SOL.as_bytes().to_vec());
        (MapStore(pins), metadata_address)
    }

    #[tokio::test]
    async fn assembles_a_valid_contract() {
        let (store, metadata_address) = pinned_store();

        let contract = assemble(&store, &metadata_address).await.unwrap();
        assert!(contract.is_valid());
        assert_eq!(contract.found["contracts/Store.sol"], STORE_SOL);
    }

    #[tokio::test]
    async fn unresolvable_sources_stay_missing() {
        let (mut store, metadata_address) = pinned_store();
        store.0.remove(&SourceAddress::Ipfs(multihash(0xbb)));

        let contract = assemble(&store, &metadata_address).await.unwrap();
        assert!(!contract.is_valid());
        assert_eq!(contract.missing.len(), 1);
        assert!(contract.missing.contains_key("contracts/Store.sol"));
    }

    #[tokio::test]
    async fn delivers_through_callback() {
        let (store, metadata_address) = pinned_store();
        let fetcher = SourceFetcher::new(Arc::new(store));

        let (tx, rx) = tokio::sync::oneshot::channel();
        fetcher.fetch(
            metadata_address,
            Box::new(move |contract| {
                let _ = tx.send(contract);
            }),
        );

        let contract = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("callback within timeout")
            .expect("callback delivered");
        assert!(contract.is_valid());
    }

    #[tokio::test]
    async fn stop_prevents_delivery() {
        let (store, metadata_address) = pinned_store();
        let fetcher = SourceFetcher::new(Arc::new(store));
        fetcher.stop();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        fetcher.fetch(
            metadata_address,
            Box::new(move |contract| {
                let _ = tx.send(contract);
            }),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
