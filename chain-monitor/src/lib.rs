mod chains;
mod fetcher;
mod monitor;
mod settings;
mod source_address;
mod supervisor;
mod verifier;

pub use chains::{ChainConfig, ChainList};
pub use fetcher::{FetchCallback, HttpSourceStore, SourceFetcher, SourceStore};
pub use monitor::{AlloyRpc, BlockTxs, ChainMonitor, EthRpc, TxInfo};
pub use settings::MonitorSettings;
pub use source_address::{DecodeError, SourceAddress};
pub use supervisor::MonitorSupervisor;
pub use verifier::{InjectRequest, LoggingVerifier, VerifiedContract, VerifierClient};
