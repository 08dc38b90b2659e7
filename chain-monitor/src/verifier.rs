use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use source_validation::CheckedContract;

/// A contract already known to the downstream verification service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedContract {
    pub address: Address,
    pub chain_id: u64,
    pub status: String,
}

/// Everything the monitor hands downstream for one creation.
#[derive(Debug, Clone)]
pub struct InjectRequest {
    pub contract: CheckedContract,
    pub bytecode: Bytes,
    pub creation_data: Bytes,
    pub chain_id: u64,
    pub address: Address,
}

/// The downstream verification service: bytecode comparison and repository
/// write-out live behind this seam.
#[async_trait]
pub trait VerifierClient: Send + Sync {
    /// Verified-status lookup used to skip contracts that were already
    /// processed.
    async fn find_by_address(
        &self,
        address: Address,
        chain_id: u64,
    ) -> anyhow::Result<Vec<VerifiedContract>>;

    async fn inject(&self, request: InjectRequest) -> anyhow::Result<()>;
}

/// Stub client that only logs; used when no verification service is wired.
#[derive(Debug, Default)]
pub struct LoggingVerifier;

#[async_trait]
impl VerifierClient for LoggingVerifier {
    async fn find_by_address(
        &self,
        _address: Address,
        _chain_id: u64,
    ) -> anyhow::Result<Vec<VerifiedContract>> {
        Ok(Vec::new())
    }

    async fn inject(&self, request: InjectRequest) -> anyhow::Result<()> {
        tracing::info!(
            chain_id = request.chain_id,
            address = %request.address,
            contract = %request.contract.name,
            valid = request.contract.is_valid(),
            "verified contract ready for injection"
        );
        Ok(())
    }
}
