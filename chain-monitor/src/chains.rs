use serde::Deserialize;

/// One monitored chain: its numeric id and the RPC endpoints to try, in
/// failover order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub id: u64,
    pub name: String,
    pub rpc: Vec<String>,
    #[serde(default)]
    pub is_testnet: bool,
}

/// The configured chain list, production and test chains mixed; the
/// supervisor selects one of the two partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChainList(pub Vec<ChainConfig>);

impl ChainList {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn select(&self, use_test_chains: bool) -> Vec<ChainConfig> {
        self.0
            .iter()
            .filter(|chain| chain.is_testnet == use_test_chains)
            .cloned()
            .collect()
    }
}
