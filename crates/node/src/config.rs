// node/src/config.rs
use consensus::ConsensusParams;
use economics::EconomicConfig;
use mesh_crypto::Address;
use routing::{RouteConfig, SupportedNetwork};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub engine: EngineConfig,
    pub consensus: ConsensusParams,
    pub economics: EconomicConfig,
    pub routing: RouteConfig,
    #[serde(default)]
    pub networks: Vec<SupportedNetwork>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// The single privileged caller
    pub admin: Address,
    pub shard_count: u16,
    pub shard_capacity: usize,
    /// Reward pool seeded at startup
    pub initial_reward_pool: u64,
    /// Seed of the simulated transfer executor, random when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_seed: Option<u64>,
    /// Period of the expiry sweep in the node runtime
    pub sweep_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            admin: Address::from_low_u64(1),
            shard_count: 8,
            shard_capacity: 128,
            initial_reward_pool: 1_000_000,
            executor_seed: None,
            sweep_interval_secs: 30,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            consensus: ConsensusParams::default(),
            economics: EconomicConfig::default(),
            routing: RouteConfig::default(),
            networks: vec![
                SupportedNetwork::new(1, "ethereum", 50, 12_000, 950),
                SupportedNetwork::new(137, "polygon", 5, 2_000, 850),
                SupportedNetwork::new(42161, "arbitrum", 10, 1_000, 900),
            ],
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Check every section before anything is built from it
    pub fn validate(&self) -> anyhow::Result<()> {
        self.consensus.validate()?;
        self.economics.validate()?;
        self.routing.validate()?;
        if self.engine.shard_count == 0 || self.engine.shard_capacity == 0 {
            anyhow::bail!("shard_count and shard_capacity must be positive");
        }
        if self.engine.sweep_interval_secs == 0 {
            anyhow::bail!("sweep_interval_secs must be positive");
        }

        let mut ids: Vec<_> = self.networks.iter().map(|n| n.id).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.networks.len() {
            anyhow::bail!("duplicate network id in [[networks]]");
        }
        Ok(())
    }
}
