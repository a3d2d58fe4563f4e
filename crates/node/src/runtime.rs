// node/src/runtime.rs
use crate::engine::{EngineStatus, HopMeshEngine, SweepReport};
use crate::NodeConfig;
use mesh_core::{Clock, SystemClock};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

pub struct Node {
    config: NodeConfig,
    engine: Arc<Mutex<HopMeshEngine>>,
    clock: Arc<dyn Clock>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    pub fn new(config: NodeConfig) -> anyhow::Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: NodeConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        tracing::info!("Initializing engine components");
        config.validate()?;

        let engine = HopMeshEngine::from_config(&config, clock.now())?;

        tracing::info!(
            "✓ Engine initialized: {} shards x {}, {} networks",
            config.engine.shard_count,
            config.engine.shard_capacity,
            config.networks.len()
        );

        Ok(Self {
            config,
            engine: Arc::new(Mutex::new(engine)),
            clock,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub async fn start(self: Arc<Self>) -> anyhow::Result<()> {
        tracing::info!("Starting hop-mesh node");

        self.start_maintenance().await;

        tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        tracing::info!("  Node is running");
        tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        tracing::info!("  Admin:    {}", self.config.engine.admin);
        tracing::info!("  Networks: {}", self.config.networks.len());
        tracing::info!("  Sweep:    every {}s", self.config.engine.sweep_interval_secs);
        tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!("Shutting down node...");

        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }

        let status = self.status().await?;
        tracing::info!(
            "Final state: {} validators, reward pool {}, throttle {}",
            status.validators,
            status.reward_pool,
            status.throttle_mode
        );
        tracing::info!("Node shutdown complete");
        Ok(())
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<Mutex<HopMeshEngine>> {
        &self.engine
    }

    pub async fn status(&self) -> anyhow::Result<EngineStatus> {
        Ok(self.engine.lock().await.status()?)
    }

    /// One maintenance pass: expire abandoned proofs, time out stale routes
    /// and hand buffered events to the log
    pub async fn sweep_once(&self) -> anyhow::Result<SweepReport> {
        let engine = self.engine.lock().await;
        let report = engine.sweep(self.clock.now())?;
        let events = engine.drain_events()?;
        drop(engine);

        if !report.is_empty() {
            tracing::info!(
                "Sweep closed {} proofs and {} routes",
                report.expired_proofs.len(),
                report.timed_out_routes.len()
            );
        }
        for event in &events {
            tracing::debug!(?event, "indexed");
        }
        Ok(report)
    }

    // ==================== BACKGROUND TASKS ====================

    async fn start_maintenance(self: &Arc<Self>) {
        let node = self.clone();
        let period = self.config.engine.sweep_interval_secs;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(period));
            loop {
                ticker.tick().await;
                if let Err(e) = node.sweep_once().await {
                    tracing::warn!("Maintenance sweep failed: {}", e);
                }
            }
        });
        self.tasks.lock().await.push(handle);

        tracing::info!("✓ Maintenance sweep started");
    }
}
