mod collector;
mod controller;
mod notifier;
mod policy;
mod watchdog;
mod worker;

use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::models::DashboardStats;
use crate::services::Assembler;

use collector::TrendCollector;
pub use controller::{Controller, PipelineState};
use notifier::Notifier;
use watchdog::Watchdog;
use worker::GenerationWorker;

/// The running pipeline: one collector, a bounded worker pool, the
/// watchdog, and the notifier, all coordinating through the store.
///
/// Also the command surface consumed by the presentation layer.
pub struct Pipeline {
    repository: Arc<Repository>,
    controller: Controller,
    handles: Vec<JoinHandle<()>>,
}

impl Pipeline {
    pub fn spawn(
        repository: Arc<Repository>,
        assembler: Arc<dyn Assembler>,
        start_paused: bool,
    ) -> Self {
        let controller = Controller::new(start_paused);
        let mut handles = Vec::new();

        let collector = TrendCollector::new(Arc::clone(&repository), controller.subscribe());
        handles.push(tokio::spawn(collector.run()));

        for worker_id in 0..policy::WORKER_COUNT {
            let worker = GenerationWorker::new(
                worker_id,
                Arc::clone(&repository),
                Arc::clone(&assembler),
                controller.subscribe(),
            );
            handles.push(tokio::spawn(worker.run()));
        }

        let watchdog = Watchdog::new(Arc::clone(&repository), controller.subscribe());
        handles.push(tokio::spawn(watchdog.run()));

        let notifier = Notifier::new(Arc::clone(&repository), controller.subscribe());
        handles.push(tokio::spawn(notifier.run()));

        Self {
            repository,
            controller,
            handles,
        }
    }

    pub fn set_running(&self, running: bool) {
        self.controller.set_running(running);
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_running()
    }

    pub async fn get_config(&self) -> Result<Config> {
        self.repository.load_config().await
    }

    #[allow(dead_code)] // consumed by the settings collaborator, not the daemon
    pub async fn save_config(&self, config: Config) -> Result<()> {
        self.repository.save_config(config).await
    }

    pub async fn get_stats(&self) -> Result<DashboardStats> {
        self.repository.get_stats().await
    }

    /// Stop issuing new work and wait for every task loop to wind down.
    /// In-flight stages finish first; nothing is aborted mid-stage.
    pub async fn shutdown(self) {
        self.controller.stop();
        join_all(self.handles).await;
    }
}
