use std::time::Duration;

use daq_api::WorkerConfig;
use daq_registry::Registry;
use daq_transceiver::Transceiver;

use crate::bootstrap::spawn_worker;
use crate::config::DaqConfig;
use crate::error::ManagerError;

/// Supervises the fleet of producer and converter workers described by
/// a [`DaqConfig`]: starts them all, periodically logs a liveness/drop
/// status line, and shuts the whole fleet down together. No auto-restart
/// on worker failure — a dead worker is reported, not revived. Grounded
/// on `libs/gauss-engine::bootstrap::Engine` (`bootstrap`/`shutdown`) and
/// `online_monitor/converter/converter_manager.py`'s
/// `ConverterManager.start` info/shutdown loop.
pub struct Manager {
    workers: Vec<Transceiver>,
}

impl Manager {
    /// Resolves and starts every `producer_sim` and `converter` worker
    /// in `config`. Receivers are started independently by the CLI's
    /// `start-monitor` subcommand, not by the Manager.
    pub fn bootstrap(config: &DaqConfig, registry: &Registry) -> Result<Self, ManagerError> {
        Self::bootstrap_workers(config.producer_sim.iter().chain(config.converter.iter()), registry)
    }

    /// Resolves and starts only the `producer_sim` workers in `config`,
    /// for the CLI's `start-producer` subcommand.
    pub fn bootstrap_producers(config: &DaqConfig, registry: &Registry) -> Result<Self, ManagerError> {
        Self::bootstrap_workers(config.producer_sim.iter(), registry)
    }

    /// Resolves and starts only the `converter` workers in `config`, for
    /// the CLI's `start-converter` subcommand.
    pub fn bootstrap_converters(config: &DaqConfig, registry: &Registry) -> Result<Self, ManagerError> {
        Self::bootstrap_workers(config.converter.iter(), registry)
    }

    fn bootstrap_workers<'a>(
        workers: impl Iterator<Item = &'a WorkerConfig>,
        registry: &Registry,
    ) -> Result<Self, ManagerError> {
        let mut started = Vec::new();
        for worker in workers {
            started.push(spawn_worker(registry, worker.clone())?);
        }
        Ok(Self { workers: started })
    }

    /// Runs until Ctrl-C, logging a liveness status line (received/sent/
    /// dropped counters per worker) once per `WorkerConfig::liveness_tick`.
    /// No config reload: unlike the teacher's `Engine`, there is no
    /// SIGHUP handling here (see DESIGN.md Open Question decisions).
    pub async fn run_until_signal(&self) {
        let mut ticker = tokio::time::interval(WorkerConfig::liveness_tick());
        loop {
            tokio::select! {
                _ = ticker.tick() => self.log_liveness(),
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received");
                    break;
                }
            }
        }
    }

    fn log_liveness(&self) {
        for worker in &self.workers {
            let stats = worker.stats();
            if stats.fatal {
                tracing::warn!(
                    worker = worker.name(),
                    state = %worker.state(),
                    received = stats.received,
                    sent = stats.sent,
                    dropped_inbound = stats.dropped_inbound,
                    dropped_outbound = stats.dropped_outbound,
                    decode_errors = stats.decode_errors,
                    "worker hit a fatal transport error and is no longer running"
                );
                continue;
            }
            tracing::info!(
                worker = worker.name(),
                state = %worker.state(),
                received = stats.received,
                sent = stats.sent,
                dropped_inbound = stats.dropped_inbound,
                dropped_outbound = stats.dropped_outbound,
                decode_errors = stats.decode_errors,
                "liveness"
            );
        }
    }

    /// Stops every worker and consumes the Manager. Join order is the
    /// order workers were started in (producers before converters),
    /// matching `Engine::shutdown`'s straightforward sequential join.
    pub fn shutdown(self) {
        for worker in self.workers {
            let name = worker.name().to_string();
            worker.stop();
            tracing::info!(worker = %name, "worker stopped");
        }
    }
}
