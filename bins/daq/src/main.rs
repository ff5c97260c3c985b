use clap::{Parser, Subcommand};
use daq_api::PluginError;
use daq_manager::{build_frontend, DaqConfig, Manager};
use daq_receiver::{Receiver, ReceiverBuilder, ReceiverHandler};
use daq_registry::Registry;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "daq", about = "Data acquisition pipeline: producers, converters, monitors")]
struct Cli {
    /// Log level (error, warn, info, debug, trace).
    #[arg(short = 'l', long, default_value = "info", global = true)]
    log: String,

    /// Where `start-all` records its pid for a later `stop-all`.
    #[arg(long, default_value = "daq.pid", global = true)]
    pidfile: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the converter workers described by a config file until Ctrl-C.
    StartConverter { config: String },
    /// Run the producer_sim workers described by a config file until Ctrl-C.
    StartProducer { config: String },
    /// Run a single named receiver from a config file until Ctrl-C.
    StartMonitor {
        config: String,
        /// Name of the `[[receiver]]` entry to run.
        receiver: String,
    },
    /// Run producers, converters, and all receivers together until Ctrl-C.
    StartAll { config: String },
    /// Signal a running `start-all` process (found via the pidfile) to stop.
    StopAll,
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .init();
}

fn build_registry() -> Registry {
    let mut registry = Registry::new();
    daq_plugins_builtin::register_builtin_plugins(&mut registry);
    registry
}

/// Logs every decoded message and re-logs on each refresh tick. A
/// headless stand-in for the original's Qt widgets, which rendered
/// plots/tables instead of writing log lines.
struct LoggingReceiverHandler {
    name: String,
    last: Option<Value>,
}

impl ReceiverHandler for LoggingReceiverHandler {
    fn handle_data(&mut self, data: Value) -> Result<(), PluginError> {
        tracing::info!(receiver = %self.name, data = %data, "received");
        self.last = Some(data);
        Ok(())
    }

    fn refresh_data(&mut self) -> Result<(), PluginError> {
        if let Some(data) = &self.last {
            tracing::debug!(receiver = %self.name, data = %data, "refresh");
        }
        Ok(())
    }
}

enum Section {
    Producers,
    Converters,
}

async fn run_section(config_path: &str, section: Section) {
    let registry = build_registry();
    let config = match DaqConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let manager = match section {
        Section::Producers => Manager::bootstrap_producers(&config, &registry),
        Section::Converters => Manager::bootstrap_converters(&config, &registry),
    };
    let manager = match manager {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(error = %e, "failed to bootstrap workers");
            std::process::exit(1);
        }
    };

    tracing::info!("daq started, press Ctrl+C to stop");
    manager.run_until_signal().await;
    manager.shutdown();
}

fn start_monitor(config: &DaqConfig, registry: &Registry, name: &str) -> Receiver {
    let worker = config.find_receiver(name).unwrap_or_else(|| {
        tracing::error!(receiver = %name, "no such receiver in config");
        std::process::exit(1);
    });
    let uri = worker.frontend.first().unwrap_or_else(|| {
        tracing::error!(receiver = %name, "receiver has no frontend configured");
        std::process::exit(1);
    });
    let frontend = match build_frontend(registry, worker, uri) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(error = %e, "failed to resolve receiver frontend");
            std::process::exit(1);
        }
    };
    let handler = LoggingReceiverHandler {
        name: worker.name.clone(),
        last: None,
    };
    let bidirectional = matches!(worker.connection, daq_api::ConnectionKind::Bidirectional);
    ReceiverBuilder::new(worker.name.clone(), frontend, Box::new(handler))
        .bidirectional(bidirectional)
        .max_buffer(worker.max_buffer)
        .poll_interval(worker.poll_interval())
        .start()
}

async fn run_monitor_only(config_path: &str, receiver_name: &str) {
    let registry = build_registry();
    let config = match DaqConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };
    let receiver = start_monitor(&config, &registry, receiver_name);
    tracing::info!(receiver = %receiver_name, "monitor started, press Ctrl+C to stop");
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
    receiver.stop();
}

async fn run_all(config_path: &str, pidfile: &str) {
    if let Err(e) = std::fs::write(pidfile, std::process::id().to_string()) {
        tracing::warn!(error = %e, pidfile = %pidfile, "failed to write pidfile");
    }

    let registry = build_registry();
    let config = match DaqConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let manager = match Manager::bootstrap(&config, &registry) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(error = %e, "failed to bootstrap workers");
            std::process::exit(1);
        }
    };

    let receivers: Vec<Receiver> = config
        .receiver
        .iter()
        .map(|w| start_monitor(&config, &registry, &w.name))
        .collect();

    tracing::info!(
        producers_and_converters = config.producer_sim.len() + config.converter.len(),
        receivers = receivers.len(),
        "daq started, press Ctrl+C to stop"
    );
    manager.run_until_signal().await;

    tracing::info!("shutting down");
    for receiver in receivers {
        receiver.stop();
    }
    manager.shutdown();
    let _ = std::fs::remove_file(pidfile);
}

/// Reads `pidfile` and asks the OS to terminate that process. Matches the
/// Open Question decision to keep shutdown pidfile-based rather than
/// enumerating a process tree (see DESIGN.md).
fn stop_all(pidfile: &str) {
    let pid = match std::fs::read_to_string(pidfile) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            tracing::error!(error = %e, pidfile = %pidfile, "failed to read pidfile");
            std::process::exit(1);
        }
    };

    let status = std::process::Command::new("kill")
        .arg("-TERM")
        .arg(&pid)
        .status();

    match status {
        Ok(s) if s.success() => {
            tracing::info!(pid = %pid, "sent termination signal");
            let _ = std::fs::remove_file(pidfile);
        }
        Ok(s) => {
            tracing::error!(pid = %pid, code = ?s.code(), "kill exited non-zero");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to invoke kill");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    match cli.command {
        Command::StartConverter { config } => run_section(&config, Section::Converters).await,
        Command::StartProducer { config } => run_section(&config, Section::Producers).await,
        Command::StartMonitor { config, receiver } => run_monitor_only(&config, &receiver).await,
        Command::StartAll { config } => run_all(&config, &cli.pidfile).await,
        Command::StopAll => stop_all(&cli.pidfile),
    }
}
