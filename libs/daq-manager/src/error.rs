use daq_api::PluginError;

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("worker {worker}: {source}")]
    Plugin {
        worker: String,
        #[source]
        source: PluginError,
    },

    #[error("no worker named {0:?}")]
    WorkerNotFound(String),
}
