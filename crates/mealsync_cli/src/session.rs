//! Wiring of the store, transport and gateway for one CLI invocation.

use crate::client::UreqClient;
use crate::error::CliError;
use mealsync_engine::{
    ConnectivityMonitor, HttpTransport, NetworkState, ReachabilityProbe, RequestGateway,
    StoredCredentials, SyncConfig, SyncReconciler,
};
use mealsync_storage::FileStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Transport used by the CLI.
pub type CliTransport = HttpTransport<UreqClient>;

/// Global options shared by every command.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Store directory.
    pub store: PathBuf,
    /// API base URL.
    pub server: Option<String>,
    /// Skip probing and act offline.
    pub offline: bool,
}

impl SessionOptions {
    /// Opens the local store.
    pub fn open_store(&self) -> Result<Arc<FileStore>, CliError> {
        Ok(Arc::new(FileStore::open(&self.store)?))
    }
}

/// A wired-up client.
pub struct Session {
    /// The local store.
    pub store: Arc<FileStore>,
    /// Connectivity as determined at startup.
    pub monitor: ConnectivityMonitor,
    /// Entry point for meal operations.
    pub gateway: Arc<RequestGateway<CliTransport>>,
}

impl Session {
    /// Opens the store and probes the server unless `--offline` was given.
    ///
    /// Without `--server` the session is offline.
    pub async fn open(options: &SessionOptions) -> Result<Self, CliError> {
        let store = options.open_store()?;
        let server = options.server.clone().unwrap_or_default();
        let config = SyncConfig::new(server.as_str());

        let transport = Arc::new(
            HttpTransport::new(server.as_str(), UreqClient)
                .with_timeouts(config.request_timeout, config.upload_timeout),
        );

        let monitor = ConnectivityMonitor::new(NetworkState::unknown("cli"));
        let state = if options.offline || server.is_empty() {
            NetworkState::offline()
        } else if transport.probe().await {
            NetworkState::online("cli")
        } else {
            NetworkState::offline()
        };
        debug!(connected = state.connected, server = %server, "connectivity probed");
        monitor.update(state);

        let credentials = Arc::new(StoredCredentials::new(store.clone()));
        let gateway = Arc::new(RequestGateway::new(
            config,
            transport,
            store.clone(),
            credentials,
            monitor.clone(),
        ));

        Ok(Self {
            store,
            monitor,
            gateway,
        })
    }

    /// Opens a session that must reach the server.
    pub async fn open_online(options: &SessionOptions) -> Result<Self, CliError> {
        if options.server.is_none() {
            return Err(CliError::MissingServer);
        }
        Self::open(options).await
    }

    /// Returns a reconciler over this session's gateway.
    pub fn reconciler(&self) -> SyncReconciler<CliTransport> {
        SyncReconciler::new(self.gateway.clone())
    }

    /// Returns true if the server answered the startup probe.
    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }
}
