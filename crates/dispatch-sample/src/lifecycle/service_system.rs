use crate::clients::UsersClient;
use crate::config::SampleConfig;
use crate::error::SampleError;
use crate::gateway::Gateway;
use crate::services::{ColorPlugin, IdGenerator, UsersService};
use action_dispatch::{
    handler_fn, ActionListener, ActionTransport, ClientConfig, Dispatcher, RemoteClient,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Pattern the front dispatcher forwards to the users listener.
pub const USERS_PROXY: &str = "role:users";

/// The running sample: a users listener, a front dispatcher and its gateway.
pub struct ServiceSystem {
    /// Entry point for inbound requests.
    pub gateway: Gateway,

    /// The dispatcher requests land on.
    pub front: Dispatcher,

    /// Typed access to the users service through the front dispatcher.
    pub users: UsersClient,

    /// Connection to the users listener.
    pub remote: Arc<RemoteClient>,

    /// Ids handed out by the front `generate:id` action.
    pub ids: IdGenerator,

    listener: ActionListener,
    sweepers: Vec<JoinHandle<()>>,
}

impl ServiceSystem {
    /// Starts every service described by `config`.
    pub async fn start(config: SampleConfig) -> Result<Self, SampleError> {
        // =====================================================================
        // 1. Users service behind a TCP listener
        // =====================================================================
        let backend = Dispatcher::with_config(config.dispatcher.clone());
        backend.use_plugin(&UsersService::default())?;
        let listener = ActionListener::bind(&config.listener, backend.clone()).await?;

        // =====================================================================
        // 2. Remote client, aimed at our own listener unless configured
        // =====================================================================
        let client_config = config.remote.clone().unwrap_or_else(|| {
            let addr = listener.local_addr();
            ClientConfig::new(addr.ip().to_string(), addr.port())
        });
        let remote = Arc::new(RemoteClient::new(client_config));

        // =====================================================================
        // 3. Front dispatcher: local plugins plus the users proxy
        // =====================================================================
        let front = Dispatcher::with_config(config.dispatcher.clone());
        front.use_plugin(&ColorPlugin::new(config.color.clone()))?;
        let ids = match &config.id_cache {
            Some(cache) => IdGenerator::cached(cache.clone()),
            None => IdGenerator::new(),
        };
        front.use_plugin(&ids)?;

        let proxy = remote.clone();
        front.add(
            USERS_PROXY,
            handler_fn(move |msg, _ctx| {
                let proxy = proxy.clone();
                async move { proxy.act(msg).await }
            }),
        )?;

        let mut sweepers = Vec::new();
        if let Some(interval) = config.dispatcher.sweep_interval() {
            sweepers.push(backend.spawn_sweeper(interval));
            sweepers.push(front.spawn_sweeper(interval));
        }

        let transport: Arc<dyn ActionTransport> = Arc::new(front.clone());
        info!(addr = %listener.local_addr(), "Service system started");

        Ok(Self {
            gateway: Gateway::new(transport.clone()),
            front,
            users: UsersClient::new(transport),
            remote,
            ids,
            listener,
            sweepers,
        })
    }

    /// Address the users listener is bound to.
    pub fn listener_addr(&self) -> std::net::SocketAddr {
        self.listener.local_addr()
    }

    /// Gracefully shuts the system down.
    ///
    /// Stops the listener first so no new remote work arrives, then drops the
    /// client connection and ends the sweepers.
    pub async fn shutdown(self) -> Result<(), SampleError> {
        info!("Shutting down system...");

        self.listener.shutdown().await;
        self.remote.close().await;

        for sweeper in self.sweepers {
            sweeper.abort();
            match sweeper.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    error!("Sweeper task failed: {:?}", e);
                    return Err(SampleError::Task(format!("{e:?}")));
                }
            }
        }

        info!("System shutdown complete.");
        Ok(())
    }
}
