//! Lifecycle binding for the protocol endpoint
//!
//! `RpcService` owns an `Endpoint` and drives it through a small state
//! machine. Every state change goes through `ServiceState::can_transition_to`;
//! start and stop are serialized by the mutex that guards the endpoint.

use crate::server::ControllerServer;
use crate::shared::error::LifecycleError;
use async_trait::async_trait;
use roleplane_proto::v1::cluster_protocol_server::ClusterProtocolServer;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{PoisonError, RwLock};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tonic::transport::server::TcpIncoming;
use tonic::transport::Server;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    Created,
    Starting,
    Started,
    Stopping,
    Stopped,
    Failed,
}

impl ServiceState {
    pub fn can_transition_to(self, next: ServiceState) -> bool {
        use ServiceState::*;

        matches!(
            (self, next),
            (Created, Starting)
                | (Created, Stopped)
                | (Stopped, Starting)
                | (Starting, Started)
                | (Starting, Stopping)
                | (Starting, Failed)
                | (Started, Stopping)
                | (Stopping, Stopped)
                | (Stopping, Failed)
        )
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Created => "created",
            ServiceState::Starting => "starting",
            ServiceState::Started => "started",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
            ServiceState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Something that can listen on an address and later be shut down.
#[async_trait]
pub trait Endpoint: Send {
    /// Begin listening and return the bound local address.
    async fn start(&mut self) -> Result<SocketAddr, LifecycleError>;

    async fn stop(&mut self) -> Result<(), LifecycleError>;
}

#[derive(Debug)]
struct Status {
    state: ServiceState,
    address: Option<SocketAddr>,
}

pub struct RpcService<E> {
    name: String,
    endpoint: Mutex<Option<E>>,
    status: RwLock<Status>,
}

impl<E: Endpoint> RpcService<E> {
    pub fn new(name: impl Into<String>, endpoint: E) -> Self {
        Self::with_endpoint(name, Some(endpoint))
    }

    /// A binding with no endpoint attached. Starting it fails; stopping it
    /// does nothing.
    pub fn unbound(name: impl Into<String>) -> Self {
        Self::with_endpoint(name, None)
    }

    fn with_endpoint(name: impl Into<String>, endpoint: Option<E>) -> Self {
        Self {
            name: name.into(),
            endpoint: Mutex::new(endpoint),
            status: RwLock::new(Status {
                state: ServiceState::Created,
                address: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ServiceState {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    /// The bound address. Only available once the service has started.
    pub fn connect_address(&self) -> Result<SocketAddr, LifecycleError> {
        let status = self.status.read().unwrap_or_else(PoisonError::into_inner);
        match (status.state, status.address) {
            (ServiceState::Started, Some(address)) => Ok(address),
            (state, _) => Err(LifecycleError::NotReady(state)),
        }
    }

    fn enter(&self, next: ServiceState) -> Result<(), LifecycleError> {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        if !status.state.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition {
                from: status.state,
                to: next,
            });
        }
        status.state = next;
        if next != ServiceState::Started {
            status.address = None;
        }
        Ok(())
    }

    fn set_started(&self, address: SocketAddr) -> Result<(), LifecycleError> {
        self.enter(ServiceState::Started)?;
        self.status
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .address = Some(address);
        Ok(())
    }

    pub async fn start(&self) -> Result<SocketAddr, LifecycleError> {
        let mut guard = self.endpoint.lock().await;
        let Some(endpoint) = guard.as_mut() else {
            return Err(LifecycleError::NoEndpoint);
        };

        self.enter(ServiceState::Starting)?;
        match endpoint.start().await {
            Ok(address) => {
                self.set_started(address)?;
                info!(service = %self.name, %address, "Service started");
                Ok(address)
            }
            Err(error) => {
                warn!(service = %self.name, error = %error, "Service failed to start");
                self.enter(ServiceState::Failed)?;
                Err(error)
            }
        }
    }

    /// Stop the service. Safe to call at any time: before `start`, without an
    /// endpoint, or repeatedly.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        let mut guard = self.endpoint.lock().await;

        match self.state() {
            ServiceState::Stopped | ServiceState::Failed => return Ok(()),
            ServiceState::Created => return self.enter(ServiceState::Stopped),
            ServiceState::Starting | ServiceState::Started | ServiceState::Stopping => {}
        }

        if self.state() != ServiceState::Stopping {
            self.enter(ServiceState::Stopping)?;
        }

        let result = match guard.as_mut() {
            Some(endpoint) => endpoint.stop().await,
            None => Ok(()),
        };

        match result {
            Ok(()) => {
                self.enter(ServiceState::Stopped)?;
                info!(service = %self.name, "Service stopped");
                Ok(())
            }
            Err(error) => {
                warn!(service = %self.name, error = %error, "Service failed to stop cleanly");
                self.enter(ServiceState::Failed)?;
                Err(error)
            }
        }
    }
}

struct RunningServer {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), tonic::transport::Error>>,
}

/// Serves the cluster protocol over gRPC.
pub struct GrpcEndpoint {
    bind_addr: SocketAddr,
    server: ControllerServer,
    running: Option<RunningServer>,
}

impl GrpcEndpoint {
    pub fn new(bind_addr: SocketAddr, server: ControllerServer) -> Self {
        Self {
            bind_addr,
            server,
            running: None,
        }
    }
}

#[async_trait]
impl Endpoint for GrpcEndpoint {
    async fn start(&mut self) -> Result<SocketAddr, LifecycleError> {
        if self.running.is_some() {
            return Err(LifecycleError::Endpoint("Endpoint is already serving".to_string()));
        }

        let listener = TcpListener::bind(self.bind_addr)
            .await
            .map_err(|source| LifecycleError::Bind {
                address: self.bind_addr.to_string(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| LifecycleError::Bind {
                address: self.bind_addr.to_string(),
                source,
            })?;
        let incoming = TcpIncoming::from_listener(listener, true, None)
            .map_err(|e| LifecycleError::Endpoint(e.to_string()))?;

        let (shutdown, signal) = oneshot::channel::<()>();
        let router =
            Server::builder().add_service(ClusterProtocolServer::new(self.server.clone()));
        let handle = tokio::spawn(async move {
            router
                .serve_with_incoming_shutdown(incoming, async {
                    let _ = signal.await;
                })
                .await
        });

        self.running = Some(RunningServer { shutdown, handle });
        Ok(local_addr)
    }

    async fn stop(&mut self) -> Result<(), LifecycleError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        // The server task may already have exited; its result is reported below.
        let _ = running.shutdown.send(());
        match running.handle.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(LifecycleError::Endpoint(e.to_string())),
            Err(e) => Err(LifecycleError::Endpoint(e.to_string())),
        }
    }
}
