use roleplane_controller::features::cluster_flex::service::FlexService;
use roleplane_controller::features::instance_directory::repo::InMemoryInstanceRepository;
use roleplane_controller::features::instance_directory::service::InstanceDirectoryService;
use roleplane_controller::{ControllerConfig, ControllerServer, GrpcEndpoint, RpcService};
use roleplane_core::JsonDescriptorCodec;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("roleplane_controller=info,info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ControllerConfig::from_env()?;

    info!(cluster = %config.cluster_name, "Starting Roleplane Controller");

    let repo = Arc::new(InMemoryInstanceRepository::new());
    let directory = Arc::new(InstanceDirectoryService::new(repo));
    let flex = Arc::new(FlexService::new(directory.clone(), config.cluster_name.clone()));
    let server = ControllerServer::new(directory, flex, Arc::new(JsonDescriptorCodec));

    let service = RpcService::new("cluster-protocol", GrpcEndpoint::new(config.bind_addr, server));
    let address = service.start().await?;

    info!(%address, "Controller initialized successfully");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    service.stop().await?;

    Ok(())
}
