//! Docker API integration module
//!
//! Inspects the target container and the networks attached to it in order to
//! learn which DNS names should be resolvable from inside the container.

use crate::error::DiscoveryError;

pub mod discovery;

pub use discovery::{discover_attached_names, BollardDockerClient};

/// Container details relevant for discovery
#[derive(Debug, Clone)]
pub struct ContainerDetails {
    pub id: String,
    /// Container name, without Docker's legacy leading slash.
    pub name: String,
    /// PID of the container's init process; 0 when not running.
    pub pid: i64,
    pub networks: Vec<AttachedEndpoint>,
}

/// One network a container is attached to, as seen from that container
#[derive(Debug, Clone)]
pub struct AttachedEndpoint {
    /// Network name, used as the DNS "TLD" label on this network.
    pub network: String,
    pub network_id: String,
    /// Service aliases of the container on this network.
    pub aliases: Vec<String>,
}

/// Network details relevant for discovery
#[derive(Debug, Clone)]
pub struct NetworkDetails {
    pub id: String,
    pub name: String,
    /// Names of the containers attached to this network.
    pub containers: Vec<String>,
}

/// Docker client trait
pub trait DockerClient {
    fn inspect_container(
        &self,
        name_or_id: &str,
    ) -> impl std::future::Future<Output = Result<ContainerDetails, DiscoveryError>> + Send;
    fn inspect_network(
        &self,
        network_id: &str,
    ) -> impl std::future::Future<Output = Result<NetworkDetails, DiscoveryError>> + Send;
}
