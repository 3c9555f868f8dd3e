//! Attached-network and name discovery
//!
//! Takes on the position of the "center" container and inspects the networks
//! attached to it, then queries the containers on those networks for their
//! names and service aliases. Container names are unambiguous, network names
//! are not, which is why networks are always chased by ID.

use std::collections::{BTreeSet, HashMap};

use bollard::query_parameters::{InspectContainerOptions, InspectNetworkOptions};
use bollard::Docker;
use tracing::{debug, warn};

use crate::dig::NetworkDescriptor;
use crate::docker::{AttachedEndpoint, ContainerDetails, DockerClient, NetworkDetails};
use crate::error::DiscoveryError;
use crate::netns::NetnsRef;

/// Docker client implementation backed by bollard
pub struct BollardDockerClient {
    docker: Docker,
}

impl BollardDockerClient {
    /// Connects to the Docker daemon via the default local socket.
    pub fn new() -> Result<Self, DiscoveryError> {
        let docker = Docker::connect_with_socket_defaults()
            .map_err(|e| DiscoveryError::ConnectionFailed(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Connects to the Docker daemon via a custom socket path.
    pub fn with_socket(socket_path: &str) -> Result<Self, DiscoveryError> {
        let docker = Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
            .map_err(|e| DiscoveryError::ConnectionFailed(e.to_string()))?;
        Ok(Self { docker })
    }
}

fn api_error(container: &str, err: bollard::errors::Error) -> DiscoveryError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => DiscoveryError::ContainerNotFound {
            container: container.to_string(),
        },
        other => DiscoveryError::Api(other.to_string()),
    }
}

impl DockerClient for BollardDockerClient {
    async fn inspect_container(&self, name_or_id: &str) -> Result<ContainerDetails, DiscoveryError> {
        let details = self
            .docker
            .inspect_container(name_or_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| api_error(name_or_id, e))?;

        let name = details
            .name
            .unwrap_or_default()
            .trim_start_matches('/') // Docker's "/name" legacy
            .to_string();
        let pid = details.state.and_then(|state| state.pid).unwrap_or(0);
        let networks = details
            .network_settings
            .and_then(|settings| settings.networks)
            .unwrap_or_default()
            .into_iter()
            .map(|(network, endpoint)| AttachedEndpoint {
                network,
                network_id: endpoint.network_id.unwrap_or_default(),
                aliases: endpoint.aliases.unwrap_or_default(),
            })
            .collect();

        Ok(ContainerDetails {
            id: details.id.unwrap_or_default(),
            name,
            pid,
            networks,
        })
    }

    async fn inspect_network(&self, network_id: &str) -> Result<NetworkDetails, DiscoveryError> {
        let details = self
            .docker
            .inspect_network(network_id, None::<InspectNetworkOptions>)
            .await
            .map_err(|e| DiscoveryError::Api(e.to_string()))?;

        let containers = details
            .containers
            .unwrap_or_default()
            .into_values()
            .filter_map(|container| container.name)
            .collect();

        Ok(NetworkDetails {
            id: details.id.unwrap_or_default(),
            name: details.name.unwrap_or_default(),
            containers,
        })
    }
}

/// Discovers the networks attached to the center container together with the
/// DNS names visible on each of them, plus the reference to the container's
/// network namespace.
///
/// Every attached network is inspected for its (other) attached containers,
/// and those containers in turn for their aliases on that network; a name
/// appears at most once per network and the center's own name is left out.
/// Peer containers shared between several networks are inspected only once,
/// and peers that vanish mid-walk are skipped.
pub async fn discover_attached_names<D: DockerClient>(
    client: &D,
    center: &str,
) -> Result<(Vec<NetworkDescriptor>, NetnsRef), DiscoveryError> {
    let center_details = client.inspect_container(center).await?;
    if center_details.pid == 0 {
        return Err(DiscoveryError::NotRunning {
            container: center.to_string(),
        });
    }
    let netns = NetnsRef::from_pid(center_details.pid);

    let mut peer_cache: HashMap<String, ContainerDetails> = HashMap::new();
    let mut networks = Vec::with_capacity(center_details.networks.len());
    for attached in &center_details.networks {
        let net = client.inspect_network(&attached.network_id).await?;
        let mut names = BTreeSet::new();
        for peer_name in &net.containers {
            if *peer_name == center_details.name {
                continue;
            }
            // the link from a network to its containers is by name, not ID
            if !peer_cache.contains_key(peer_name) {
                match client.inspect_container(peer_name).await {
                    Ok(details) => {
                        peer_cache.insert(peer_name.clone(), details);
                    }
                    Err(e) => {
                        debug!("skipping peer container {peer_name}: {e}");
                        continue;
                    }
                }
            }
            let Some(peer) = peer_cache.get(peer_name) else {
                continue;
            };
            names.insert(peer_name.clone());
            for endpoint in &peer.networks {
                if endpoint.network == attached.network {
                    names.extend(endpoint.aliases.iter().cloned());
                }
            }
        }
        if names.is_empty() {
            warn!("network {} has no other containers attached", attached.network);
            continue;
        }
        networks.push(NetworkDescriptor {
            label: attached.network.clone(),
            labels: names.into_iter().collect(),
        });
    }
    Ok((networks, netns))
}
