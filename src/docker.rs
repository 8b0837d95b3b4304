use serde::Deserialize;
use std::collections::HashMap;
use std::process::Command;
use tracing::{debug, warn};

/// Seam for resolving a container-network IP to a container name, so the
/// directory builder can be tested without a container runtime.
pub trait ContainerLookup {
    fn name_for_ip(&mut self, ip: &str) -> Option<String>;
}

/// Live container inventory queried through the docker CLI.
///
/// The runtime is an optional collaborator: a missing CLI, an unreachable
/// daemon, or unparseable output all degrade to an empty inventory, warned
/// once and cached for the remainder of the run.
pub struct DockerInventory {
    name_by_ip: Option<HashMap<String, String>>,
}

impl DockerInventory {
    pub fn new() -> Self {
        Self { name_by_ip: None }
    }

    fn inventory(&mut self) -> &HashMap<String, String> {
        self.name_by_ip.get_or_insert_with(|| match query_containers() {
            Ok(map) => map,
            Err(err) => {
                warn!(?err, "container runtime unavailable, proxy targets resolve to ?");
                HashMap::new()
            }
        })
    }
}

impl Default for DockerInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerLookup for DockerInventory {
    fn name_for_ip(&mut self, ip: &str) -> Option<String> {
        self.inventory().get(ip).cloned()
    }
}

#[derive(Debug, Deserialize)]
struct ContainerInspect {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "NetworkSettings", default)]
    network_settings: NetworkSettings,
}

#[derive(Debug, Default, Deserialize)]
struct NetworkSettings {
    #[serde(rename = "Networks", default)]
    networks: HashMap<String, NetworkEndpoint>,
}

#[derive(Debug, Deserialize)]
struct NetworkEndpoint {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
}

fn query_containers() -> anyhow::Result<HashMap<String, String>> {
    let ids = Command::new("docker")
        .args(["ps", "--quiet"])
        .output()
        .map_err(anyhow::Error::from)
        .and_then(|output| {
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            } else {
                Err(anyhow::anyhow!(
                    "docker ps exited with {}",
                    output.status
                ))
            }
        })?;

    let ids: Vec<&str> = ids.split_whitespace().collect();
    if ids.is_empty() {
        debug!("no running containers");
        return Ok(HashMap::new());
    }

    let output = Command::new("docker")
        .arg("inspect")
        .args(&ids)
        .output()?;
    if !output.status.success() {
        anyhow::bail!("docker inspect exited with {}", output.status);
    }

    let containers: Vec<ContainerInspect> = serde_json::from_slice(&output.stdout)?;
    Ok(index_by_ip(&containers))
}

/// Inverts the inventory into ip -> name across every attached network.
fn index_by_ip(containers: &[ContainerInspect]) -> HashMap<String, String> {
    let mut name_by_ip = HashMap::new();
    for container in containers {
        // docker inspect reports names with a leading slash.
        let name = container.name.trim_start_matches('/').to_string();
        for endpoint in container.network_settings.networks.values() {
            if !endpoint.ip_address.is_empty() {
                name_by_ip
                    .entry(endpoint.ip_address.clone())
                    .or_insert_with(|| name.clone());
            }
        }
    }
    name_by_ip
}
