//! Network registry (module E): JSON-on-disk CRUD for named virtual
//! networks, plus the driver dispatch and IPAM coordination spec §4.E
//! describes. Grounded on `original_source/network_command.go`'s
//! `Network`/`NewNetwork`/`Save`/`Remove`, reshaped into the teacher's
//! `RuntimeResult`-returning, `tracing`-instrumented style.

pub mod bridge;
pub mod driver;
pub mod endpoint;
mod netlink;

use crate::error::{RuntimeError, RuntimeResult};
use crate::ipam::Ipam;
use crate::paths::Paths;
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use tracing::debug;

/// A persisted named network. `cidr`'s host part is always the gateway
/// address, matching the original's `IpNet.IP = gateway` convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub cidr: Ipv4Network,
    pub driver: String,
}

impl Network {
    pub fn gateway(&self) -> Ipv4Addr {
        self.cidr.ip()
    }
}

/// Create a network: allocate the gateway IP, ask the driver to create the
/// kernel object, then persist the record. Any later step's failure
/// releases the IP that was already allocated.
pub fn create(paths: &Paths, driver_tag: &str, subnet: Ipv4Network, name: &str) -> RuntimeResult<Network> {
    let path = paths.network_path(name);
    if path.exists() {
        return Err(RuntimeError::AlreadyExists(format!("the network `{name}` already exists")));
    }

    let ipam = Ipam::new(paths.ipam_path());
    let gateway = ipam.allocate(subnet)?;
    let cidr = Ipv4Network::new(gateway, subnet.prefix())
        .map_err(|e| RuntimeError::UserInput(format!("bad subnet `{subnet}`: {e}")))?;

    let driver = driver::lookup(driver_tag)?;
    if let Err(e) = driver.create(cidr, name) {
        let _ = ipam.release(subnet, gateway);
        return Err(e);
    }

    let network = Network { name: name.to_string(), cidr, driver: driver_tag.to_string() };
    if let Err(e) = save(paths, &network) {
        let _ = driver.delete(name);
        let _ = ipam.release(subnet, gateway);
        return Err(e);
    }

    debug!(name, %cidr, driver = driver_tag, "network created");
    Ok(network)
}

/// List every persisted network, creating the networks directory (empty)
/// if it does not yet exist.
pub fn list(paths: &Paths) -> RuntimeResult<Vec<Network>> {
    let dir = paths.networks_dir();
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| RuntimeError::io(&dir, e))?;
        return Ok(Vec::new());
    }

    let mut networks = Vec::new();
    for entry in std::fs::read_dir(&dir).map_err(|e| RuntimeError::io(&dir, e))? {
        let entry = entry.map_err(|e| RuntimeError::io(&dir, e))?;
        if entry.path().is_dir() {
            continue;
        }
        let contents = std::fs::read_to_string(entry.path()).map_err(|e| RuntimeError::io(entry.path(), e))?;
        networks.push(serde_json::from_str(&contents)?);
    }
    Ok(networks)
}

/// Release the gateway IP, ask the driver to delete the kernel object, and
/// remove the JSON record.
pub fn remove(paths: &Paths, name: &str) -> RuntimeResult<()> {
    let network = load(paths, name)?;
    let ipam = Ipam::new(paths.ipam_path());
    let subnet = Ipv4Network::new(network.cidr.network(), network.cidr.prefix())
        .expect("persisted cidr is always valid");
    ipam.release(subnet, network.gateway())?;

    let driver = driver::lookup(&network.driver)?;
    driver.delete(name)?;

    let path = paths.network_path(name);
    std::fs::remove_file(&path).map_err(|e| RuntimeError::io(&path, e))
}

pub fn load(paths: &Paths, name: &str) -> RuntimeResult<Network> {
    let path = paths.network_path(name);
    let contents = std::fs::read_to_string(&path)
        .map_err(|_| RuntimeError::NotFound(format!("the network `{name}` does not exist")))?;
    Ok(serde_json::from_str(&contents)?)
}

fn save(paths: &Paths, network: &Network) -> RuntimeResult<()> {
    let dir = paths.networks_dir();
    std::fs::create_dir_all(&dir).map_err(|e| RuntimeError::io(&dir, e))?;
    let path = paths.network_path(&network.name);
    let contents = serde_json::to_string(network)?;
    std::fs::write(&path, contents).map_err(|e| RuntimeError::io(&path, e))
}
