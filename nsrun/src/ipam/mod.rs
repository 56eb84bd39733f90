//! Persistent per-subnet IP allocator (module D).
//!
//! State is a JSON map from CIDR string to an ASCII bitmap (`'1'` =
//! allocated), rewritten wholesale on every change — see spec §4.D. The
//! bitmap's offset 0 is biased by one so the first allocation always yields
//! `subnet.base + 1` (the conventional gateway address), and that slot is
//! never released.

use crate::error::{RuntimeError, RuntimeResult};
use ipnetwork::Ipv4Network;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::debug;

type SubnetsAllocation = HashMap<String, String>;

pub struct Ipam {
    state_path: PathBuf,
}

impl Ipam {
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self { state_path: state_path.into() }
    }

    /// Allocate the first free host address in `subnet`, persist, and return
    /// it. Returns `0.0.0.0` if the subnet is full (caller must treat as a
    /// failure, per spec §4.D edge cases).
    pub fn allocate(&self, subnet: Ipv4Network) -> RuntimeResult<Ipv4Addr> {
        let mut state = self.load()?;
        let key = subnet.to_string();
        let bitmap_len = 1u64 << (32 - subnet.prefix() as u32);
        let bitmap = state.entry(key.clone()).or_insert_with(|| "0".repeat(bitmap_len as usize));

        let mut bytes: Vec<u8> = bitmap.bytes().collect();
        let offset = bytes.iter().position(|&b| b == b'0');
        let Some(offset) = offset else {
            return Ok(Ipv4Addr::new(0, 0, 0, 0));
        };
        bytes[offset] = b'1';
        *bitmap = String::from_utf8(bytes).expect("bitmap stays ascii");

        let base = u32::from(subnet.network());
        let ip = Ipv4Addr::from(base.wrapping_add(offset as u32 + 1));

        self.store(&state)?;
        debug!(%subnet, %ip, offset, "ip allocated");
        Ok(ip)
    }

    /// Release `ip` from `subnet`. The gateway address (offset 0 after
    /// de-bias) must never be released; callers are responsible for not
    /// doing so (the network registry never releases it before the network
    /// itself is torn down).
    pub fn release(&self, subnet: Ipv4Network, ip: Ipv4Addr) -> RuntimeResult<()> {
        let mut state = self.load()?;
        let key = subnet.to_string();
        let base = u32::from(subnet.network());
        let offset = u32::from(ip).wrapping_sub(base).wrapping_sub(1) as usize;

        if let Some(bitmap) = state.get_mut(&key) {
            let mut bytes: Vec<u8> = bitmap.bytes().collect();
            if offset < bytes.len() {
                bytes[offset] = b'0';
            }
            *bitmap = String::from_utf8(bytes).expect("bitmap stays ascii");
        }
        self.store(&state)?;
        debug!(%subnet, %ip, offset, "ip released");
        Ok(())
    }

    fn load(&self) -> RuntimeResult<SubnetsAllocation> {
        load_subnets(&self.state_path)
    }

    fn store(&self, state: &SubnetsAllocation) -> RuntimeResult<()> {
        store_subnets(&self.state_path, state)
    }
}

fn load_subnets(path: &Path) -> RuntimeResult<SubnetsAllocation> {
    if !path.exists() {
        return Ok(SubnetsAllocation::new());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| RuntimeError::io(path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

fn store_subnets(path: &Path, state: &SubnetsAllocation) -> RuntimeResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| RuntimeError::io(parent, e))?;
    }
    let contents = serde_json::to_string(state)?;
    std::fs::write(path, contents).map_err(|e| RuntimeError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn subnet() -> Ipv4Network {
        Ipv4Network::from_str("192.168.10.0/24").unwrap()
    }

    #[test]
    fn first_allocation_is_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let ipam = Ipam::new(dir.path().join("ipam.json"));
        let ip = ipam.allocate(subnet()).unwrap();
        assert_eq!(ip, Ipv4Addr::new(192, 168, 10, 1));
    }

    #[test]
    fn successive_allocations_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let ipam = Ipam::new(dir.path().join("ipam.json"));
        let a = ipam.allocate(subnet()).unwrap();
        let b = ipam.allocate(subnet()).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, Ipv4Addr::new(192, 168, 10, 1));
        assert_eq!(b, Ipv4Addr::new(192, 168, 10, 2));
    }

    #[test]
    fn release_then_allocate_reuses_slot() {
        let dir = tempfile::tempdir().unwrap();
        let ipam = Ipam::new(dir.path().join("ipam.json"));
        let a = ipam.allocate(subnet()).unwrap();
        let b = ipam.allocate(subnet()).unwrap();
        ipam.release(subnet(), b).unwrap();
        let c = ipam.allocate(subnet()).unwrap();
        assert_eq!(b, c);
        assert_ne!(a, c);
    }
}
