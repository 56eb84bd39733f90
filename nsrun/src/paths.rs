//! Path & ID helpers (module A).
//!
//! Builds every on-disk artefact path from one root, and mints container IDs.
//! No collision checking on IDs: 32 base-36 characters is ~165 bits, plenty
//! for a short-lived CLI invocation (see spec §4.A).

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const ID_LEN: usize = 32;
const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `IFNAMSIZ - 1`: the longest a Linux interface name may be.
pub const IFNAMSIZ_MAX: usize = 15;

/// Resolved state-directory layout for one CLI invocation.
///
/// Constructed once from `NSRUN_STATE_DIR` (falling back to
/// `/var/run/nsrun`) and threaded through every subsystem — there is no
/// process-wide global, matching the design note that all state is on disk.
#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    pub fn from_env() -> Self {
        let root = std::env::var_os("NSRUN_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/var/run/nsrun"));
        Self { root }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn containers_dir(&self) -> PathBuf {
        self.root.join("containers")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn networks_dir(&self) -> PathBuf {
        self.root.join("networks")
    }

    pub fn ipam_path(&self) -> PathBuf {
        self.root.join("ipam.json")
    }

    pub fn container_dir(&self, name: &str) -> PathBuf {
        self.containers_dir().join(name)
    }

    pub fn container_merged_dir(&self, name: &str) -> PathBuf {
        self.container_dir(name).join("merged")
    }

    pub fn container_upper_dir(&self, name: &str) -> PathBuf {
        self.container_dir(name).join("upper")
    }

    pub fn container_work_dir(&self, name: &str) -> PathBuf {
        self.container_dir(name).join("work")
    }

    pub fn image_path(&self, image: &str) -> PathBuf {
        self.images_dir().join(image)
    }

    pub fn image_tar_path(&self, image: &str) -> PathBuf {
        self.images_dir().join(format!("{image}.tar"))
    }

    pub fn network_path(&self, name: &str) -> PathBuf {
        self.networks_dir().join(name)
    }
}

/// 32 independently-chosen base-36 characters, seeded from a high-resolution
/// clock reading. No uniqueness guarantee is made or needed.
pub fn generate_container_id() -> String {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0xA5A5_5A5A_1234_5678);
    let mut rng = SmallRng::seed_from_u64(seed ^ (std::process::id() as u64));
    (0..ID_LEN)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Host-side veth name: first 5 characters of the container ID.
pub fn host_veth_name(container_id: &str) -> String {
    container_id.chars().take(5).collect()
}

/// Peer-side veth name: `cif-<first 5 chars>`.
pub fn peer_veth_name(container_id: &str) -> String {
    format!("cif-{}", host_veth_name(container_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_32_base36_chars() {
        let id = generate_container_id();
        assert_eq!(id.len(), ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn veth_names_fit_ifnamsiz() {
        let id = generate_container_id();
        assert!(host_veth_name(&id).len() <= IFNAMSIZ_MAX);
        assert!(peer_veth_name(&id).len() <= IFNAMSIZ_MAX);
    }

    #[test]
    fn paths_are_rooted_consistently() {
        let p = Paths::with_root("/tmp/nsrun-test");
        assert_eq!(p.container_merged_dir("abc"), PathBuf::from("/tmp/nsrun-test/containers/abc/merged"));
        assert_eq!(p.image_tar_path("busybox"), PathBuf::from("/tmp/nsrun-test/images/busybox.tar"));
    }
}
