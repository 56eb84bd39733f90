//! Endpoint wirer (module G): moves the peer end of a veth into a
//! container's network namespace and configures it there.
//!
//! Namespace transfer is per-thread kernel state (spec §5), so the whole
//! sequence — move link, enter namespace, configure, restore namespace —
//! runs on a single-threaded Tokio runtime that never leaves the OS thread
//! that calls `block_on`, and the original namespace is restored on every
//! exit path via an RAII guard.

use super::netlink::{self, with_handle};
use crate::error::RuntimeError;
use ipnetwork::Ipv4Network;
use nix::sched::{setns, CloneFlags};
use std::fs::File;
use std::net::Ipv4Addr;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::path::Path;

/// Move `peer_name` into the netns of `pid`, assign `ip/prefix` to it,
/// bring it and loopback up, and add a default route via `gateway`.
pub fn wire(pid: u32, peer_name: &str, cidr: Ipv4Network, gateway: Ipv4Addr) -> Result<(), RuntimeError> {
    let peer_name = peer_name.to_string();
    let target_ns_path = format!("/proc/{pid}/ns/net");
    let ip = cidr.ip();
    let prefix = cidr.prefix();

    with_handle(move |host_handle| async move {
        let peer_index = netlink::link_index_by_name(&host_handle, &peer_name).await?;

        let target_ns = File::open(&target_ns_path)
            .map_err(|e| RuntimeError::io(Path::new(&target_ns_path), e))?;

        host_handle
            .link()
            .set(peer_index)
            .setns_by_fd(target_ns.as_raw_fd())
            .execute()
            .await
            .map_err(|e| RuntimeError::Netlink(format!("can't move `{peer_name}` into netns: {e}")))?;

        // Steps 5-8: enter the target namespace, configure, always restore.
        let guard = NetnsGuard::enter(target_ns.as_fd())?;

        let (connection, ns_handle, _messages) = rtnetlink::new_connection()
            .map_err(|e| RuntimeError::Netlink(format!("failed to open netlink socket in netns: {e}")))?;
        tokio::spawn(connection);

        let result: Result<(), RuntimeError> = async {
            let peer_index = netlink::link_index_by_name(&ns_handle, &peer_name).await?;

            ns_handle
                .address()
                .add(peer_index, std::net::IpAddr::V4(ip), prefix)
                .execute()
                .await
                .map_err(|e| RuntimeError::Netlink(format!("can't assign address to `{peer_name}`: {e}")))?;

            ns_handle
                .link()
                .set(peer_index)
                .up()
                .execute()
                .await
                .map_err(|e| RuntimeError::Netlink(format!("can't bring `{peer_name}` up: {e}")))?;

            let lo_index = netlink::link_index_by_name(&ns_handle, "lo").await?;
            ns_handle
                .link()
                .set(lo_index)
                .up()
                .execute()
                .await
                .map_err(|e| RuntimeError::Netlink(format!("can't bring loopback up: {e}")))?;

            ns_handle
                .route()
                .add()
                .v4()
                .gateway(gateway)
                .output_interface(peer_index)
                .execute()
                .await
                .map_err(|e| RuntimeError::Netlink(format!("can't add default route via {gateway}: {e}")))?;

            Ok(())
        }
        .await;

        drop(guard);
        result
    })
}

/// RAII guard that enters a target network namespace on construction and
/// restores the namespace the thread was in beforehand on drop — including
/// on panic/error unwind, satisfying spec §4.G step 8's "every exit path".
struct NetnsGuard {
    original: OwnedFd,
}

impl NetnsGuard {
    fn enter(target: std::os::fd::BorrowedFd<'_>) -> Result<Self, RuntimeError> {
        let original = File::open("/proc/self/ns/net")
            .map_err(|e| RuntimeError::io(Path::new("/proc/self/ns/net"), e))?;
        let original: OwnedFd = original.into();

        setns(target, CloneFlags::CLONE_NEWNET).map_err(|e| RuntimeError::kernel("setns", e))?;
        Ok(Self { original })
    }
}

impl Drop for NetnsGuard {
    fn drop(&mut self) {
        let _ = setns(self.original.as_fd(), CloneFlags::CLONE_NEWNET);
    }
}
