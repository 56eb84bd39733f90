//! Bridge network driver (module F): Linux bridge + iptables NAT, plus
//! veth-pair creation for `connect`. Grounded on `original_source/bridge.go`
//! and the `rtnetlink` usage in `orbstack-swift-nio/vinit` and the
//! `daikimiura-rocker` container runtime (`other_examples/`).

use super::driver::NetworkDriver;
use super::netlink::{self, with_handle};
use crate::error::{RuntimeError, RuntimeResult};
use crate::paths::{host_veth_name, peer_veth_name};
use ipnetwork::Ipv4Network;
use std::net::IpAddr;
use std::process::Command;
use tracing::debug;

pub struct BridgeDriver;

impl NetworkDriver for BridgeDriver {
    fn name(&self) -> &'static str {
        "bridge"
    }

    fn create(&self, cidr: Ipv4Network, name: &str) -> RuntimeResult<()> {
        let name_owned = name.to_string();
        with_handle(move |handle| async move {
            if netlink::link_exists(&handle, &name_owned).await? {
                return Err(RuntimeError::AlreadyExists(format!("network `{name_owned}` exists")));
            }

            handle
                .link()
                .add()
                .bridge(name_owned.clone())
                .execute()
                .await
                .map_err(|e| RuntimeError::Netlink(format!("can't create bridge `{name_owned}`: {e}")))?;

            let index = netlink::link_index_by_name(&handle, &name_owned).await?;

            handle
                .address()
                .add(index, IpAddr::V4(cidr.ip()), cidr.prefix())
                .execute()
                .await
                .map_err(|e| RuntimeError::Netlink(format!("can't set bridge address: {e}")))?;

            handle
                .link()
                .set(index)
                .up()
                .execute()
                .await
                .map_err(|e| RuntimeError::Netlink(format!("can't bring bridge up: {e}")))?;

            Ok(())
        })?;

        install_nat_rules(cidr, name)?;
        debug!(%cidr, name, "bridge created");
        Ok(())
    }

    fn delete(&self, name: &str) -> RuntimeResult<()> {
        let name_owned = name.to_string();
        with_handle(move |handle| async move {
            let index = netlink::link_index_by_name(&handle, &name_owned).await?;
            handle
                .link()
                .del(index)
                .execute()
                .await
                .map_err(|e| RuntimeError::Netlink(format!("can't delete bridge `{name_owned}`: {e}")))
        })
        // iptables rules installed by `create` are intentionally not removed here;
        // see DESIGN.md's Open Question decision.
    }

    fn connect(&self, network_name: &str, container_id: &str) -> RuntimeResult<String> {
        let bridge_name = network_name.to_string();
        let host_name = host_veth_name(container_id);
        let peer_name = peer_veth_name(container_id);
        let host_for_closure = host_name.clone();
        let peer_for_closure = peer_name.clone();

        with_handle(move |handle| async move {
            let bridge_index = netlink::link_index_by_name(&handle, &bridge_name).await?;

            handle
                .link()
                .add()
                .veth(host_for_closure.clone(), peer_for_closure.clone())
                .execute()
                .await
                .map_err(|e| RuntimeError::Netlink(format!("can't create veth pair: {e}")))?;

            let host_index = netlink::link_index_by_name(&handle, &host_for_closure).await?;

            handle
                .link()
                .set(host_index)
                .master(bridge_index)
                .execute()
                .await
                .map_err(|e| RuntimeError::Netlink(format!("can't enslave veth to bridge: {e}")))?;

            handle
                .link()
                .set(host_index)
                .up()
                .execute()
                .await
                .map_err(|e| RuntimeError::Netlink(format!("can't bring veth up: {e}")))?;

            Ok(())
        })?;

        debug!(bridge = network_name, host = %host_name, peer = %peer_name, "veth pair connected");
        Ok(peer_name)
    }

    fn disconnect(&self, host_veth: &str) -> RuntimeResult<()> {
        let host_owned = host_veth.to_string();
        with_handle(move |handle| async move {
            let index = netlink::link_index_by_name(&handle, &host_owned).await?;
            handle
                .link()
                .set(index)
                .down()
                .execute()
                .await
                .map_err(|e| RuntimeError::Netlink(format!("can't bring veth down: {e}")))?;
            handle
                .link()
                .del(index)
                .execute()
                .await
                .map_err(|e| RuntimeError::Netlink(format!("can't delete veth `{host_owned}`: {e}")))
        })
    }
}

/// Install the three iptables rules from spec §4.F step 5. Not idempotent:
/// calling `create` twice duplicates rules (spec's documented behaviour).
fn install_nat_rules(cidr: Ipv4Network, name: &str) -> RuntimeResult<()> {
    run_iptables(&["-t", "nat", "-A", "POSTROUTING", "-s", &cidr.to_string(), "!", "-o", name, "-j", "MASQUERADE"])?;
    run_iptables(&["-t", "filter", "-A", "FORWARD", "-i", name, "!", "-o", name, "-j", "ACCEPT"])?;
    run_iptables(&["-t", "filter", "-A", "FORWARD", "-o", name, "-j", "ACCEPT"])?;
    Ok(())
}

fn run_iptables(args: &[&str]) -> RuntimeResult<()> {
    let status = Command::new("iptables")
        .args(args)
        .status()
        .map_err(|e| RuntimeError::Subprocess { command: "iptables", detail: e.to_string() })?;
    if !status.success() {
        return Err(RuntimeError::Subprocess {
            command: "iptables",
            detail: format!("`iptables {}` exited with {status}", args.join(" ")),
        });
    }
    Ok(())
}
