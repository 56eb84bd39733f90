//! Phase 1: the parent side of `run`. Grounded on `original_source/run_command.go`
//! and the `nix::sched::clone` + stack-buffer pattern used by the
//! `daikimiura-rocker` container runtime (`other_examples/`), adapted to
//! the self-reexec design this crate uses instead of an inline closure body.

use super::{RunOptions, CMD_FD_ENV};
use crate::cgroup::Cgroup;
use crate::error::{RuntimeError, RuntimeResult};
use crate::network;
use crate::paths::{generate_container_id, Paths};
use crate::workspace::{self, WorkspaceOptions};
use ipnetwork::Ipv4Network;
use nix::sched::{clone, CloneFlags};
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{pipe, Pid};
use std::os::fd::{AsRawFd, OwnedFd};
use tracing::{debug, info};

const CLONE_STACK_SIZE: usize = 1024 * 1024;

/// Run a container to completion (if `-i`) or return immediately, leaving it
/// RUNNING in the background (spec §4.H's state machine). Returns the exit
/// code the CLI should use.
pub fn run(paths: &Paths, opts: RunOptions) -> RuntimeResult<i32> {
    let container_id = generate_container_id();
    let container_name = opts.container_name.clone().unwrap_or_else(|| container_id.clone());

    info!(container_id, container_name, image = opts.image_name, "starting container");

    let self_exe = std::fs::read_link("/proc/self/exe")
        .map_err(|e| RuntimeError::io("/proc/self/exe", e))?;

    let merged = workspace::create(
        paths,
        &WorkspaceOptions {
            container_name: &container_name,
            image_name: &opts.image_name,
            volume: opts.volume.clone(),
        },
    )?;

    let (read_fd, write_fd): (OwnedFd, OwnedFd) =
        pipe().map_err(|e| RuntimeError::kernel("pipe", e))?;

    let mut clone_flags = CloneFlags::CLONE_NEWPID
        | CloneFlags::CLONE_NEWNS
        | CloneFlags::CLONE_NEWIPC
        | CloneFlags::CLONE_NEWUTS;
    let wants_network = matches!(&opts.network, Some(n) if n != "host");
    if wants_network {
        clone_flags |= CloneFlags::CLONE_NEWNET;
    }

    let child_exe = self_exe.clone();
    let child_dir = merged.clone();
    let child_fd = read_fd.as_raw_fd();

    let mut stack = vec![0u8; CLONE_STACK_SIZE];
    // SAFETY: the closure only performs async-signal-safe-ish setup (chdir,
    // setting one env var) before calling execvp, which replaces the
    // process image; nothing here allocates in a way that could deadlock
    // against a forked copy of a held lock.
    let child_pid = unsafe {
        clone(
            Box::new(move || child_entry(&child_exe, &child_dir, child_fd)),
            &mut stack,
            clone_flags,
            Some(Signal::SIGCHLD as i32),
        )
    }
    .map_err(|e| RuntimeError::kernel("clone", e))?;

    // The read end now lives only in the child's copy of the fd table.
    drop(read_fd);

    let cgroup = Cgroup::new(&container_id);
    cgroup.set(&opts.cgroup)?;
    cgroup.apply(child_pid.as_raw() as u32)?;

    let mut connection = None;
    if wants_network {
        let net_name = opts.network.clone().unwrap();
        connection = Some(connect_network(paths, &net_name, &container_id, child_pid)?);
    }

    let command_line = opts.command.join(" ");
    debug!(container_id, command_line, "sending command over pipe");
    write_command(&write_fd, &command_line)?;
    drop(write_fd);

    if !opts.create_tty {
        info!(container_id, pid = child_pid.as_raw(), "container running in background");
        return Ok(0);
    }

    let status = waitpid(child_pid, None).map_err(|e| RuntimeError::kernel("waitpid", e))?;
    let exit_code = exit_code_of(status);

    if let Some(conn) = connection {
        disconnect_network(paths, &conn);
    }
    workspace::destroy(paths, &container_name)?;
    cgroup.destroy()?;

    Ok(exit_code)
}

fn exit_code_of(status: WaitStatus) -> i32 {
    match status {
        WaitStatus::Exited(_, code) => code,
        WaitStatus::Signaled(_, sig, _) => 128 + sig as i32,
        _ => 1,
    }
}

/// Everything teardown needs to undo `connect_network`, in reverse order
/// (spec §5 ordering guarantee (e)).
struct NetworkConnection {
    host_veth: String,
    subnet: Ipv4Network,
    container_ip: std::net::Ipv4Addr,
}

/// Allocate a container IP on `net_name`, connect the veth pair, and wire
/// the container side.
fn connect_network(
    paths: &Paths,
    net_name: &str,
    container_id: &str,
    pid: Pid,
) -> RuntimeResult<NetworkConnection> {
    let net = network::load(paths, net_name)?;
    let driver = network::driver::lookup(&net.driver)?;

    let peer_name = driver.connect(net_name, container_id)?;
    let host_veth = crate::paths::host_veth_name(container_id);

    let subnet = Ipv4Network::new(net.cidr.network(), net.cidr.prefix())
        .expect("persisted cidr is always valid");
    let ipam = crate::ipam::Ipam::new(paths.ipam_path());
    let container_ip = ipam.allocate(subnet)?;
    let container_cidr = Ipv4Network::new(container_ip, net.cidr.prefix())
        .expect("ipam returns an address inside the subnet");

    if let Err(e) = network::endpoint::wire(pid.as_raw() as u32, &peer_name, container_cidr, net.gateway()) {
        let _ = ipam.release(subnet, container_ip);
        let _ = driver.disconnect(&host_veth);
        return Err(e);
    }

    debug!(container_id, %container_ip, net_name, "container connected to network");
    Ok(NetworkConnection { host_veth, subnet, container_ip })
}

fn disconnect_network(paths: &Paths, conn: &NetworkConnection) {
    let _ = network::bridge::BridgeDriver.disconnect(&conn.host_veth);
    let ipam = crate::ipam::Ipam::new(paths.ipam_path());
    let _ = ipam.release(conn.subnet, conn.container_ip);
}

fn write_command(write_fd: &OwnedFd, command_line: &str) -> RuntimeResult<()> {
    use std::io::Write;
    let mut file = std::fs::File::from(
        write_fd.try_clone_to_owned().map_err(|e| RuntimeError::io("pipe", e))?,
    );
    file.write_all(command_line.as_bytes()).map_err(|e| RuntimeError::io("pipe", e))
}

/// Runs inside the cloned child, still running the same binary image as
/// the parent (clone, unlike posix_spawn, does not exec for us). Sets the
/// command-fd env var, chdirs into the workspace, and execs itself as
/// `init`. Never returns on success.
fn child_entry(self_exe: &std::path::Path, dir: &std::path::Path, cmd_fd: i32) -> isize {
    if nix::unistd::chdir(dir).is_err() {
        return 127;
    }
    std::env::set_var(CMD_FD_ENV, cmd_fd.to_string());

    let path = std::ffi::CString::new(self_exe.as_os_str().as_encoded_bytes()).unwrap();
    let init_arg = std::ffi::CString::new("init").unwrap();
    let argv = [path.clone(), init_arg];
    let _ = nix::unistd::execv(&path, &argv);
    127
}
