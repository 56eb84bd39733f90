//! `nsrun` — a minimal Linux container runtime.
//!
//! See `SPEC_FULL.md` at the repository root for the full design. The
//! module layout follows spec §4's component table: [`paths`] (A),
//! [`cgroup`] (B), [`workspace`] (C), [`ipam`] (D), [`network`] (E/F/G), and
//! [`container`] (H).

pub mod cgroup;
pub mod cli;
pub mod container;
pub mod error;
pub mod image;
pub mod ipam;
pub mod logging;
pub mod network;
pub mod paths;
pub mod workspace;

use cli::{Cmd, NetworkCmd};
use error::RuntimeResult;
use paths::Paths;

/// Dispatch a parsed CLI invocation. Returns the process exit code.
pub fn dispatch(paths: &Paths, cmd: Cmd) -> RuntimeResult<i32> {
    match cmd {
        Cmd::Run {
            tty,
            name,
            cpu_shares,
            cpu_period,
            cpu_quota,
            cpuset_cpus,
            cpus,
            volume,
            net,
            image,
            command,
            memory: _,
        } => {
            let opts = container::RunOptions {
                create_tty: tty,
                container_name: name,
                image_name: image,
                command,
                volume: volume.as_deref().map(workspace::VolumeSpec::parse).transpose()?,
                network: net,
                cgroup: cgroup::CgroupConfig {
                    cpu_shares,
                    cpu_period_us: cpu_period,
                    cpu_quota_us: cpu_quota,
                    cpus,
                    cpuset_cpus,
                },
            };
            container::launcher::run(paths, opts)
        }

        Cmd::Init => {
            container::init::run()?;
            unreachable!("init only returns on error, which is propagated above")
        }

        Cmd::Import { file, image } => {
            image::import(paths, &file, &image)?;
            Ok(0)
        }

        Cmd::Commit { container, image } => {
            image::commit(paths, &container, &image)?;
            Ok(0)
        }

        Cmd::Network { command } => match command {
            NetworkCmd::Create { driver, subnet, name } => {
                network::create(paths, &driver, subnet, &name)?;
                Ok(0)
            }
            NetworkCmd::List => {
                let networks = network::list(paths)?;
                print_network_table(&networks);
                Ok(0)
            }
            NetworkCmd::Remove { name } => {
                network::remove(paths, &name)?;
                Ok(0)
            }
        },
    }
}

/// `NAME  IpNet  Driver` columns, mirroring `original_source/network_command.go`'s
/// `tabwriter` output without pulling in a table-formatting crate (the
/// teacher doesn't use one either).
fn print_network_table(networks: &[network::Network]) {
    let name_width = networks.iter().map(|n| n.name.len()).max().unwrap_or(4).max(4);
    let cidr_width = networks
        .iter()
        .map(|n| n.cidr.to_string().len())
        .max()
        .unwrap_or(5)
        .max(5);

    println!("{:<name_width$}  {:<cidr_width$}  DRIVER", "NAME", "IPNET");
    for n in networks {
        println!("{:<name_width$}  {:<cidr_width$}  {}", n.name, n.cidr.to_string(), n.driver);
    }
}
