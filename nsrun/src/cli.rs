//! Command-line surface (spec §6), via `clap` derive — matching the style
//! `nya3jp-cros-bazel`'s `run_in_container` binary uses (`#[derive(Parser)]`
//! with doc-comment help text) rather than the teacher's (CLI-less library)
//! crate, since `boxlite` itself ships no clap-based binary in this pack.

use clap::{Parser, Subcommand};
use ipnetwork::Ipv4Network;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nsrun", about = "A minimal Linux container runtime")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Run a container from an image.
    #[command(trailing_var_arg = true)]
    Run {
        /// Attach stdio and wait for the container to exit.
        #[arg(short = 'i')]
        tty: bool,
        /// Container name (defaults to the generated container ID).
        #[arg(long)]
        name: Option<String>,
        /// Memory limit. Accepted for CLI parity; not enforced (spec §4.B
        /// only wires up the cpu and cpuset controllers).
        #[arg(short = 'm')]
        memory: Option<String>,
        #[arg(long = "cpu-shares")]
        cpu_shares: Option<u64>,
        #[arg(long = "cpu-period")]
        cpu_period: Option<u64>,
        #[arg(long = "cpu-quota")]
        cpu_quota: Option<i64>,
        #[arg(long = "cpuset-cpus")]
        cpuset_cpus: Option<String>,
        #[arg(long)]
        cpus: Option<f64>,
        /// Bind-mount volume: HOST:CTR.
        #[arg(short = 'v')]
        volume: Option<String>,
        /// Network to attach to, or "host" for none.
        #[arg(long)]
        net: Option<String>,
        image: String,
        command: Vec<String>,
    },

    /// Internal: re-exec'd by `run` inside new namespaces. Never invoked by users.
    #[command(hide = true)]
    Init,

    /// Import a tarball to create an image.
    Import { file: PathBuf, image: String },

    /// Commit a container's current filesystem to a new image.
    Commit { container: String, image: String },

    /// Manage virtual networks.
    Network {
        #[command(subcommand)]
        command: NetworkCmd,
    },
}

#[derive(Subcommand, Debug)]
pub enum NetworkCmd {
    /// Create a named virtual network.
    Create {
        #[arg(long)]
        driver: String,
        #[arg(long)]
        subnet: Ipv4Network,
        name: String,
    },
    /// List virtual networks.
    List,
    /// Remove a virtual network.
    Remove { name: String },
}

