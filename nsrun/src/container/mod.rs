//! Container lifecycle (module H): the two-phase launch described in spec
//! §4.H — stage mounts in the parent, clone into new namespaces, complete
//! root-pivot and /proc//dev setup in the child, then exec the user's
//! command. Split across `launcher` (phase 1, parent) and `init` (phase 2,
//! child, entered via the `init` subcommand).

pub mod init;
pub mod launcher;

use crate::cgroup::CgroupConfig;
use crate::workspace::VolumeSpec;

/// Env var carrying the read end of the command pipe's fd number across
/// `execve`, replacing the original's hardcoded "fd 3" convention (design
/// note: "name the file-descriptor-passing contract in argv or env").
pub const CMD_FD_ENV: &str = "NSRUN_CMD_FD";

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub create_tty: bool,
    pub container_name: Option<String>,
    pub image_name: String,
    pub command: Vec<String>,
    pub volume: Option<VolumeSpec>,
    pub network: Option<String>,
    pub cgroup: CgroupConfig,
}
