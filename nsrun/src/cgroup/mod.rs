//! Cgroup v1 subsystem manager (module B).
//!
//! Discovers controller mount points from `/proc/self/mountinfo`, then
//! creates/configures/attaches/destroys one directory per controller under
//! that mount point, named after the container ID. Mirrors the write-files
//! style of the original `cgroup.go`, adapted to Rust's `std::fs` the way
//! `boxlite`'s `fs/bind_mount/native.rs` wraps raw syscalls: small helper
//! functions, errors wrapped with context via `RuntimeError`.

use crate::error::{RuntimeError, RuntimeResult};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The only two v1 controllers this runtime drives, per spec §4.B.
const CONTROLLERS: &[&str] = &["cpu", "cpuset"];

/// Resource limits requested for a container's cgroup. All fields default to
/// "unset"; `Set` only touches controller files for limits that are present.
#[derive(Debug, Clone, Default)]
pub struct CgroupConfig {
    pub cpu_shares: Option<u64>,
    pub cpu_period_us: Option<u64>,
    pub cpu_quota_us: Option<i64>,
    pub cpus: Option<f64>,
    pub cpuset_cpus: Option<String>,
}

impl CgroupConfig {
    fn wants_cpu_controller(&self) -> bool {
        self.cpu_shares.is_some()
            || self.cpu_period_us.is_some()
            || self.cpu_quota_us.is_some()
            || self.cpus.is_some()
    }

    fn wants_cpuset_controller(&self) -> bool {
        self.cpuset_cpus.is_some()
    }
}

/// Handle to a single container's cgroup, identified by container ID.
pub struct Cgroup {
    id: String,
}

impl Cgroup {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Create controller directories (as needed) and write limit files.
    pub fn set(&self, config: &CgroupConfig) -> RuntimeResult<()> {
        if config.wants_cpu_controller() {
            self.set_cpu(config)?;
        }
        if config.wants_cpuset_controller() {
            self.set_cpuset(config)?;
        }
        Ok(())
    }

    fn set_cpu(&self, config: &CgroupConfig) -> RuntimeResult<()> {
        let dir = controller_dir("cpu", &self.id)?;
        fs::create_dir_all(&dir).map_err(|e| RuntimeError::io(&dir, e))?;

        if let Some(shares) = config.cpu_shares {
            write_file(&dir.join("cpu.shares"), &shares.to_string())?;
        }

        // default period is 1,000,000us when `cpus` is set, per spec §4.B.
        // `cpu_quota_us` alone carries no period default and leaves this file unwritten.
        let period = config.cpu_period_us.unwrap_or(1_000_000);
        if config.cpus.is_some() || config.cpu_period_us.is_some() {
            write_file(&dir.join("cpu.cfs_period_us"), &period.to_string())?;
        }

        let quota = match config.cpus {
            Some(cpus) => Some((cpus * period as f64) as i64),
            None => config.cpu_quota_us,
        };
        if let Some(quota) = quota {
            write_file(&dir.join("cpu.cfs_quota_us"), &quota.to_string())?;
        }

        debug!(container_id = %self.id, ?config, "cpu cgroup configured");
        Ok(())
    }

    fn set_cpuset(&self, config: &CgroupConfig) -> RuntimeResult<()> {
        let dir = controller_dir("cpuset", &self.id)?;
        fs::create_dir_all(&dir).map_err(|e| RuntimeError::io(&dir, e))?;
        if let Some(list) = &config.cpuset_cpus {
            write_file(&dir.join("cpuset.cpus"), list)?;
        }
        Ok(())
    }

    /// Attach `pid` to every controller directory that was created by
    /// `set`. Skips silently if a controller directory was never created.
    pub fn apply(&self, pid: u32) -> RuntimeResult<()> {
        for controller in CONTROLLERS {
            let dir = controller_dir(controller, &self.id)?;
            if !dir.exists() {
                continue;
            }
            write_file(&dir.join("cgroup.procs"), &pid.to_string())?;
            debug!(container_id = %self.id, controller, pid, "attached pid to cgroup");
        }
        Ok(())
    }

    /// Recursively remove every controller directory created for this
    /// container. Every controller is attempted even if one fails; the
    /// first error encountered is returned.
    pub fn destroy(&self) -> RuntimeResult<()> {
        let mut first_err = None;
        for controller in CONTROLLERS {
            let dir = match controller_dir(controller, &self.id) {
                Ok(dir) => dir,
                Err(e) => {
                    first_err.get_or_insert(e);
                    continue;
                }
            };
            if !dir.exists() {
                continue;
            }
            if let Err(e) = fs::remove_dir_all(&dir) {
                first_err.get_or_insert(RuntimeError::io(&dir, e));
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn controller_dir(controller: &'static str, id: &str) -> RuntimeResult<PathBuf> {
    Ok(find_controller_root(controller)?.join(id))
}

/// Parse `/proc/self/mountinfo` for the mount point of `controller`.
///
/// Each line's last whitespace-separated field is a comma-separated list of
/// superblock options; a line whose options contain `controller` names that
/// controller's mount point in field index 4.
fn find_controller_root(controller: &'static str) -> RuntimeResult<PathBuf> {
    find_controller_root_in(Path::new("/proc/self/mountinfo"), controller)
}

fn find_controller_root_in(mountinfo: &Path, controller: &'static str) -> RuntimeResult<PathBuf> {
    let file = fs::File::open(mountinfo).map_err(|e| RuntimeError::io(mountinfo, e))?;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| RuntimeError::io(mountinfo, e))?;
        let fields: Vec<&str> = line.split(' ').collect();
        let Some(opts) = fields.last() else { continue };
        if opts.split(',').any(|opt| opt == controller) {
            if let Some(mount_point) = fields.get(4) {
                return Ok(PathBuf::from(mount_point));
            }
        }
    }
    Err(RuntimeError::CgroupControllerMissing { controller })
}

fn write_file(path: &Path, contents: &str) -> RuntimeResult<()> {
    fs::write(path, contents).map_err(|e| RuntimeError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fake_mountinfo(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        f
    }

    #[test]
    fn finds_cpu_controller_root() {
        let f = fake_mountinfo(&[
            "40 30 0:23 / /sys/fs/cgroup/cpu,cpuacct rw,nosuid shared:17 - cgroup cgroup rw,cpu,cpuacct",
        ]);
        let root = find_controller_root_in(f.path(), "cpu").unwrap();
        assert_eq!(root, PathBuf::from("/sys/fs/cgroup/cpu,cpuacct"));
    }

    #[test]
    fn missing_controller_is_an_error() {
        let f = fake_mountinfo(&["40 30 0:23 / /sys/fs/cgroup/memory rw - cgroup cgroup rw,memory"]);
        let err = find_controller_root_in(f.path(), "cpuset").unwrap_err();
        assert!(matches!(err, RuntimeError::CgroupControllerMissing { controller: "cpuset" }));
    }

    #[test]
    fn cpus_quota_uses_default_period() {
        let cfg = CgroupConfig { cpus: Some(0.5), ..Default::default() };
        let period = cfg.cpu_period_us.unwrap_or(1_000_000);
        let quota = (cfg.cpus.unwrap() * period as f64) as i64;
        assert_eq!(period, 1_000_000);
        assert_eq!(quota, 500_000);
    }
}
