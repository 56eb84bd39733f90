//! Phase 2: runs after the child re-execs itself as `init` (spec §4.H).
//! Reads the command line from the inherited pipe fd, pivots root, mounts
//! `/proc` and `/dev`, then execs the user's program — replacing this
//! process image entirely. Grounded on `original_source/init_command.go`.

use super::CMD_FD_ENV;
use crate::error::{RuntimeError, RuntimeResult};
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::unistd::{chdir, pivot_root};
use std::io::Read;
use std::os::fd::{FromRawFd, OwnedFd};
use std::path::Path;

/// Entered via the `init` CLI subcommand. Never returns on success — the
/// process image is replaced by the user's command.
pub fn run() -> RuntimeResult<()> {
    tracing::debug!("entered init");
    let command = read_command()?;
    if command.is_empty() {
        return Err(RuntimeError::UserInput("empty command".into()));
    }

    set_up_mount_points()?;

    let program = which(&command[0])
        .ok_or_else(|| RuntimeError::NotFound(format!("command not found: {}", command[0])))?;

    let argv: Vec<std::ffi::CString> = command
        .iter()
        .map(|s| std::ffi::CString::new(s.as_bytes()).expect("no interior NUL"))
        .collect();
    let path = std::ffi::CString::new(program.as_os_str().as_encoded_bytes()).expect("no interior NUL");

    tracing::debug!(path = %program.display(), "execing user command");
    nix::unistd::execv(&path, &argv).map_err(|e| RuntimeError::kernel("execve", e))?;
    unreachable!("execv only returns on error, which is handled above");
}

fn read_command() -> RuntimeResult<Vec<String>> {
    let fd_str = std::env::var(CMD_FD_ENV)
        .map_err(|_| RuntimeError::UserInput(format!("{CMD_FD_ENV} not set; init is not for external use")))?;
    let fd: i32 = fd_str
        .parse()
        .map_err(|_| RuntimeError::UserInput(format!("{CMD_FD_ENV} is not a valid fd number")))?;

    // SAFETY: the parent guarantees fd is an open, valid pipe read end
    // passed exactly once via clone()'s fd-table copy.
    let mut file = std::fs::File::from(unsafe { OwnedFd::from_raw_fd(fd) });
    let mut buf = String::new();
    file.read_to_string(&mut buf).map_err(|e| RuntimeError::io("command pipe", e))?;
    Ok(buf.split(' ').filter(|s| !s.is_empty()).map(str::to_string).collect())
}

fn set_up_mount_points() -> RuntimeResult<()> {
    let cwd = std::env::current_dir().map_err(|e| RuntimeError::io(".", e))?;
    pivot_root_to(&cwd)?;

    mount(
        Some("proc"),
        "/proc",
        Some("proc"),
        MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
        None::<&str>,
    )
    .map_err(|e| RuntimeError::kernel("mount(/proc)", e))?;

    mount(
        Some("tmpfs"),
        "/dev",
        Some("tmpfs"),
        MsFlags::MS_NOSUID | MsFlags::MS_STRICTATIME,
        Some("mode=755"),
    )
    .map_err(|e| RuntimeError::kernel("mount(/dev)", e))?;

    Ok(())
}

fn pivot_root_to(new_root: &Path) -> RuntimeResult<()> {
    mount(
        Some(new_root),
        new_root,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| RuntimeError::kernel("mount(bind-self)", e))?;

    let old_root_name = "old_root";
    let old_root = new_root.join(old_root_name);
    std::fs::create_dir_all(&old_root).map_err(|e| RuntimeError::io(&old_root, e))?;

    pivot_root(new_root, &old_root).map_err(|e| RuntimeError::kernel("pivot_root", e))?;
    chdir("/").map_err(|e| RuntimeError::kernel("chdir", e))?;

    let old_root_abs = Path::new("/").join(old_root_name);
    umount2(&old_root_abs, MntFlags::MNT_DETACH).map_err(|e| RuntimeError::kernel("umount2(old_root)", e))?;
    std::fs::remove_dir(&old_root_abs).map_err(|e| RuntimeError::io(&old_root_abs, e))?;
    Ok(())
}

/// Look up `program` on `PATH`, the way `exec.LookPath` does in the
/// original. Returns the program unchanged if it already contains a `/`.
fn which(program: &str) -> Option<std::path::PathBuf> {
    if program.contains('/') {
        return Path::new(program).exists().then(|| program.into());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(program);
        candidate.exists().then_some(candidate)
    })
}
