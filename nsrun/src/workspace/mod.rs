//! Layered filesystem orchestrator (module C).
//!
//! Assembles the overlay `merged = lowerdir(image) + upperdir(upper) +
//! workdir(work)` and applies an optional bind-mount volume, the way
//! `boxlite`'s `fs/bind_mount/native.rs` wraps `nix::mount` calls with
//! `RuntimeError` context. Extraction of the image tarball is delegated to
//! the external `tar` binary (spec §1 Out of scope).

use crate::error::{RuntimeError, RuntimeResult};
use crate::paths::Paths;
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// A `HOST:CTR` volume spec, as accepted by `run -v`.
#[derive(Debug, Clone)]
pub struct VolumeSpec {
    pub host: PathBuf,
    pub container: PathBuf,
}

impl VolumeSpec {
    pub fn parse(spec: &str) -> RuntimeResult<Self> {
        let mut parts = spec.splitn(2, ':');
        let (Some(host), Some(container)) = (parts.next(), parts.next()) else {
            return Err(RuntimeError::UserInput(format!(
                "bad volume spec `{spec}`, expected HOST:CTR"
            )));
        };
        if container.is_empty() || host.is_empty() {
            return Err(RuntimeError::UserInput(format!(
                "bad volume spec `{spec}`, expected HOST:CTR"
            )));
        }
        Ok(Self { host: PathBuf::from(host), container: PathBuf::from(container.trim_start_matches('/')) })
    }
}

pub struct WorkspaceOptions<'a> {
    pub container_name: &'a str,
    pub image_name: &'a str,
    pub volume: Option<VolumeSpec>,
}

/// Create the image (extracting its tarball if not yet populated), the
/// container's merged/upper/work directories, mount the overlay, and apply
/// the volume bind mount if one was requested.
pub fn create(paths: &Paths, opts: &WorkspaceOptions) -> RuntimeResult<PathBuf> {
    let image_path = ensure_image_extracted(paths, opts.image_name)?;

    let merged = paths.container_merged_dir(opts.container_name);
    let upper = paths.container_upper_dir(opts.container_name);
    let work = paths.container_work_dir(opts.container_name);
    for dir in [&merged, &upper, &work] {
        make_dir_0777(dir)?;
    }

    let options = format!(
        "lowerdir={},upperdir={},workdir={}",
        image_path.display(),
        upper.display(),
        work.display()
    );
    mount(
        Some("overlay"),
        &merged,
        Some("overlay"),
        MsFlags::empty(),
        Some(options.as_str()),
    )
    .map_err(|e| RuntimeError::kernel("mount(overlay)", e))?;
    debug!(merged = %merged.display(), %options, "overlay mounted");

    if let Some(volume) = &opts.volume {
        apply_volume(&merged, volume)?;
    }

    Ok(merged)
}

fn apply_volume(merged: &Path, volume: &VolumeSpec) -> RuntimeResult<()> {
    std::fs::create_dir_all(&volume.host).map_err(|e| RuntimeError::io(&volume.host, e))?;
    let target = merged.join(&volume.container);
    std::fs::create_dir_all(&target).map_err(|e| RuntimeError::io(&target, e))?;
    mount(Some(&volume.host), &target, None::<&str>, MsFlags::MS_BIND, None::<&str>)
        .map_err(|e| RuntimeError::kernel("mount(bind)", e))?;
    debug!(host = %volume.host.display(), target = %target.display(), "volume bind-mounted");
    Ok(())
}

/// Unmount `merged` (detaching submounts, which tears down the volume bind
/// implicitly) and remove the container's directory tree.
pub fn destroy(paths: &Paths, container_name: &str) -> RuntimeResult<()> {
    let merged = paths.container_merged_dir(container_name);
    if merged.exists() {
        umount2(&merged, MntFlags::MNT_DETACH).map_err(|e| RuntimeError::kernel("umount2", e))?;
    }
    let dir = paths.container_dir(container_name);
    std::fs::remove_dir_all(&dir).or_else(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Ok(())
        } else {
            Err(RuntimeError::io(&dir, e))
        }
    })
}

/// Extract the image's companion tarball in place if the image directory is
/// not yet populated. Idempotent by presence, matching spec §4.C.
fn ensure_image_extracted(paths: &Paths, image_name: &str) -> RuntimeResult<PathBuf> {
    let image_path = paths.image_path(image_name);
    if !image_path.exists() {
        return Err(RuntimeError::NotFound(format!("image `{image_name}` does not exist")));
    }
    let populated = std::fs::read_dir(&image_path)
        .map(|mut it| it.next().is_some())
        .unwrap_or(false);
    if populated {
        return Ok(image_path);
    }

    let tar_path = paths.image_tar_path(image_name);
    let status = Command::new("tar")
        .arg("-xf")
        .arg(&tar_path)
        .arg("-C")
        .arg(&image_path)
        .status()
        .map_err(|e| RuntimeError::Subprocess { command: "tar", detail: e.to_string() })?;
    if !status.success() {
        return Err(RuntimeError::Subprocess {
            command: "tar",
            detail: format!("exited with {status}"),
        });
    }
    Ok(image_path)
}

fn make_dir_0777(dir: &Path) -> RuntimeResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::create_dir_all(dir).map_err(|e| RuntimeError::io(dir, e))?;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o777))
        .map_err(|e| RuntimeError::io(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_volume_spec() {
        let v = VolumeSpec::parse("/host/data:/data").unwrap();
        assert_eq!(v.host, PathBuf::from("/host/data"));
        assert_eq!(v.container, PathBuf::from("data"));
    }

    #[test]
    fn rejects_malformed_volume_spec() {
        assert!(VolumeSpec::parse("/just/a/path").is_err());
        assert!(VolumeSpec::parse(":/data").is_err());
        assert!(VolumeSpec::parse("/host:").is_err());
    }
}
