//! Image import and container-to-image commit.
//!
//! Both are thin wrappers around external processes (`tar`, `cp -a`), per
//! spec §1's "tarball extraction delegated to an external archive utility"
//! and §6's "external programs invoked". Grounded on
//! `original_source/import_command.go` and `commit_command.go`.

use crate::error::{RuntimeError, RuntimeResult};
use crate::paths::Paths;
use std::process::Command;

/// Extract `tarball` into `<image-dir>/<image_name>`.
pub fn import(paths: &Paths, tarball: &std::path::Path, image_name: &str) -> RuntimeResult<()> {
    let image_path = paths.image_path(image_name);
    std::fs::create_dir_all(&image_path).map_err(|e| RuntimeError::io(&image_path, e))?;

    let status = Command::new("tar")
        .arg("-xf")
        .arg(tarball)
        .arg("-C")
        .arg(&image_path)
        .status()
        .map_err(|e| RuntimeError::Subprocess { command: "tar", detail: e.to_string() })?;
    if !status.success() {
        return Err(RuntimeError::Subprocess { command: "tar", detail: format!("exited with {status}") });
    }
    Ok(())
}

/// Snapshot `container_name`'s merged view into a new image. Fails if
/// `image_name` already exists, and if the container does not.
pub fn commit(paths: &Paths, container_name: &str, image_name: &str) -> RuntimeResult<()> {
    let container_path = paths.container_merged_dir(container_name);
    if !container_path.exists() {
        return Err(RuntimeError::NotFound(format!("container `{container_name}` does not exist")));
    }

    let image_path = paths.image_path(image_name);
    if image_path.exists() {
        return Err(RuntimeError::AlreadyExists(format!(
            "the image `{image_name}` already exists; please choose a different name"
        )));
    }
    std::fs::create_dir_all(&image_path).map_err(|e| RuntimeError::io(&image_path, e))?;

    // `src/.` (rather than a shell glob) copies the directory's contents,
    // hidden entries included, without needing a shell in between.
    let mut src = container_path.clone();
    src.push(".");
    let status = Command::new("cp")
        .arg("-a")
        .arg(&src)
        .arg(&image_path)
        .status()
        .map_err(|e| RuntimeError::Subprocess { command: "cp", detail: e.to_string() })?;
    if !status.success() {
        return Err(RuntimeError::Subprocess { command: "cp", detail: format!("exited with {status}") });
    }
    Ok(())
}
