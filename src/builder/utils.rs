use std::{io, path::Path};

use anyhow::bail;
use tokio::process::Command;
use tracing::trace;

/// Removes `path` and everything below it. A path that is already gone is fine.
pub(crate) async fn ensure_absent(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            trace!("{} didn't exist", path.display());
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Runs `command` to completion, turning a non-zero exit into an error carrying its stderr.
pub(crate) async fn run(mut command: Command) -> anyhow::Result<()> {
    trace!("running {:?}", command);
    let output = command.kill_on_drop(true).output().await?;

    if !output.status.success() {
        bail!(
            "{:?} failed ({}): {}",
            command.as_std().get_program(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(())
}
