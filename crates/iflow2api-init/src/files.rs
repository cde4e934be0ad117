use std::fs::Permissions;
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use nix::unistd::{Gid, Uid, fchown};
use tempfile::Builder;

/// Writes the provided bytes to the path using an atomic persist step.
///
/// Data is flushed and fsync'd before the temporary file is renamed into
/// place so readers never observe a partially written payload. Permissions
/// are restricted to owner read/write before any content lands on disk, and
/// ownership is applied to the temporary file so the installed document
/// never appears with the bootstrapper's own credentials.
pub(crate) fn atomic_write(
    path: &Path,
    contents: &[u8],
    owner: Option<(Uid, Gid)>,
) -> io::Result<()> {
    let directory = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "target path did not have a parent directory",
        )
    })?;

    let mut builder = Builder::new();
    builder.prefix(
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("iflow2api"),
    );
    builder.permissions(Permissions::from_mode(0o600));

    let mut file = builder.tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    if let Some((uid, gid)) = owner {
        fchown(file.as_file().as_raw_fd(), Some(uid), Some(gid)).map_err(io::Error::from)?;
    }
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}
