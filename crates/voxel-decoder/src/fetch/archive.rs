//! Unpacking of gzipped tarballs.

use std::fs;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::warn;

use super::{io_error, FetchError};

/// Unpack `archive` into `dest`, returning the number of files written.
///
/// Links and entries whose path would escape `dest` are skipped.
pub fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<usize, FetchError> {
    let file = fs::File::open(archive).map_err(io_error(archive))?;
    let mut tarball = tar::Archive::new(GzDecoder::new(file));

    let mut n_files = 0;
    for entry in tarball.entries().map_err(io_error(archive))? {
        let mut entry = entry.map_err(io_error(archive))?;
        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            continue;
        }

        let entry_path = entry.path().map_err(io_error(archive))?.into_owned();
        let Some(relative) = sanitize_archive_path(&entry_path) else {
            warn!(entry = %entry_path.display(), archive = %archive.display(), "skipping unsafe archive path");
            continue;
        };

        let target = dest.join(&relative);
        if entry_type.is_dir() {
            fs::create_dir_all(&target).map_err(io_error(&target))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        entry.unpack(&target).map_err(io_error(&target))?;
        n_files += 1;
    }
    Ok(n_files)
}

/// Relative form of an archive path, or `None` if it is absolute, climbs out
/// with `..`, or is empty.
pub fn sanitize_archive_path(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => out.push(segment),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}
