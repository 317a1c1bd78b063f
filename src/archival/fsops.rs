use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Filesystem operations the archival engine mutates through.
///
/// Production code uses [`LocalFs`]; tests swap in an implementation that
/// fails partway through a copy.
pub trait ArchiveFs {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Recreate the symlink at `from` as `to`, pointing at the same target.
    fn copy_symlink(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl ArchiveFs for LocalFs {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to)?;
        let modified = fs::metadata(from)?.modified()?;
        fs::File::options()
            .write(true)
            .open(to)?
            .set_modified(modified)?;
        Ok(())
    }

    #[cfg(unix)]
    fn copy_symlink(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(fs::read_link(from)?, to)
    }

    #[cfg(not(unix))]
    fn copy_symlink(&self, from: &Path, _to: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot recreate symlink {}", from.display()),
        ))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }
}

/// Relative paths of everything [`copy_tree`] recreated.
#[derive(Debug, Default)]
pub struct CopyManifest {
    pub files: Vec<PathBuf>,
    pub links: Vec<PathBuf>,
}

/// Recursively copy `from` into `to`. Symlinks are recreated as links, not
/// followed. Anything that is neither a directory, a regular file nor a
/// symlink aborts the copy, since it could not be restored from the archive.
pub fn copy_tree(fs_ops: &dyn ArchiveFs, from: &Path, to: &Path) -> io::Result<CopyManifest> {
    let mut manifest = CopyManifest::default();
    copy_tree_inner(fs_ops, from, to, Path::new(""), &mut manifest)?;
    Ok(manifest)
}

fn copy_tree_inner(
    fs_ops: &dyn ArchiveFs,
    root_from: &Path,
    root_to: &Path,
    rel: &Path,
    manifest: &mut CopyManifest,
) -> io::Result<()> {
    let src_dir = root_from.join(rel);
    fs_ops.create_dir_all(&root_to.join(rel))?;

    let mut entries = fs::read_dir(&src_dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let file_type = entry.file_type()?;
        let child = rel.join(entry.file_name());
        if file_type.is_symlink() {
            fs_ops.copy_symlink(&root_from.join(&child), &root_to.join(&child))?;
            manifest.links.push(child);
        } else if file_type.is_dir() {
            copy_tree_inner(fs_ops, root_from, root_to, &child, manifest)?;
        } else if file_type.is_file() {
            fs_ops.copy_file(&root_from.join(&child), &root_to.join(&child))?;
            manifest.files.push(child);
        } else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("special file cannot be archived: {}", entry.path().display()),
            ));
        }
    }
    Ok(())
}

pub fn file_hash(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Atomically write `data` to `path` using a tempfile in the same directory.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    // Tempfiles start out 0600; keep an existing file's mode, else 0644.
    match fs::metadata(path) {
        Ok(existing) => tmp.as_file().set_permissions(existing.permissions())?,
        Err(_) => set_default_mode(tmp.as_file())?,
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(unix)]
fn set_default_mode(file: &fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_default_mode(_file: &fs::File) -> io::Result<()> {
    Ok(())
}
