//! Recursive directory copies that keep symlinks as symlinks.

use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

/// Copies the contents of `src` into `dst`, creating `dst` if needed.
///
/// Regular files keep their permission bits; symlinks are recreated with the
/// same target rather than followed. Entries named in `skip` are left out at
/// any depth.
pub(crate) fn copy_tree(src: &Path, dst: &Path, skip: &[&str]) -> io::Result<()> {
  fs::create_dir_all(dst)?;

  let walker = WalkDir::new(src).sort_by_file_name().into_iter().filter_entry(|e| {
    e.depth() == 0
      || e
        .file_name()
        .to_str()
        .map(|name| !skip.contains(&name))
        .unwrap_or(true)
  });

  for entry in walker {
    let entry = entry.map_err(io::Error::other)?;
    let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
    if rel.as_os_str().is_empty() {
      continue;
    }
    let target = dst.join(rel);
    let file_type = entry.file_type();

    if file_type.is_symlink() {
      let link = fs::read_link(entry.path())?;
      if target.symlink_metadata().is_ok() {
        fs::remove_file(&target)?;
      }
      make_symlink(&link, &target)?;
    } else if file_type.is_dir() {
      fs::create_dir_all(&target)?;
    } else if file_type.is_file() {
      fs::copy(entry.path(), &target)?;
    }
  }
  Ok(())
}

#[cfg(unix)]
fn make_symlink(link: &Path, at: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(link, at)
}

#[cfg(windows)]
fn make_symlink(link: &Path, at: &Path) -> io::Result<()> {
  std::os::windows::fs::symlink_file(link, at)
}
