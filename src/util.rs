use std::ffi::CString;
use std::os::fd::{AsFd, OwnedFd};

use rustix::fs::{openat, unlinkat, AtFlags, Dir, FileType, Mode, OFlags};
use rustix::io::Result as ErrnoResult;

const DIR_FLAGS: OFlags = OFlags::RDONLY
    .union(OFlags::DIRECTORY)
    .union(OFlags::CLOEXEC)
    .union(OFlags::NOFOLLOW);

/// Recursively remove the directory at `path` (relative to `dirfd`) and
/// everything beneath it. Symlinks are never followed: a link is unlinked,
/// not descended into.
pub(crate) fn remove_tree_at(dirfd: impl AsFd, path: &str) -> ErrnoResult<()> {
    let fd = openat(&dirfd, path, DIR_FLAGS, Mode::empty())?;
    remove_children(&fd)?;
    unlinkat(&dirfd, path, AtFlags::REMOVEDIR)
}

fn remove_children(fd: &OwnedFd) -> ErrnoResult<()> {
    // Collect entries up front: unlinking during readdir() can skip entries.
    let mut entries = Vec::new();
    for item in Dir::read_from(fd)? {
        let entry = item?;
        let name = entry.file_name();
        if name == c"." || name == c".." {
            continue;
        }
        entries.push((CString::from(name), entry.file_type()));
    }

    for (name, file_type) in entries {
        if file_type == FileType::Directory {
            let child = openat(fd, &name, DIR_FLAGS, Mode::empty())?;
            remove_children(&child)?;
            unlinkat(fd, &name, AtFlags::REMOVEDIR)?;
        } else {
            unlinkat(fd, &name, AtFlags::empty())?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustix::fs::CWD;
    use rustix::io::Errno;

    fn open_root(path: &std::path::Path) -> OwnedFd {
        openat(
            CWD,
            path,
            OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC,
            Mode::empty(),
        )
        .unwrap()
    }

    #[test]
    fn test_remove_tree_at() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path();

        std::fs::create_dir_all(root.join("victim/a/b")).unwrap();
        std::fs::write(root.join("victim/a/b/file"), b"x").unwrap();
        std::fs::write(root.join("victim/top"), b"y").unwrap();
        std::os::unix::fs::symlink("a", root.join("victim/link")).unwrap();
        std::fs::create_dir(root.join("survivor")).unwrap();

        let dirfd = open_root(root);
        remove_tree_at(&dirfd, "victim").unwrap();

        assert!(!root.join("victim").exists());
        assert!(root.join("survivor").exists());
    }

    #[test]
    fn test_remove_tree_at_missing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dirfd = open_root(tmp.path());

        assert_eq!(remove_tree_at(&dirfd, "absent").unwrap_err(), Errno::NOENT);
    }
}
