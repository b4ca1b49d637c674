//! On-disk model of a Docker Registry filesystem store.
//!
//! # Store Layout
//!
//! The registry keeps one directory per repository under the `repositories`
//! root, with manifest links grouped per tag:
//!
//! ```text
//! repositories/
//! └── library/busybox/
//!     └── _manifests/
//!         ├── revisions/
//!         │   └── sha256/
//!         │       ├── 4e67eacc.../      # one per manifest ever stored
//!         │       └── ...
//!         └── tags/
//!             └── latest/
//!                 ├── current/
//!                 │   └── link          # contains "sha256:<digest>"
//!                 └── index/
//!                     └── sha256/
//!                         ├── 4e67eacc.../   # every digest this tag pointed to
//!                         └── ...
//! ```
//!
//! A tag's `current/link` file is its active pointer; the `index` set holds
//! every digest the tag has ever pointed to, including the current one. A
//! revision is *live* iff its digest appears in some tag's index set.
//!
//! This module only reads the link graph and deletes entries. It never
//! creates or rewrites a current pointer: repositories, tags and revisions
//! are created exclusively by the registry's push path.
//!
//! All access is fd-relative: [`RegistryStore`] holds an open descriptor for
//! the repositories root and repository names are resolved beneath it.

use std::fs::File;
use std::io::Read;
use std::os::fd::{AsFd, OwnedFd};
use std::path::Path;

use rustix::fs::{openat, statat, AtFlags, Dir, FileType, Mode, OFlags};
use rustix::io::Errno;

use crate::error::{CleanError, Result};
use crate::util::remove_tree_at;

const TAGS_DIR: &str = "_manifests/tags";
const REVISIONS_DIR: &str = "_manifests/revisions/sha256";
const DIGEST_PREFIX: &str = "sha256:";

const DIR_FLAGS: OFlags = OFlags::RDONLY
    .union(OFlags::DIRECTORY)
    .union(OFlags::CLOEXEC);

/// The `repositories` tree of a registry's filesystem storage.
#[derive(Debug)]
pub struct RegistryStore {
    root: OwnedFd,
}

impl RegistryStore {
    /// Open the repositories root at the given directory and path.
    pub fn open_path(dirfd: impl AsFd, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match openat(dirfd, path, DIR_FLAGS, Mode::empty()) {
            Ok(root) => Ok(Self { root }),
            Err(Errno::NOENT) => Err(CleanError::RootNotFound(path.to_path_buf())),
            Err(err) => Err(err.into()),
        }
    }

    /// List the top-level repositories in the store, sorted by name.
    pub fn list_repositories(&self) -> Result<Vec<String>> {
        let mut repositories = list_subdirectories(&self.root)?;
        repositories.sort();
        Ok(repositories)
    }

    /// Open one repository by its (possibly slash-separated) name.
    pub fn repository(&self, name: &str) -> Result<Repository> {
        match openat(&self.root, name, DIR_FLAGS, Mode::empty()) {
            Ok(dir) => Ok(Repository {
                dir,
                name: name.to_owned(),
            }),
            Err(Errno::NOENT | Errno::NOTDIR) => {
                Err(CleanError::NoSuchRepository(name.to_owned()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Remove a repository directory and everything beneath it: all of its
    /// tags and revisions.
    pub fn remove_repository(&self, name: &str) -> Result<()> {
        remove_tree_at(&self.root, name)?;
        Ok(())
    }
}

/// One repository's link graph: its tags and manifest revisions.
#[derive(Debug)]
pub struct Repository {
    dir: OwnedFd,
    name: String,
}

impl Repository {
    /// The repository's name, relative to the store root.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// List the repository's tags, sorted. A repository without a tags
    /// directory has no tags.
    pub fn tags(&self) -> Result<Vec<String>> {
        let dirfd = match openat(&self.dir, TAGS_DIR, DIR_FLAGS, Mode::empty()) {
            Ok(fd) => fd,
            Err(Errno::NOENT) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut tags = list_subdirectories(&dirfd)?;
        tags.sort();
        Ok(tags)
    }

    /// Whether the given tag exists, i.e. has a current link.
    pub fn has_tag(&self, tag: &str) -> Result<bool> {
        let link = format!("{TAGS_DIR}/{tag}/current/link");
        match statat(&self.dir, &*link, AtFlags::empty()) {
            Ok(stat) => Ok(FileType::from_raw_mode(stat.st_mode).is_file()),
            Err(Errno::NOENT | Errno::NOTDIR) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Read the digest a tag currently points to.
    pub fn current_digest(&self, tag: &str) -> Result<String> {
        let link = format!("{TAGS_DIR}/{tag}/current/link");
        let fd = match openat(
            &self.dir,
            &*link,
            OFlags::RDONLY | OFlags::CLOEXEC,
            Mode::empty(),
        ) {
            Ok(fd) => fd,
            Err(Errno::NOENT | Errno::NOTDIR) => {
                return Err(CleanError::NoSuchTag {
                    repository: self.name.clone(),
                    tag: tag.to_owned(),
                })
            }
            Err(err) => return Err(err.into()),
        };

        let mut content = String::new();
        File::from(fd).read_to_string(&mut content)?;
        match content.trim_end().strip_prefix(DIGEST_PREFIX) {
            Some(digest) if !digest.is_empty() => Ok(digest.to_owned()),
            _ => Err(CleanError::MalformedLink {
                repository: self.name.clone(),
                tag: tag.to_owned(),
            }),
        }
    }

    /// List the digests in a tag's index set, sorted. The set is empty when
    /// the index directory is missing.
    pub fn index_digests(&self, tag: &str) -> Result<Vec<String>> {
        self.list_digest_dir(&format!("{TAGS_DIR}/{tag}/index/sha256"))
    }

    /// List the digests of every revision stored for this repository, sorted.
    pub fn revisions(&self) -> Result<Vec<String>> {
        self.list_digest_dir(REVISIONS_DIR)
    }

    /// Remove a tag directory entirely: its index set and current pointer.
    pub fn remove_tag(&self, tag: &str) -> Result<()> {
        remove_tree_at(&self.dir, &format!("{TAGS_DIR}/{tag}"))?;
        Ok(())
    }

    /// Remove one entry from a tag's index set.
    pub fn remove_index_entry(&self, tag: &str, digest: &str) -> Result<()> {
        remove_tree_at(&self.dir, &format!("{TAGS_DIR}/{tag}/index/sha256/{digest}"))?;
        Ok(())
    }

    /// Remove one stored revision.
    pub fn remove_revision(&self, digest: &str) -> Result<()> {
        remove_tree_at(&self.dir, &format!("{REVISIONS_DIR}/{digest}"))?;
        Ok(())
    }

    fn list_digest_dir(&self, path: &str) -> Result<Vec<String>> {
        let dirfd = match openat(&self.dir, path, DIR_FLAGS, Mode::empty()) {
            Ok(fd) => fd,
            Err(Errno::NOENT) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut digests = list_subdirectories(&dirfd)?;
        digests.sort();
        Ok(digests)
    }
}

fn list_subdirectories(dirfd: impl AsFd) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for item in Dir::read_from(&dirfd)? {
        let entry = item?;
        if entry.file_type() != FileType::Directory {
            continue;
        }
        let name = entry.file_name();
        if name == c"." || name == c".." {
            continue;
        }
        if let Ok(name) = name.to_str() {
            names.push(name.to_owned());
        }
    }
    Ok(names)
}
