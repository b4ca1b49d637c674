//! Test fixtures: build registry trees in temporary directories.

use std::fs::create_dir_all;
use std::path::Path;

use tempfile::TempDir;

pub(crate) fn tempdir() -> TempDir {
    TempDir::with_prefix("clean-registry-test-").unwrap()
}

/// Create a tag with the given current digest plus any stale index entries.
/// The current digest is always part of the index set, as the registry's
/// push path guarantees.
pub(crate) fn write_tag(root: &Path, repository: &str, tag: &str, current: &str, stale: &[&str]) {
    let tag_dir = root.join(repository).join("_manifests/tags").join(tag);
    create_dir_all(tag_dir.join("current")).unwrap();
    std::fs::write(tag_dir.join("current/link"), format!("sha256:{current}")).unwrap();

    for digest in stale.iter().copied().chain([current]) {
        let entry = tag_dir.join("index/sha256").join(digest);
        create_dir_all(&entry).unwrap();
        std::fs::write(entry.join("link"), format!("sha256:{digest}")).unwrap();
    }
}

pub(crate) fn write_revision(root: &Path, repository: &str, digest: &str) {
    let dir = root
        .join(repository)
        .join("_manifests/revisions/sha256")
        .join(digest);
    create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("link"), format!("sha256:{digest}")).unwrap();
}

pub(crate) fn has_repository(root: &Path, repository: &str) -> bool {
    root.join(repository).is_dir()
}

pub(crate) fn has_tag(root: &Path, repository: &str, tag: &str) -> bool {
    root.join(repository)
        .join("_manifests/tags")
        .join(tag)
        .is_dir()
}

pub(crate) fn has_index_entry(root: &Path, repository: &str, tag: &str, digest: &str) -> bool {
    root.join(repository)
        .join("_manifests/tags")
        .join(tag)
        .join("index/sha256")
        .join(digest)
        .is_dir()
}

pub(crate) fn has_revision(root: &Path, repository: &str, digest: &str) -> bool {
    root.join(repository)
        .join("_manifests/revisions/sha256")
        .join(digest)
        .is_dir()
}
