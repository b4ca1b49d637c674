//! Link-graph pruning for registry repositories.
//!
//! Pruning walks one repository's tag links and removes whatever no tag
//! still references:
//!
//! 1. For each tag, every index entry whose digest differs from the tag's
//!    current digest is stale and is deleted. The current pointer itself is
//!    never touched.
//! 2. Every revision whose digest appears in no tag's index set is orphaned
//!    and is deleted.
//!
//! Step 2 must run after step 1: revision liveness is computed from the
//! already-pruned index state. The caller guarantees the store is quiescent
//! (the registry is stopped) for the duration; nothing here tolerates
//! concurrent writers.

use std::collections::HashSet;

use log::trace;

use crate::error::{CleanError, Result};
use crate::reference::split_reference;
use crate::store::{RegistryStore, Repository};

/// Options controlling a cleanup pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupOptions {
    /// Suppress non-error messages.
    pub quiet: bool,
    /// Remove the named repositories or tagged images entirely instead of
    /// pruning unreferenced content.
    pub remove: bool,
}

/// Statistics from cleaning one repository.
///
/// Returned by [`RegistryStore::clean_repository`] to report what was removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanStats {
    /// Stale index entries removed.
    pub index_entries_removed: u64,
    /// Orphaned revisions removed.
    pub revisions_removed: u64,
    /// Whole tag directories removed (explicit delete only).
    pub tags_removed: u64,
    /// Whole repository directories removed (explicit delete only).
    pub repositories_removed: u64,
}

fn report_removed(opts: &CleanupOptions, path: &str) {
    if !opts.quiet {
        println!("removed directory {path}");
    }
}

impl Repository {
    /// Delete every entry in `tag`'s index set other than the tag's current
    /// digest. The current pointer is never deleted.
    pub fn prune_tag_index(
        &self,
        tag: &str,
        opts: &CleanupOptions,
        stats: &mut CleanStats,
    ) -> Result<()> {
        let current = self.current_digest(tag)?;
        for digest in self.index_digests(tag)? {
            if digest == current {
                trace!("{}: index entry {tag}/{digest} is current", self.name());
                continue;
            }
            self.remove_index_entry(tag, &digest)?;
            stats.index_entries_removed += 1;
            report_removed(
                opts,
                &format!("{}/_manifests/tags/{tag}/index/sha256/{digest}", self.name()),
            );
        }
        Ok(())
    }

    /// Delete every revision whose digest appears in no tag's index set.
    /// Must run after index pruning so that stale entries no longer count as
    /// references.
    pub fn prune_revisions(&self, opts: &CleanupOptions, stats: &mut CleanStats) -> Result<()> {
        let mut live = HashSet::new();
        for tag in self.tags()? {
            live.extend(self.index_digests(&tag)?);
        }

        for digest in self.revisions()? {
            if live.contains(&digest) {
                trace!("{}: revision {digest} lives", self.name());
                continue;
            }
            self.remove_revision(&digest)?;
            stats.revisions_removed += 1;
            report_removed(
                opts,
                &format!("{}/_manifests/revisions/sha256/{digest}", self.name()),
            );
        }
        Ok(())
    }

    fn clean_tag(&self, tag: &str, opts: &CleanupOptions, stats: &mut CleanStats) -> Result<()> {
        if opts.remove {
            if !self.has_tag(tag)? {
                return Err(CleanError::NoSuchTag {
                    repository: self.name().to_owned(),
                    tag: tag.to_owned(),
                });
            }
            self.remove_tag(tag)?;
            stats.tags_removed += 1;
            report_removed(opts, &format!("{}/_manifests/tags/{tag}", self.name()));
        } else {
            self.prune_tag_index(tag, opts, stats)?;
            self.prune_revisions(opts, stats)?;
        }
        Ok(())
    }
}

impl RegistryStore {
    /// Clean one repository according to a validated `repository[:tag]`
    /// reference:
    ///
    /// - with `remove` and no tag (or a tag that is the repository's only
    ///   one), the whole repository directory is removed;
    /// - with `remove` and a tag among others, only that tag's directory is
    ///   removed;
    /// - without `remove` and a tag, the tag's stale index entries and the
    ///   repository's orphaned revisions are pruned;
    /// - without `remove` and no tag, index entries outside the union of all
    ///   tags' current digests are pruned, then orphaned revisions.
    pub fn clean_repository(&self, image: &str, opts: &CleanupOptions) -> Result<CleanStats> {
        let (name, tag) = split_reference(image);
        let repository = self.repository(name)?;
        let mut stats = CleanStats::default();

        if opts.remove {
            let tags = repository.tags()?;
            let whole = match tag {
                None => true,
                Some(tag) => tags.len() == 1 && tags[0] == tag,
            };
            if whole {
                drop(repository);
                self.remove_repository(name)?;
                stats.repositories_removed += 1;
                report_removed(opts, name);
                return Ok(stats);
            }
        }

        if let Some(tag) = tag {
            repository.clean_tag(tag, opts, &mut stats)?;
            return Ok(stats);
        }

        // Union of current digests, read fresh from the current links. A tag
        // whose current link is missing contributes nothing; the store is
        // quiescent, so that only happens for trees broken before we started.
        let mut currents = HashSet::new();
        for tag in repository.tags()? {
            match repository.current_digest(&tag) {
                Ok(digest) => {
                    currents.insert(digest);
                }
                Err(CleanError::NoSuchTag { .. }) => {
                    trace!("{name}: tag {tag} has no current link");
                }
                Err(err) => return Err(err),
            }
        }

        for tag in repository.tags()? {
            for digest in repository.index_digests(&tag)? {
                if currents.contains(&digest) {
                    continue;
                }
                repository.remove_index_entry(&tag, &digest)?;
                stats.index_entries_removed += 1;
                report_removed(
                    opts,
                    &format!("{name}/_manifests/tags/{tag}/index/sha256/{digest}"),
                );
            }
        }

        repository.prune_revisions(opts, &mut stats)?;
        Ok(stats)
    }
}
