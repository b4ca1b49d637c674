//! Orchestration of a full cleanup pass.
//!
//! A pass moves through four phases: take the registry offline, prune the
//! requested repositories, run the registry's own garbage collector over the
//! blob store, and bring the registry back online. The offline bracket is
//! what makes pruning safe: a concurrent push could otherwise create a tag
//! between the index read and the revision sweep and lose a revision that
//! was about to become live.
//!
//! Per-repository failures do not abort the pass. The collector runs even
//! when repositories failed, so that revisions orphaned during a partial
//! failure are still swept, and the registry is restarted unconditionally.

use anyhow::{Context, Result};
use fn_error_context::context;
use log::{debug, error};

use crate::error::CleanError;
use crate::prune::CleanupOptions;
use crate::reference::is_valid_reference;
use crate::store::RegistryStore;

/// Control over the registry serving process and its garbage collector.
///
/// The production implementation is [`DockerControl`]; tests use an
/// in-memory fake.
///
/// [`DockerControl`]: crate::docker::DockerControl
pub trait ControlPlane {
    /// Take the registry offline. Must succeed before any mutation.
    fn stop(&mut self) -> Result<()>;

    /// Bring the registry back online.
    fn start(&mut self) -> Result<()>;

    /// Run the registry garbage collector over the whole store, forwarding
    /// its output. Returns whether the collector reported success.
    fn run_collector(&mut self) -> Result<bool>;
}

/// Runs cleanup passes against one store through one control plane.
pub struct Cleaner<C: ControlPlane> {
    store: RegistryStore,
    control: C,
    opts: CleanupOptions,
}

impl<C: ControlPlane> Cleaner<C> {
    pub fn new(store: RegistryStore, control: C, opts: CleanupOptions) -> Self {
        Self {
            store,
            control,
            opts,
        }
    }

    /// Run one cleanup pass over the given `repository[:tag]` references, or
    /// over every top-level repository when none are given.
    ///
    /// Returns the combined success flag: false when any per-repository
    /// action, the collector, or the registry restart failed. Invalid
    /// references and a failure to stop the registry are errors, raised
    /// before anything is mutated.
    #[context("Cleaning registry")]
    pub fn run(&mut self, images: &[String]) -> Result<bool> {
        for image in images {
            if !is_valid_reference(image) {
                return Err(CleanError::InvalidReference(image.clone()).into());
            }
        }

        self.control
            .stop()
            .context("Stopping registry container")?;

        let mut ok = self.prune_repositories(images);

        // Runs even after per-repository failures: revisions orphaned during
        // a partial failure still need to be swept.
        match self.control.run_collector() {
            Ok(true) => {}
            Ok(false) => {
                error!("garbage collector reported failure");
                ok = false;
            }
            Err(err) => {
                error!("failed to run garbage collector: {err:#}");
                ok = false;
            }
        }

        if let Err(err) = self.control.start() {
            error!("failed to restart registry container: {err:#}");
            ok = false;
        }

        Ok(ok)
    }

    fn prune_repositories(&self, images: &[String]) -> bool {
        let targets = if images.is_empty() {
            match self.store.list_repositories() {
                Ok(targets) => targets,
                Err(err) => {
                    error!("failed to list repositories: {err}");
                    return false;
                }
            }
        } else {
            images.to_vec()
        };

        let mut ok = true;
        for image in &targets {
            match self.store.clean_repository(image, &self.opts) {
                Ok(stats) => debug!("{image}: {stats:?}"),
                Err(err) => {
                    error!("{err}");
                    ok = false;
                }
            }
        }
        ok
    }
}
