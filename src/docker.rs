//! Docker control plane for the registry container.
//!
//! Stops and starts the registry container around a cleanup pass and runs
//! the registry's `garbage-collect` command, all through the `docker` CLI.
//! Connecting also performs environment discovery: the container must run
//! the `registry:2` image at version 2.4.0 or later (older registries have
//! no garbage collector), and the filesystem storage root is resolved from
//! `REGISTRY_STORAGE_FILESYSTEM_ROOTDIRECTORY` — taken from the calling
//! environment or the container's configuration — falling back to the stock
//! image default. When this process runs outside the container, the storage
//! root is translated to a host path through the container's bind mounts.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, bail, Context, Result};
use fn_error_context::context;
use log::debug;
use serde::Deserialize;

use crate::cleaner::ControlPlane;
use crate::prune::CleanupOptions;

const REGISTRY_IMAGE: &str = "registry:2";
const MIN_REGISTRY_VERSION: (u64, u64, u64) = (2, 4, 0);
const ROOTDIR_ENV: &str = "REGISTRY_STORAGE_FILESYSTEM_ROOTDIRECTORY";
/// Storage root in the stock registry:2 image configuration.
const DEFAULT_ROOTDIR: &str = "/var/lib/registry";
const COLLECTOR_CONFIG: &str = "/etc/docker/registry/config.yml";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerInfo {
    id: String,
    config: ContainerConfig,
    state: ContainerState,
    #[serde(default)]
    mounts: Vec<Mount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerConfig {
    image: String,
    #[serde(default)]
    env: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerState {
    running: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Mount {
    destination: String,
    source: String,
}

/// Production [`ControlPlane`] talking to the Docker daemon through its CLI.
#[derive(Debug)]
pub struct DockerControl {
    container: String,
    registry_dir: PathBuf,
    dockerized: bool,
    quiet: bool,
}

impl DockerControl {
    /// Inspect the registry container and resolve its storage root. Fails
    /// before any mutation when the container is unsuitable: wrong image,
    /// registry older than 2.4.0, or a storage root this process cannot
    /// reach.
    #[context("Connecting to registry container {container}")]
    pub fn connect(container: &str, opts: &CleanupOptions) -> Result<Self> {
        let info = inspect(container)?;
        if info.config.image != REGISTRY_IMAGE {
            bail!("container {container} is not running the {REGISTRY_IMAGE} image");
        }

        let version = registry_version(&info, container)?;
        if !version_at_least(&version, MIN_REGISTRY_VERSION) {
            bail!("registry {version} is too old: the garbage collector requires 2.4.0+");
        }

        let dockerized = Path::new("/.dockerenv").is_file();
        let registry_dir = resolve_registry_dir(&info, dockerized)?;
        debug!("registry storage at {}", registry_dir.display());

        Ok(Self {
            container: info.id,
            registry_dir,
            dockerized,
            quiet: opts.quiet,
        })
    }

    /// The `repositories` tree under the resolved storage root.
    pub fn store_root(&self) -> PathBuf {
        self.registry_dir.join("docker/registry/v2/repositories")
    }
}

impl ControlPlane for DockerControl {
    #[context("Stopping container")]
    fn stop(&mut self) -> Result<()> {
        run_checked(&mut docker(&["stop", &self.container]))
    }

    #[context("Starting container")]
    fn start(&mut self) -> Result<()> {
        run_checked(&mut docker(&["start", &self.container]))
    }

    #[context("Running registry garbage collector")]
    fn run_collector(&mut self) -> Result<bool> {
        let mut cmd = if self.dockerized {
            // Inside the registry container the binary is directly available.
            let mut cmd = Command::new("/bin/registry");
            cmd.args(["garbage-collect", COLLECTOR_CONFIG]);
            cmd
        } else {
            let volume = format!("{}:{DEFAULT_ROOTDIR}", self.registry_dir.display());
            docker(&[
                "run",
                "--rm",
                "-v",
                &volume,
                REGISTRY_IMAGE,
                "garbage-collect",
                COLLECTOR_CONFIG,
            ])
        };

        let output = cmd.output().context("Spawning garbage collector")?;
        if !self.quiet || !output.status.success() {
            std::io::stdout().write_all(&output.stdout)?;
            std::io::stderr().write_all(&output.stderr)?;
        }
        Ok(output.status.success())
    }
}

fn docker(args: &[&str]) -> Command {
    let mut cmd = Command::new("docker");
    cmd.args(args);
    cmd
}

fn run_checked(cmd: &mut Command) -> Result<()> {
    let output = cmd.output().context("Spawning docker")?;
    if !output.status.success() {
        bail!(
            "docker command failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

fn inspect(container: &str) -> Result<ContainerInfo> {
    let output = docker(&["inspect", container])
        .output()
        .context("Running docker inspect")?;
    if !output.status.success() {
        bail!(
            "cannot inspect container {container}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    let mut info: Vec<ContainerInfo> =
        serde_json::from_slice(&output.stdout).context("Decoding docker inspect output")?;
    info.pop()
        .ok_or_else(|| anyhow!("no such container: {container}"))
}

/// Query the distribution version the container runs, e.g. `v2.8.3`.
fn registry_version(info: &ContainerInfo, container: &str) -> Result<String> {
    let output = if info.state.running {
        docker(&["exec", container, "/bin/registry", "--version"]).output()
    } else {
        docker(&["run", "--rm", &info.config.image, "--version"]).output()
    }
    .context("Querying registry version")?;

    // "registry github.com/docker/distribution v2.8.3"
    let text = String::from_utf8_lossy(&output.stdout);
    text.split_whitespace()
        .nth(2)
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("unexpected registry version output: {text:?}"))
}

fn version_at_least(version: &str, min: (u64, u64, u64)) -> bool {
    let mut parts = version
        .trim_start_matches('v')
        .split(['.', '-', '+'])
        .map_while(|part| part.parse::<u64>().ok());
    let have = (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    );
    have >= min
}

fn resolve_registry_dir(info: &ContainerInfo, dockerized: bool) -> Result<PathBuf> {
    let dir = std::env::var_os(ROOTDIR_ENV)
        .map(PathBuf::from)
        .or_else(|| {
            info.config.env.iter().find_map(|entry| {
                let (var, value) = entry.split_once('=')?;
                (var == ROOTDIR_ENV).then(|| PathBuf::from(value))
            })
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOTDIR));

    if dockerized {
        return Ok(dir);
    }

    // Outside the container the storage root is only reachable through a
    // bind mount; translate the container path to its host source.
    for mount in &info.mounts {
        if Path::new(&mount.destination) == dir {
            return Ok(PathBuf::from(&mount.source));
        }
    }
    bail!(
        "unsupported storage driver: {} is not bind-mounted from the host",
        dir.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    const INSPECT_JSON: &str = r#"[{
        "Id": "5a9b3c0f71",
        "State": { "Running": true },
        "Config": {
            "Image": "registry:2",
            "Env": [
                "PATH=/usr/local/sbin:/usr/local/bin",
                "REGISTRY_STORAGE_FILESYSTEM_ROOTDIRECTORY=/var/lib/registry"
            ]
        },
        "Mounts": [
            { "Destination": "/var/lib/registry", "Source": "/srv/registry-data" }
        ]
    }]"#;

    fn canned_info() -> ContainerInfo {
        let mut info: Vec<ContainerInfo> = serde_json::from_str(INSPECT_JSON).unwrap();
        info.pop().unwrap()
    }

    #[test]
    fn test_decode_inspect_output() {
        let info = canned_info();
        assert_eq!(info.id, "5a9b3c0f71");
        assert_eq!(info.config.image, "registry:2");
        assert!(info.state.running);
        assert_eq!(info.mounts.len(), 1);
    }

    #[test]
    fn test_resolve_registry_dir_dockerized() {
        let dir = resolve_registry_dir(&canned_info(), true).unwrap();
        assert_eq!(dir, PathBuf::from("/var/lib/registry"));
    }

    #[test]
    fn test_resolve_registry_dir_through_mounts() {
        let dir = resolve_registry_dir(&canned_info(), false).unwrap();
        assert_eq!(dir, PathBuf::from("/srv/registry-data"));
    }

    #[test]
    fn test_resolve_registry_dir_unmounted() {
        let mut info = canned_info();
        info.mounts.clear();
        assert!(resolve_registry_dir(&info, false).is_err());
    }

    #[test]
    fn test_version_at_least() {
        let min = MIN_REGISTRY_VERSION;
        assert!(version_at_least("v2.4.0", min));
        assert!(version_at_least("v2.8.3", min));
        assert!(version_at_least("2.4.1", min));
        assert!(version_at_least("v3.0.0-rc.1", min));
        assert!(!version_at_least("v2.3.1", min));
        assert!(!version_at_least("v2.3", min));
        assert!(!version_at_least("garbage", min));
    }
}
