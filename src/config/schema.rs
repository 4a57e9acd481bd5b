//! Configuration schema for cachepipe
//!
//! Configuration is stored at `~/.config/cachepipe/config.toml`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Remote cache release
    pub remote: RemoteConfig,

    /// Local workspace
    pub workspace: WorkspaceConfig,

    /// Containerized build environment
    pub container: ContainerConfig,

    /// Build invocation
    pub build: BuildConfig,

    /// Documented performance targets
    pub targets: TargetsConfig,

    /// Prerequisite checks
    pub prereq: PrereqConfig,

    /// External tool overrides
    pub tools: ToolsConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Remote release holding the cache archives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL; objects are fetched from `<base_url>/<name>`
    pub base_url: String,

    /// Split parts of the downloads archive, in concatenation order
    pub downloads_parts: Vec<String>,

    /// Build-state (sstate) archive name
    pub sstate: String,

    /// Optional informational object
    pub info: Option<String>,

    /// Expected SHA-256 (lowercase hex) per object name
    pub checksums: BTreeMap<String, String>,

    /// Seconds to wait for response headers of each object (0 = none).
    /// Body transfer of large archives is never cut off.
    pub timeout_secs: u64,

    /// Fetch the split parts concurrently
    pub concurrent_parts: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://github.com/jayleekr/kea-yocto/releases/download/split-cache-20250612-153704"
                .to_string(),
            downloads_parts: ["aa", "ab", "ac", "ad"]
                .iter()
                .map(|suffix| format!("full-downloads-cache.tar.gz.part{}", suffix))
                .collect(),
            sstate: "full-sstate-cache.tar.gz".to_string(),
            info: Some("full-cache-info.txt".to_string()),
            checksums: BTreeMap::new(),
            timeout_secs: 0,
            concurrent_parts: false,
        }
    }
}

/// Workspace settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Workspace root directory
    pub path: PathBuf,

    /// Keep source archives after extraction
    pub keep_archives: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./yocto-workspace-test"),
            keep_archives: false,
        }
    }
}

/// Container settings for the build
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Container runtime binary (docker, podman, or a path)
    pub runtime: String,

    /// Build image
    pub image: String,

    /// Mount point of the downloads cache inside the container
    pub downloads_mount: String,

    /// Mount point of the sstate cache inside the container
    pub sstate_mount: String,

    /// BB_NUMBER_THREADS
    pub threads: u32,

    /// PARALLEL_MAKE job count
    pub parallel_make: u32,

    /// MACHINE
    pub machine: String,

    /// Build directory inside the container
    pub build_dir: String,

    /// Environment setup script sourced before building
    pub init_script: String,

    /// Additional environment variables
    pub extra_env: BTreeMap<String, String>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            image: "jabang3/yocto-lecture:5.0-lts".to_string(),
            downloads_mount: "/opt/yocto/downloads".to_string(),
            sstate_mount: "/opt/yocto/sstate-cache".to_string(),
            threads: 4,
            parallel_make: 4,
            machine: "qemux86-64".to_string(),
            build_dir: "/tmp/test-build".to_string(),
            init_script: "/opt/poky/oe-init-build-env".to_string(),
            extra_env: BTreeMap::new(),
        }
    }
}

/// Build invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Target to build
    pub target: String,

    /// Hard wall-clock limit in seconds
    pub timeout_secs: u64,

    /// Output lines kept for diagnostics on failure
    pub tail_lines: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            target: "core-image-minimal".to_string(),
            timeout_secs: 3600,
            tail_lines: 20,
        }
    }
}

/// Documented performance targets and effectiveness bands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    /// Minimum hit rate (inclusive) to meet the documented target
    pub min_hit_rate_percent: f64,

    /// Maximum build time (inclusive) to meet the documented target
    pub max_duration_minutes: f64,

    /// Hit rate strictly above this is "Excellent"
    pub excellent_above: f64,

    /// Hit rate strictly above this is "Good"
    pub good_above: f64,

    /// Assumed slowdown of an uncached build
    pub uncached_speedup_factor: f64,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            min_hit_rate_percent: 80.0,
            max_duration_minutes: 30.0,
            excellent_above: 80.0,
            good_above: 60.0,
            uncached_speedup_factor: 5.0,
        }
    }
}

/// Prerequisite check settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrereqConfig {
    /// Probe the remote base URL before fetching
    pub check_remote: bool,

    /// Required free disk space in GB (0 = skip)
    pub min_free_gb: f64,

    /// Pull the image when it is not present locally
    pub pull_missing_image: bool,
}

impl Default for PrereqConfig {
    fn default() -> Self {
        Self {
            check_remote: true,
            min_free_gb: 10.0,
            pull_missing_image: true,
        }
    }
}

/// External tool overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// tar binary (defaults to the platform's GNU tar)
    pub tar: Option<String>,
}
