//! Platform capability queries
//!
//! Answers the handful of questions whose answer differs between macOS
//! and Linux: which tar binary to run, how to spell a bind-mount path,
//! and which commands open up a cache directory for the container.

use std::path::{Path, PathBuf};

/// Detected platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// macOS with Docker Desktop (or similar VM-backed runtime)
    MacOS,
    /// Linux with a native runtime
    Linux,
    /// Unsupported platform
    Unsupported,
}

impl Platform {
    /// Detect the current platform
    pub fn detect() -> Self {
        match std::env::consts::OS {
            "macos" => Platform::MacOS,
            "linux" => Platform::Linux,
            _ => Platform::Unsupported,
        }
    }

    /// Get a human-readable platform name
    pub fn name(&self) -> &'static str {
        match self {
            Platform::MacOS => "macOS",
            Platform::Linux => "Linux",
            Platform::Unsupported => "Unsupported",
        }
    }
}

/// A command that adjusts permissions on a cache directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Ownership changes may fail without privileges and are only attempted
    pub ownership: bool,
}

impl PermissionCommand {
    /// Render as a shell-like string for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Stateless platform capability probe
#[derive(Debug, Clone, Copy)]
pub struct PlatformProbe {
    platform: Platform,
}

impl PlatformProbe {
    /// Probe the running platform
    pub fn detect() -> Self {
        Self::for_platform(Platform::detect())
    }

    /// Probe answers for an explicit platform
    pub fn for_platform(platform: Platform) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// tar binary name; GNU tar is preferred on macOS when installed
    pub fn tar_binary(&self) -> String {
        if self.platform == Platform::MacOS && find_on_path("gtar").is_some() {
            "gtar".to_string()
        } else {
            "tar".to_string()
        }
    }

    /// Host path form accepted by the container runtime's `-v` flag
    pub fn volume_path(&self, path: &Path) -> String {
        let resolved = match self.platform {
            // Docker Desktop file sharing only matches fully resolved paths
            Platform::MacOS => path
                .canonicalize()
                .or_else(|_| std::path::absolute(path))
                .unwrap_or_else(|_| path.to_path_buf()),
            _ => std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
        };
        resolved.display().to_string()
    }

    /// Commands that make `dir` usable by the container process
    pub fn permission_commands(&self, dir: &Path) -> Vec<PermissionCommand> {
        let dir = dir.display().to_string();
        match self.platform {
            Platform::MacOS => {
                // SAFETY: getuid/getgid cannot fail and touch no memory
                let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
                vec![
                    PermissionCommand {
                        program: "chmod".to_string(),
                        args: vec!["-R".to_string(), "755".to_string(), dir.clone()],
                        ownership: false,
                    },
                    PermissionCommand {
                        program: "chown".to_string(),
                        args: vec!["-R".to_string(), format!("{}:{}", uid, gid), dir],
                        ownership: true,
                    },
                ]
            }
            _ => vec![PermissionCommand {
                program: "chmod".to_string(),
                args: vec!["-R".to_string(), "777".to_string(), dir],
                ownership: false,
            }],
        }
    }
}

impl Default for PlatformProbe {
    fn default() -> Self {
        Self::detect()
    }
}

/// Locate an executable on PATH
fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
