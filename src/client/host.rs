//! Local host adapter: command execution and disk accounting.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::client::HostClient;
use crate::core::errors::{DswError, Result};

/// [`HostClient`] executing probes on the local machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalHost;

impl LocalHost {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostClient for LocalHost {
    async fn run_command(&self, program: &str, args: &[&str]) -> Result<String> {
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|error| DswError::HostCommand {
                command: program.to_string(),
                details: error.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DswError::HostCommand {
                command: format!("{program} {}", args.join(" ")),
                details: format!("exit {}: {}", output.status, stderr.trim()),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn disk_free_bytes(&self, path: &Path) -> Result<u64> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || statvfs_free_bytes(&path))
            .await
            .map_err(|error| DswError::HostCommand {
                command: "statvfs".to_string(),
                details: error.to_string(),
            })?
    }
}

#[cfg(unix)]
fn statvfs_free_bytes(path: &Path) -> Result<u64> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(|error| DswError::HostCommand {
        command: format!("statvfs {}", path.display()),
        details: error.to_string(),
    })?;
    Ok(stat.blocks_available().saturating_mul(stat.fragment_size()))
}

#[cfg(not(unix))]
fn statvfs_free_bytes(path: &Path) -> Result<u64> {
    Err(DswError::HostCommand {
        command: format!("statvfs {}", path.display()),
        details: "free-space query is only implemented on unix".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HostClient;

    #[tokio::test]
    async fn captures_stdout_of_successful_command() {
        let host = LocalHost::new();
        let out = host.run_command("echo", &["hello"]).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let host = LocalHost::new();
        let err = host.run_command("false", &[]).await.unwrap_err();
        assert_eq!(err.code(), "DSW-4001");
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let host = LocalHost::new();
        let err = host
            .run_command("docksweep-no-such-binary", &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DSW-4001");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn root_filesystem_reports_free_space() {
        let host = LocalHost::new();
        let free = host.disk_free_bytes(Path::new("/")).await.unwrap();
        assert!(free > 0);
    }
}
