//! Driving the installer against the local registry.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{OffregError, OffregResult};

/// Values `npm config get` prints for an unset key.
const UNSET_VALUES: [&str; 3] = ["", "undefined", "null"];

pub struct Installer {
    program: String,
}

impl Installer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn describe(&self, args: &[&str]) -> String {
        std::iter::once(self.program.as_str())
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Runs the installer with `args`, its output captured.
    async fn output(&self, args: &[&str]) -> OffregResult<String> {
        let command = self.describe(args);
        debug!("running `{command}`");

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .await
            .map_err(|source| {
                OffregError::InstallerSpawn {
                    command: command.clone(),
                    source,
                }
            })?;

        if !output.status.success() {
            return Err(OffregError::InstallerFailed {
                command,
                status: output.status.to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// The currently configured registry, `None` when unset.
    pub async fn registry(&self) -> OffregResult<Option<String>> {
        let value = self.output(&["config", "get", "registry"]).await?;
        Ok(Some(value).filter(|v| !UNSET_VALUES.contains(&v.as_str())))
    }

    pub async fn set_registry(&self, url: &str) -> OffregResult<()> {
        self.output(&["config", "set", "registry", url]).await?;
        Ok(())
    }

    /// Puts back `previous`, or removes the setting if there was none.
    pub async fn restore_registry(&self, previous: Option<&str>) -> OffregResult<()> {
        match previous {
            Some(url) => self.set_registry(url).await,
            None => {
                self.output(&["config", "delete", "registry"]).await?;
                Ok(())
            }
        }
    }

    /// Runs the installer with the pass-through arguments on the terminal.
    pub async fn run(&self, args: &[String]) -> OffregResult<()> {
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let command = self.describe(&arg_refs);
        info!("Running `{command}`");

        let status = Command::new(&self.program)
            .args(args)
            .status()
            .await
            .map_err(|source| {
                OffregError::InstallerSpawn {
                    command: command.clone(),
                    source,
                }
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(OffregError::InstallerFailed {
                command,
                status: status.to_string(),
            })
        }
    }
}

/// Points the installer at `registry_url`, runs it and restores the
/// previous registry setting, even when the install fails.
pub async fn install_with_registry(
    installer: &Installer,
    registry_url: &str,
    args: &[String],
) -> OffregResult<()> {
    if args.is_empty() {
        return Err(OffregError::InstallSkipped);
    }

    let previous = installer.registry().await?;
    debug!("previous registry: {previous:?}");
    installer.set_registry(registry_url).await?;

    let result = installer.run(args).await;
    let restored = installer.restore_registry(previous.as_deref()).await;

    result.and(restored)
}

#[cfg(all(test, unix))]
mod tests {
    use std::{fs, os::unix::fs::PermissionsExt, path::Path};

    use serial_test::serial;

    use super::*;

    /// A fake installer that keeps `npm config` state in a file and records
    /// every invocation.
    fn fake_npm(dir: &Path, initial_registry: Option<&str>) -> String {
        let state = dir.join("registry");
        if let Some(url) = initial_registry {
            fs::write(&state, url).unwrap();
        }
        let log = dir.join("calls");
        let script = dir.join("npm");
        fs::write(
            &script,
            format!(
                r#"#!/bin/sh
echo "$@" >> "{log}"
case "$1 $2" in
  "config get") if [ -f "{state}" ]; then cat "{state}"; else echo undefined; fi ;;
  "config set") printf '%s' "$4" > "{state}" ;;
  "config delete") rm -f "{state}" ;;
  *) [ "$1" = "fail" ] && exit 3 ;;
esac
exit 0
"#,
                log = log.display(),
                state = state.display(),
            ),
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        script.to_string_lossy().into_owned()
    }

    fn calls(dir: &Path) -> Vec<String> {
        fs::read_to_string(dir.join("calls"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    #[serial]
    async fn test_skipped_without_arguments() {
        let tmp = tempfile::tempdir().unwrap();
        let installer = Installer::new(fake_npm(tmp.path(), None));

        let err = install_with_registry(&installer, "http://localhost:1/", &[])
            .await
            .unwrap_err();

        assert!(matches!(err, OffregError::InstallSkipped));
        assert_eq!(err.to_string(), "npm install skipped");
        assert!(calls(tmp.path()).is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_previous_registry_is_restored() {
        let tmp = tempfile::tempdir().unwrap();
        let installer = Installer::new(fake_npm(tmp.path(), Some("https://mirror.example/")));

        install_with_registry(
            &installer,
            "http://localhost:1/",
            &["install".to_string(), "--no-save".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(
            calls(tmp.path()),
            [
                "config get registry",
                "config set registry http://localhost:1/",
                "install --no-save",
                "config set registry https://mirror.example/",
            ]
        );
        assert_eq!(
            fs::read_to_string(tmp.path().join("registry")).unwrap(),
            "https://mirror.example/"
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_unset_registry_is_deleted_after_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let installer = Installer::new(fake_npm(tmp.path(), None));

        let err = install_with_registry(&installer, "http://localhost:1/", &["fail".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, OffregError::InstallerFailed { .. }));
        assert_eq!(calls(tmp.path()).last().unwrap(), "config delete registry");
        assert!(!tmp.path().join("registry").exists());
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_installer() {
        let tmp = tempfile::tempdir().unwrap();
        let installer = Installer::new(tmp.path().join("nope").to_string_lossy());

        let err = installer.registry().await.unwrap_err();
        assert!(matches!(err, OffregError::InstallerSpawn { .. }));
    }
}
