use miette::Diagnostic;
use offreg_config::error::ConfigError;
use offreg_core::RegistryError;
use offreg_server::ServiceError;
use offreg_utils::error::UtilsError;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum OffregError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Utils(#[from] UtilsError),

    #[error("{failed} of {total} package sources could not be registered")]
    #[diagnostic(
        code(offreg::registration),
        help("Fix or remove the sources reported above")
    )]
    Registration { failed: usize, total: usize },

    #[error("Failed to run `{command}`: {source}")]
    #[diagnostic(
        code(offreg::installer_spawn),
        help("Make sure the installer is on PATH or set `installer` in the config")
    )]
    InstallerSpawn {
        command: String,
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}")]
    #[diagnostic(code(offreg::installer_failed))]
    InstallerFailed { command: String, status: String },

    #[error("npm install skipped")]
    #[diagnostic(
        code(offreg::install_skipped),
        help("Pass npm arguments after the package sources, e.g. `install --no-save`")
    )]
    InstallSkipped,

    #[error("Error while {action}: {source}")]
    #[diagnostic(code(offreg::io))]
    IoError {
        action: String,
        source: std::io::Error,
    },
}

pub type OffregResult<T> = std::result::Result<T, OffregError>;
