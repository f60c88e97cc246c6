use std::{
    fmt, fs,
    path::PathBuf,
    sync::{LazyLock, RwLock},
};

use documented::{Documented, DocumentedFields};
use offreg_utils::path::{resolve_path, xdg_config_home};
use serde::{Deserialize, Serialize};
use toml_edit::DocumentMut;
use tracing::info;

use crate::{
    annotations::annotate_toml_table,
    error::{ConfigError, Result},
};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 0;
pub const DEFAULT_CONCURRENCY: usize = 100;
pub const DEFAULT_INSTALLER: &str = "npm";

/// How `dist-tags.latest` is chosen among the registered versions of a package.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LatestPolicy {
    /// Greatest semantic version; pre-releases only when nothing else exists.
    #[default]
    Highest,
    /// Most recently registered version.
    LastRegistered,
}

impl fmt::Display for LatestPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatestPolicy::Highest => write!(f, "highest"),
            LatestPolicy::LastRegistered => write!(f, "last-registered"),
        }
    }
}

/// offreg configuration
#[derive(Clone, Debug, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct Config {
    /// Host name the registry binds to and advertises to the installer.
    /// Default: localhost
    pub host: Option<String>,

    /// Port to listen on. 0 lets the operating system pick a free port.
    /// Default: 0
    pub port: Option<u16>,

    /// Maximum number of command-line paths inspected at the same time.
    /// Default: 100
    pub concurrency: Option<usize>,

    /// How dist-tags.latest is picked: "highest" (semantic version) or "last-registered".
    /// Default: highest
    pub latest_policy: Option<LatestPolicy>,

    /// Installer executable that is pointed at the registry.
    /// Default: npm
    pub installer: Option<String>,
}

pub static CONFIG: LazyLock<RwLock<Option<Config>>> = LazyLock::new(|| RwLock::new(None));

pub static CONFIG_PATH: LazyLock<RwLock<PathBuf>> = LazyLock::new(|| {
    RwLock::new(match std::env::var("OFFREG_CONFIG") {
        Ok(path_str) => PathBuf::from(path_str),
        Err(_) => xdg_config_home().join("offreg").join("config.toml"),
    })
});

/// Loads the configuration file into the global slot.
pub fn init() -> Result<()> {
    let config = Config::new()?;
    let mut global_config = CONFIG.write().unwrap();
    *global_config = Some(config);
    Ok(())
}

/// Overrides the configuration file location. Relative paths and variables are resolved.
pub fn set_config_path(path: &str) -> Result<()> {
    let resolved = resolve_path(path)?;
    let mut config_path = CONFIG_PATH.write().unwrap();
    *config_path = resolved;
    Ok(())
}

pub fn get_config() -> Config {
    {
        let config_guard = CONFIG.read().unwrap();
        if let Some(config) = config_guard.as_ref() {
            return config.clone();
        }
    }

    let mut config_guard = CONFIG.write().unwrap();
    config_guard
        .get_or_insert_with(Config::default_config)
        .clone()
}

impl Config {
    pub fn default_config() -> Self {
        Self {
            host: Some(DEFAULT_HOST.to_string()),
            port: Some(DEFAULT_PORT),
            concurrency: Some(DEFAULT_CONCURRENCY),
            latest_policy: Some(LatestPolicy::default()),
            installer: Some(DEFAULT_INSTALLER.to_string()),
        }
    }

    /// Creates a new configuration by loading it from the configuration file.
    /// If the configuration file is not found, it uses the default configuration.
    pub fn new() -> Result<Self> {
        if std::env::var("OFFREG_STEALTH").is_ok() {
            return Ok(Self::default_config());
        }

        let config_path = CONFIG_PATH.read().unwrap().to_path_buf();

        let mut config = match fs::read_to_string(&config_path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default_config(),
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;

        Ok(config)
    }

    /// Validates the loaded values and fills in defaults for missing ones.
    pub fn resolve(&mut self) -> Result<()> {
        if self.host.as_deref().is_some_and(|h| h.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "host",
                reason: "must not be empty".into(),
            });
        }
        if self.installer.as_deref().is_some_and(|i| i.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "installer",
                reason: "must not be empty".into(),
            });
        }
        if self.concurrency == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "concurrency",
                reason: "must be at least 1".into(),
            });
        }

        self.host.get_or_insert_with(|| DEFAULT_HOST.to_string());
        self.port.get_or_insert(DEFAULT_PORT);
        self.concurrency.get_or_insert(DEFAULT_CONCURRENCY);
        self.latest_policy.get_or_insert_with(LatestPolicy::default);
        self.installer
            .get_or_insert_with(|| DEFAULT_INSTALLER.to_string());

        Ok(())
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(DEFAULT_CONCURRENCY)
    }

    pub fn latest_policy(&self) -> LatestPolicy {
        self.latest_policy.unwrap_or_default()
    }

    pub fn installer(&self) -> &str {
        self.installer.as_deref().unwrap_or(DEFAULT_INSTALLER)
    }

    pub fn to_annotated_document(&self) -> Result<DocumentMut> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut doc = toml_string.parse::<DocumentMut>()?;

        annotate_toml_table::<Config>(doc.as_table_mut())?;

        Ok(doc)
    }
}

/// Writes the annotated default configuration to [`CONFIG_PATH`].
pub fn generate_default_config() -> Result<PathBuf> {
    let config_path = CONFIG_PATH.read().unwrap().to_path_buf();

    if config_path.exists() {
        return Err(ConfigError::ConfigAlreadyExists);
    }

    let annotated_doc = Config::default_config().to_annotated_document()?;

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&config_path, annotated_doc.to_string())?;
    info!(
        "Default configuration file generated with documentation at: {}",
        config_path.display()
    );
    Ok(config_path)
}
