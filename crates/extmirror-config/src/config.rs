use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use documented::{Documented, DocumentedFields};
use extmirror_utils::{
    fs::ensure_dir_exists,
    path::{resolve_path, xdg_config_home, xdg_data_home},
    time::parse_duration,
};
use serde::{Deserialize, Serialize};
use toml_edit::DocumentMut;
use tracing::{debug, info};
use url::Url;

use crate::{
    annotations::annotate_toml_table,
    error::{ConfigError, Result},
};

pub const DEFAULT_API_URL: &str = "https://addons.mozilla.org/api/v4/addons/search/";
pub const DEFAULT_SORT: &str = "created";
pub const DEFAULT_ITEM_TYPE: &str = "extension";
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_MAX_ROUNDS: u32 = 16;
pub const DEFAULT_RETRY_DELAY: &str = "1s";
pub const DEFAULT_REQUEST_TIMEOUT: &str = "60s";
pub const DEFAULT_PARTITION_THRESHOLD: u64 = 100;
pub const DEFAULT_STORE_DEPTH: usize = 4;
pub const DEFAULT_STORE_WIDTH: usize = 1;

pub const SNAPSHOT_FILE_NAME: &str = "catalog.json.zst";
pub const STORE_DIR_NAME: &str = "webext_data";

const CONFIG_ENV: &str = "EXTMIRROR_CONFIG";
const WORKDIR_ENV: &str = "EXTMIRROR_WORKDIR";

/// Mirror configuration
#[derive(Clone, Debug, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct Config {
    /// Directory holding the catalog snapshot and the package store.
    /// Overridden by $EXTMIRROR_WORKDIR.
    /// Default: $XDG_DATA_HOME/extmirror
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,

    /// Catalog search endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Sort order requested from the catalog.
    /// Default: created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,

    /// Item type requested from the catalog.
    /// Default: extension
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,

    /// Number of catalog records requested per page.
    /// Default: 50
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,

    /// Maximum number of requests in flight at once.
    /// Default: 10
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Maximum number of retry rounds for catalog pages and package
    /// downloads before the remaining work is reported as unfinished.
    /// Default: 16
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,

    /// Pause between retry rounds (e.g. "500ms", "2s").
    /// Default: 1s
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<String>,

    /// Timeout applied to every HTTP request.
    /// Default: 60s
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,

    /// Popularity threshold used to split a listing that exceeds the catalog's
    /// result window into two queries.
    /// Default: 100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_threshold: Option<u64>,

    /// User agent sent with every request.
    /// Default: extmirror/<version>
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Number of directory levels used to shard the package store.
    /// Default: 4
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_depth: Option<usize>,

    /// Number of hash characters per shard directory.
    /// Default: 1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_width: Option<usize>,
}

/// Location of the configuration file.
///
/// An explicit path wins, then `$EXTMIRROR_CONFIG`, then
/// `$XDG_CONFIG_HOME/extmirror/config.toml`.
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(resolve_path(&path.to_string_lossy())?);
    }
    match env::var(CONFIG_ENV) {
        Ok(value) if !value.trim().is_empty() => Ok(resolve_path(&value)?),
        _ => Ok(xdg_config_home().join("extmirror").join("config.toml")),
    }
}

fn default_user_agent() -> String {
    format!("extmirror/{}", env!("CARGO_PKG_VERSION"))
}

impl Config {
    /// Configuration with every field set to its default.
    pub fn default_config() -> Self {
        Self {
            workdir: Some(
                xdg_data_home()
                    .join("extmirror")
                    .to_string_lossy()
                    .into_owned(),
            ),
            api_url: Some(DEFAULT_API_URL.to_string()),
            sort: Some(DEFAULT_SORT.to_string()),
            item_type: Some(DEFAULT_ITEM_TYPE.to_string()),
            page_size: Some(DEFAULT_PAGE_SIZE),
            concurrency: Some(DEFAULT_CONCURRENCY),
            max_rounds: Some(DEFAULT_MAX_ROUNDS),
            retry_delay: Some(DEFAULT_RETRY_DELAY.to_string()),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT.to_string()),
            partition_threshold: Some(DEFAULT_PARTITION_THRESHOLD),
            user_agent: Some(default_user_agent()),
            store_depth: Some(DEFAULT_STORE_DEPTH),
            store_width: Some(DEFAULT_STORE_WIDTH),
        }
    }

    /// Loads the configuration file, falling back to the defaults when it
    /// does not exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = config_path(explicit)?;

        let mut config: Config = match fs::read_to_string(&path) {
            Ok(content) => {
                debug!("loading configuration from {}", path.display());
                toml::from_str(&content)?
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no configuration at {}, using defaults", path.display());
                Self::default_config()
            }
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;
        Ok(config)
    }

    /// Fills unset fields with defaults, applies environment overrides, and
    /// validates the result.
    pub fn resolve(&mut self) -> Result<()> {
        let defaults = Self::default_config();

        if let Ok(workdir) = env::var(WORKDIR_ENV) {
            if !workdir.trim().is_empty() {
                self.workdir = Some(workdir);
            }
        }

        self.workdir = self.workdir.take().or(defaults.workdir);
        self.api_url = self.api_url.take().or(defaults.api_url);
        self.sort = self.sort.take().or(defaults.sort);
        self.item_type = self.item_type.take().or(defaults.item_type);
        self.page_size.get_or_insert(DEFAULT_PAGE_SIZE);
        self.concurrency.get_or_insert(DEFAULT_CONCURRENCY);
        self.max_rounds.get_or_insert(DEFAULT_MAX_ROUNDS);
        self.retry_delay = self.retry_delay.take().or(defaults.retry_delay);
        self.request_timeout = self.request_timeout.take().or(defaults.request_timeout);
        self.partition_threshold
            .get_or_insert(DEFAULT_PARTITION_THRESHOLD);
        self.user_agent = self.user_agent.take().or(defaults.user_agent);
        self.store_depth.get_or_insert(DEFAULT_STORE_DEPTH);
        self.store_width.get_or_insert(DEFAULT_STORE_WIDTH);

        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.page_size() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "page_size",
                reason: "must be greater than zero".into(),
            });
        }
        if self.concurrency() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "concurrency",
                reason: "must be greater than zero".into(),
            });
        }
        if self.max_rounds() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_rounds",
                reason: "must be greater than zero".into(),
            });
        }
        if self.store_width() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "store_width",
                reason: "must be greater than zero".into(),
            });
        }
        if self.store_depth() * self.store_width() >= extmirror_utils::hash::SHA256_HEX_LEN {
            return Err(ConfigError::InvalidValue {
                field: "store_depth",
                reason: "shards must leave part of the hash for the file name".into(),
            });
        }

        let api_url = self.api_url();
        match Url::parse(api_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(ConfigError::InvalidUrl(api_url.to_string())),
        }

        self.retry_delay()?;
        if self.request_timeout()?.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout",
                reason: "must be greater than zero".into(),
            });
        }

        Ok(())
    }

    /// Absolute path of the working directory.
    pub fn workdir(&self) -> Result<PathBuf> {
        match &self.workdir {
            Some(dir) => Ok(resolve_path(dir)?),
            None => Ok(xdg_data_home().join("extmirror")),
        }
    }

    pub fn snapshot_path(&self) -> Result<PathBuf> {
        Ok(self.workdir()?.join(SNAPSHOT_FILE_NAME))
    }

    pub fn store_path(&self) -> Result<PathBuf> {
        Ok(self.workdir()?.join(STORE_DIR_NAME))
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn sort(&self) -> &str {
        self.sort.as_deref().unwrap_or(DEFAULT_SORT)
    }

    pub fn item_type(&self) -> &str {
        self.item_type.as_deref().unwrap_or(DEFAULT_ITEM_TYPE)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(DEFAULT_CONCURRENCY)
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds.unwrap_or(DEFAULT_MAX_ROUNDS)
    }

    pub fn partition_threshold(&self) -> u64 {
        self.partition_threshold
            .unwrap_or(DEFAULT_PARTITION_THRESHOLD)
    }

    pub fn user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(default_user_agent)
    }

    pub fn store_depth(&self) -> usize {
        self.store_depth.unwrap_or(DEFAULT_STORE_DEPTH)
    }

    pub fn store_width(&self) -> usize {
        self.store_width.unwrap_or(DEFAULT_STORE_WIDTH)
    }

    pub fn retry_delay(&self) -> Result<Duration> {
        parse_field_duration(
            "retry_delay",
            self.retry_delay.as_deref().unwrap_or(DEFAULT_RETRY_DELAY),
        )
    }

    pub fn request_timeout(&self) -> Result<Duration> {
        parse_field_duration(
            "request_timeout",
            self.request_timeout
                .as_deref()
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        )
    }

    /// Writes the configuration to `path` as plain TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            ensure_dir_exists(parent)?;
        }
        fs::write(path, serialized)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    pub fn to_annotated_document(&self) -> Result<DocumentMut> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut doc = toml_string.parse::<DocumentMut>()?;
        annotate_toml_table::<Config>(doc.as_table_mut())?;
        Ok(doc)
    }
}

fn parse_field_duration(field: &'static str, value: &str) -> Result<Duration> {
    parse_duration(value).ok_or_else(|| {
        ConfigError::InvalidDuration {
            field,
            value: value.to_string(),
        }
    })
}

/// Writes the default configuration, annotated with field documentation, to
/// the resolved config path. Refuses to overwrite an existing file.
pub fn generate_default_config(explicit: Option<&Path>) -> Result<PathBuf> {
    let path = config_path(explicit)?;

    if path.exists() {
        return Err(ConfigError::ConfigAlreadyExists(
            path.display().to_string(),
        ));
    }

    let annotated_doc = Config::default_config().to_annotated_document()?;

    if let Some(parent) = path.parent() {
        ensure_dir_exists(parent)?;
    }
    fs::write(&path, annotated_doc.to_string())?;
    info!(
        "Default configuration file generated with documentation at: {}",
        path.display()
    );

    Ok(path)
}
