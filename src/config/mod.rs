use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::de::value::Error as ValueError;
use serde::de::IntoDeserializer;
use serde::{Deserialize, Deserializer, Serialize};

use crate::format::DEFAULT_DATE_PATTERN;
use crate::item::{ActionBarOptions, OverlayPolicy};
use crate::search::{Availability, BrowseRequest, OrderRequest, OrderType};

pub mod themes;

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "Taskrow";
const APP_NAME: &str = "taskrow";

pub const CONFIG_ENV: &str = "TASKROW_CONFIG";
pub const DATA_ENV: &str = "TASKROW_DATA";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load(&self.paths)?;
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let override_data = env::var(DATA_ENV).ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_dir = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        Ok(Self::rooted(config_dir, config_file, data_dir))
    }

    /// Paths under explicit directories, bypassing discovery.
    pub fn rooted(config_dir: PathBuf, config_file: PathBuf, data_dir: PathBuf) -> Self {
        let database_path = data_dir.join("tasks.db");
        Self {
            config_dir,
            config_file,
            data_dir,
            database_path,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(deserialize_with = "theme_or_default")]
    pub theme: ThemeName,
    pub item: ItemOptions,
    pub list: ListOptions,
    pub storage: StorageOptions,
    /// Display string overrides keyed by `StringKey` name, e.g. `NO_DUE_DATE`.
    pub strings: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            theme: ThemeName::Dark,
            item: ItemOptions::default(),
            list: ListOptions::default(),
            storage: StorageOptions::default(),
            strings: HashMap::new(),
        }
    }
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.storage
            .resolve(paths)
            .context("resolving storage paths")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemOptions {
    pub overlay_policy: OverlayPolicy,
    pub tooltip_active_id: String,
    pub tooltip_inactive_id: String,
    /// `time` format description used for start and due labels.
    pub date_pattern: String,
}

impl Default for ItemOptions {
    fn default() -> Self {
        let action_bar = ActionBarOptions::default();
        Self {
            overlay_policy: OverlayPolicy::Independent,
            tooltip_active_id: action_bar.tooltip_active_id,
            tooltip_inactive_id: action_bar.tooltip_inactive_id,
            date_pattern: DEFAULT_DATE_PATTERN.to_string(),
        }
    }
}

impl ItemOptions {
    pub fn action_bar(&self) -> ActionBarOptions {
        ActionBarOptions {
            tooltip_active_id: self.tooltip_active_id.clone(),
            tooltip_inactive_id: self.tooltip_inactive_id.clone(),
            date_pattern: self.date_pattern.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListOptions {
    pub availability: Availability,
    pub order: OrderType,
    pub ascending: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            availability: Availability::Incomplete,
            order: OrderType::Captured,
            ascending: true,
        }
    }
}

impl ListOptions {
    pub fn browse_request(&self) -> BrowseRequest {
        BrowseRequest {
            availability: self.availability,
            order: OrderRequest {
                order: self.order,
                ascending: self.ascending,
            },
            ..BrowseRequest::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    pub wal_autocheckpoint: u32,
    /// Insert a few example tasks when the database is first created.
    pub seed_examples: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            wal_autocheckpoint: 1000,
            seed_examples: true,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, std::hash::Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ThemeName {
    Dark,
    Light,
    HighContrast,
    Solarized,
}

impl Default for ThemeName {
    fn default() -> Self {
        ThemeName::Dark
    }
}

impl ThemeName {
    pub const ALL: [ThemeName; 4] = [
        ThemeName::Dark,
        ThemeName::Light,
        ThemeName::HighContrast,
        ThemeName::Solarized,
    ];
}

fn theme_or_default<'de, D>(deserializer: D) -> std::result::Result<ThemeName, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    let parsed: std::result::Result<ThemeName, ValueError> =
        ThemeName::deserialize(name.as_str().into_deserializer());
    Ok(parsed.unwrap_or_else(|_| {
        tracing::warn!(theme = %name, "unknown theme in config, falling back to dark");
        ThemeName::default()
    }))
}
