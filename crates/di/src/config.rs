//! Configuration Loader
//!
//! Конфигурация контейнера загружается из нескольких источников:
//! - файлы конфигурации (TOML, JSON, YAML), формат по расширению
//! - переменные окружения с префиксом (по умолчанию `DI_`)
//!
//! После загрузки конфигурация валидируется.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, warn};

/// Пороги для health check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// Минимальная доля живых weak ссылок
    pub min_weak_efficiency: f64,
    /// Максимальная доля регистраций, которые ни разу не были разрешены
    pub max_unused_ratio: f64,
    /// Глубина цепочки разрешения, после которой выдаётся предупреждение
    pub max_resolution_depth: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            min_weak_efficiency: 0.7,
            max_unused_ratio: 0.5,
            max_resolution_depth: 10,
        }
    }
}

/// Конфигурация контейнера
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub name: String,
    /// Таймаут `resolve_sync` по умолчанию
    pub sync_timeout_ms: u64,
    pub enable_metrics: bool,
    pub health: HealthThresholds,
    pub slowest_resolutions_limit: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            sync_timeout_ms: 500,
            enable_metrics: true,
            health: HealthThresholds::default(),
            slowest_resolutions_limit: 10,
        }
    }
}

impl ContainerConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    /// Проверить значения; ошибка называет поле
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("name must not be empty".to_string());
        }
        if self.sync_timeout_ms == 0 {
            errors.push("sync_timeout_ms must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.health.min_weak_efficiency) {
            errors.push(format!(
                "health.min_weak_efficiency must be within [0, 1], got {}",
                self.health.min_weak_efficiency
            ));
        }
        if !(0.0..=1.0).contains(&self.health.max_unused_ratio) {
            errors.push(format!(
                "health.max_unused_ratio must be within [0, 1], got {}",
                self.health.max_unused_ratio
            ));
        }
        if self.health.max_resolution_depth == 0 {
            errors.push("health.max_resolution_depth must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("Configuration validation failed: {}", errors.join("; ")))
        }
    }
}

/// Загрузчик конфигурации с несколькими источниками
pub struct ConfigurationLoader {
    search_paths: Vec<PathBuf>,
    env_prefix: String,
    validate_on_load: bool,
}

impl Default for ConfigurationLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationLoader {
    const FILE_NAMES: [&'static str; 5] = [
        "di.toml",
        "di.json",
        "di.yaml",
        "di.yml",
        ".di.toml",
    ];

    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("di"));
        }
        search_paths.push(PathBuf::from("."));

        Self {
            search_paths,
            env_prefix: "DI".to_string(),
            validate_on_load: true,
        }
    }

    /// Загрузчик без путей поиска (только явные файлы и окружение)
    pub fn isolated() -> Self {
        Self {
            search_paths: Vec::new(),
            ..Self::new()
        }
    }

    pub fn add_search_path<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Префикс переменных окружения (default: "DI")
    pub fn env_prefix<S: Into<String>>(&mut self, prefix: S) -> &mut Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn validate(&mut self, enabled: bool) -> &mut Self {
        self.validate_on_load = enabled;
        self
    }

    /// Загрузить конфигурацию.
    ///
    /// Приоритет (по возрастанию): значения по умолчанию, найденный файл,
    /// переменные окружения.
    pub fn load(&self) -> Result<ContainerConfig> {
        let config = match self.find_configuration_file() {
            Some(path) => self.load_from_file(&path)?,
            None => ContainerConfig::default(),
        };
        self.finish(config)
    }

    /// Загрузить из явно указанного файла, затем применить окружение
    pub fn load_with_file<P: AsRef<Path>>(&self, path: P) -> Result<ContainerConfig> {
        let config = self.load_from_file(path)?;
        self.finish(config)
    }

    fn finish(&self, mut config: ContainerConfig) -> Result<ContainerConfig> {
        self.apply_environment_variables(&mut config)?;
        if self.validate_on_load {
            config.validate()?;
        }
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<ContainerConfig> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        debug!("Loading container configuration from {}", path.display());
        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => self.load_from_toml(&content),
            Some("json") => self.load_from_json(&content),
            Some("yaml") | Some("yml") => self.load_from_yaml(&content),
            _ => Err(anyhow!(
                "Unsupported configuration file format: {:?}",
                path.extension()
            )),
        }
    }

    pub fn load_from_toml(&self, content: &str) -> Result<ContainerConfig> {
        Ok(toml::from_str(content)?)
    }

    pub fn load_from_json(&self, content: &str) -> Result<ContainerConfig> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load_from_yaml(&self, content: &str) -> Result<ContainerConfig> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, config: &ContainerConfig, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => toml::to_string_pretty(config)?,
            Some("json") => serde_json::to_string_pretty(config)?,
            Some("yaml") | Some("yml") => serde_yaml::to_string(config)?,
            _ => return Err(anyhow!("Unsupported file format: {:?}", path.extension())),
        };

        fs::write(path, content)?;
        Ok(())
    }

    fn find_configuration_file(&self) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .flat_map(|dir| Self::FILE_NAMES.iter().map(move |name| dir.join(name)))
            .find(|path| path.is_file())
    }

    fn apply_environment_variables(&self, config: &mut ContainerConfig) -> Result<()> {
        let prefix = format!("{}_", self.env_prefix);

        for (key, value) in env::vars() {
            if let Some(config_key) = key.strip_prefix(&prefix) {
                self.apply_env_var(config, config_key, &value)
                    .with_context(|| format!("Invalid value for {key}: {value:?}"))?;
            }
        }

        Ok(())
    }

    fn apply_env_var(&self, config: &mut ContainerConfig, key: &str, value: &str) -> Result<()> {
        match key.to_uppercase().as_str() {
            "NAME" => config.name = value.to_string(),
            "SYNC_TIMEOUT_MS" => config.sync_timeout_ms = value.parse()?,
            "ENABLE_METRICS" => config.enable_metrics = value.parse()?,
            "SLOWEST_RESOLUTIONS_LIMIT" => config.slowest_resolutions_limit = value.parse()?,
            "MIN_WEAK_EFFICIENCY" => config.health.min_weak_efficiency = value.parse()?,
            "MAX_UNUSED_RATIO" => config.health.max_unused_ratio = value.parse()?,
            "MAX_RESOLUTION_DEPTH" => config.health.max_resolution_depth = value.parse()?,
            other => warn!("Unknown configuration variable {}_{}", self.env_prefix, other),
        }
        Ok(())
    }
}
