pub mod config;
pub mod inspect;

pub use config::ConfigCommand;
pub use inspect::{InspectCommand, InspectReport};

use anyhow::Result;
use di::{ConfigurationLoader, ContainerConfig};
use std::path::Path;

/// Конфигурация контейнера: явный файл или поиск по стандартным путям,
/// поверх переменные окружения `DI_*`
pub(crate) fn load_container_config(path: Option<&Path>) -> Result<ContainerConfig> {
    let loader = ConfigurationLoader::new();
    match path {
        Some(path) => loader.load_with_file(path),
        None => loader.load(),
    }
}
