use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use di::{ConfigurationLoader, ContainerConfig};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigSubcommand {
    /// Записать конфигурацию по умолчанию в файл
    #[command(alias = "gen")]
    Generate {
        /// Путь файла; формат по расширению (toml, json, yaml)
        #[arg(short, long, default_value = "di.toml")]
        output: PathBuf,

        /// Перезаписать существующий файл
        #[arg(short, long)]
        force: bool,
    },

    /// Проверить конфигурацию
    #[command(alias = "check")]
    Validate {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Показать итоговую конфигурацию (файл + окружение)
    Show {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

impl ConfigCommand {
    pub fn execute(&self) -> Result<()> {
        match &self.command {
            ConfigSubcommand::Generate { output, force } => generate_config(output, *force),
            ConfigSubcommand::Validate { config } => validate_config(config.as_deref()),
            ConfigSubcommand::Show { config } => show_config(config.as_deref()),
        }
    }
}

fn generate_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        warn!("Configuration file already exists at: {}", output.display());
        return Err(anyhow!(
            "{} already exists, use --force to overwrite",
            output.display()
        ));
    }

    ConfigurationLoader::new().save_to_file(&ContainerConfig::default(), output)?;
    info!("Configuration file generated at: {}", output.display());
    println!("Configuration written to {}", output.display());
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = super::load_container_config(path)?;
    println!("Configuration '{}' is valid", config.name);
    Ok(())
}

fn show_config(path: Option<&Path>) -> Result<()> {
    let config = super::load_container_config(path)?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
