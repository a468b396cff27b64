use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::commands::{ConfigCommand, InspectCommand};
use common::{init_structured_logging, LoggingConfig};

#[derive(Parser)]
#[command(name = "di-inspect")]
#[command(about = "Inspect an async dependency injection container")]
#[command(version)]
struct Cli {
    /// Уровень логирования (RUST_LOG имеет приоритет)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Логи в JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Собрать демо checkout flow и показать диагностику контейнера
    Inspect(InspectCommand),
    /// Работа с конфигурацией контейнера
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_structured_logging(LoggingConfig {
        level: cli.log_level.clone(),
        json_output: cli.json_logs,
        ..Default::default()
    })?;

    match cli.command {
        Some(Commands::Inspect(command)) => command.execute().await,
        Some(Commands::Config(command)) => command.execute(),
        None => {
            InspectCommand {
                config: None,
                json: false,
                cleanup: false,
            }
            .execute()
            .await
        }
    }
}
