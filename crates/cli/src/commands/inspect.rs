use anyhow::Result;
use clap::Args;
use common::OperationTimer;
use di::{Container, ContainerDiagnostics, ContainerHealthReport, ContainerPerformanceMetrics, HealthStatus};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::demo::{self, ExerciseSummary};

#[derive(Debug, Args)]
pub struct InspectCommand {
    /// Файл конфигурации контейнера (toml, json, yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Вывести отчёт в JSON
    #[arg(long)]
    pub json: bool,

    /// Выполнить maintenance cleanup перед отчётом
    #[arg(long)]
    pub cleanup: bool,
}

#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub container: String,
    pub summary: ExerciseSummary,
    pub cleaned_weak_references: Option<usize>,
    pub diagnostics: ContainerDiagnostics,
    pub health: ContainerHealthReport,
    pub performance: ContainerPerformanceMetrics,
}

impl InspectCommand {
    pub async fn execute(&self) -> Result<()> {
        let report = self.build_report().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }

        if report.health.status == HealthStatus::Critical {
            warn!("Container '{}' is in critical state", report.container);
        }
        Ok(())
    }

    pub async fn build_report(&self) -> Result<InspectReport> {
        let config = super::load_container_config(self.config.as_deref())?;
        let container = Container::with_config(config);

        let mut timer = OperationTimer::new("di_inspect");
        let result = run_demo(&container, self.cleanup).await;
        timer.add_field("container", container.name());
        timer.add_field("registrations", container.registered_keys().len());
        timer.finish_with_result(&result);

        let (summary, cleaned_weak_references) = result?;
        let report = InspectReport {
            container: container.name().to_string(),
            summary,
            cleaned_weak_references,
            diagnostics: container.get_diagnostics(),
            health: container.perform_health_check(),
            performance: container.performance_metrics(),
        };

        container.shutdown();
        Ok(report)
    }
}

async fn run_demo(container: &Container, cleanup: bool) -> Result<(ExerciseSummary, Option<usize>)> {
    demo::compose(container)?;
    let summary = demo::exercise(container).await?;
    info!(quote = %summary.quote, "Checkout demo completed");

    let cleaned = cleanup.then(|| container.perform_maintenance_cleanup());
    Ok((summary, cleaned))
}

fn print_report(report: &InspectReport) {
    println!("Container: {}", report.container);
    println!();
    println!("Demo Summary");
    println!("  Quote: {}", report.summary.quote);
    println!("  Batch: {}", report.summary.batch_currencies.join(", "));
    println!("  Formatters available: {}", report.summary.all_formatters);
    println!("  Analytics events: {}", report.summary.analytics_events);
    if let Some(cleaned) = report.cleaned_weak_references {
        println!("  Cleaned weak references: {cleaned}");
    }
    println!();
    print!("{}", report.diagnostics);
    println!();
    println!("Health: {}", report.health.status);
    for issue in &report.health.issues {
        println!("  ! {issue}");
    }
    for recommendation in &report.health.recommendations {
        println!("  > {recommendation}");
    }
    println!();
    print!("{}", report.performance);
}
