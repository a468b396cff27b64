use anyhow::Result;
use cli::commands::InspectCommand;
use cli::demo;
use di::{Container, HealthIssue};
use std::fs;
use tempfile::TempDir;

#[tokio::test]
async fn test_demo_composition_resolves() -> Result<()> {
    let container = Container::new();
    demo::compose(&container)?;

    let summary = demo::exercise(&container).await?;
    assert_eq!(summary.quote, "$12.50");
    assert_eq!(summary.batch_currencies, vec!["usd", "eur", "gbp"]);
    assert_eq!(summary.all_formatters, 3);
    assert_eq!(summary.analytics_events, 1);
    assert_eq!(summary.banner, "di-inspect checkout demo");
    Ok(())
}

#[tokio::test]
async fn test_report_from_config_file() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("di.toml");
    fs::write(&path, "name = \"checkout-inspect\"\nsync_timeout_ms = 750\n")?;

    let command = InspectCommand {
        config: Some(path),
        json: true,
        cleanup: false,
    };
    let report = command.build_report().await?;

    assert_eq!(report.container, "checkout-inspect");
    assert_eq!(report.diagnostics.total_registrations, 7);
    assert_eq!(report.diagnostics.unused_registrations, 0);
    // Weak reporter уже отпущен, запись осталась
    assert_eq!(report.diagnostics.weak_references, 1);
    assert!(report
        .health
        .issues
        .iter()
        .any(|issue| matches!(issue, HealthIssue::MemoryLeak(_))));
    assert!(report.performance.total_resolutions > 0);

    let json = serde_json::to_value(&report)?;
    assert_eq!(json["summary"]["quote"], "$12.50");
    Ok(())
}

#[tokio::test]
async fn test_report_with_cleanup() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("di.json");
    fs::write(&path, r#"{ "name": "cleanup" }"#)?;

    let command = InspectCommand {
        config: Some(path),
        json: false,
        cleanup: true,
    };
    let report = command.build_report().await?;

    assert_eq!(report.cleaned_weak_references, Some(1));
    assert_eq!(report.diagnostics.weak_references, 0);
    assert!(report.health.issues.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_invalid_config_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("di.toml");
    fs::write(&path, "sync_timeout_ms = 0\n")?;

    let command = InspectCommand {
        config: Some(path),
        json: false,
        cleanup: false,
    };
    assert!(command.build_report().await.is_err());
    Ok(())
}
