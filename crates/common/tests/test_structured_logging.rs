use common::{init_structured_logging, LoggingConfig, OperationTimer};
use std::time::Duration;

#[test]
fn test_init_is_idempotent() -> anyhow::Result<()> {
    let config = LoggingConfig {
        level: "debug".to_string(),
        color_output: false,
        ..Default::default()
    };

    // Первый вызов может проиграть гонку другим тестам, второй - точно нет
    let _ = init_structured_logging(config.clone())?;
    let second = init_structured_logging(config)?;
    assert!(!second, "second init must not replace the global subscriber");

    Ok(())
}

#[test]
fn test_logging_config_from_json() -> anyhow::Result<()> {
    let config: LoggingConfig = serde_json::from_str(r#"{ "level": "warn", "json_output": true }"#)?;

    assert_eq!(config.level, "warn");
    assert!(config.json_output);
    // Пропущенные поля берутся из Default
    assert!(config.color_output);

    Ok(())
}

#[test]
fn test_operation_timer_elapsed() {
    let timer = OperationTimer::new("test_operation");

    std::thread::sleep(Duration::from_millis(10));

    assert!(timer.elapsed().as_millis() >= 10);
    let report = timer.finish();
    assert!(report.duration_ms >= 10);
}
