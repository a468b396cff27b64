use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Конфигурация structured logging
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Минимальный уровень логирования (`trace`..`error`), RUST_LOG имеет приоритет
    pub level: String,
    /// Вывод в JSON формате
    pub json_output: bool,
    /// Включить цветной вывод (только для non-JSON)
    pub color_output: bool,
    /// Включить номера строк
    pub include_line_numbers: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_output: false,
            color_output: true,
            include_line_numbers: cfg!(debug_assertions),
        }
    }
}

impl LoggingConfig {
    /// Уровень для env filter; неизвестные значения откатываются к INFO
    pub fn parsed_level(&self) -> Level {
        self.level.parse().unwrap_or(Level::INFO)
    }
}

/// Инициализировать structured logging.
///
/// Повторный вызов не считается ошибкой: если глобальный subscriber уже
/// установлен (например, другим тестом), возвращаем `Ok(false)`.
pub fn init_structured_logging(config: LoggingConfig) -> anyhow::Result<bool> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.parsed_level().to_string()));

    let installed = if config.json_output {
        // JSON формат для production
        let json_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_line_number(config.include_line_numbers);

        Registry::default()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .is_ok()
    } else {
        // Человекочитаемый формат для разработки
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_line_number(config.include_line_numbers)
            .with_ansi(config.color_output)
            .with_span_events(FmtSpan::CLOSE);

        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .is_ok()
    };

    Ok(installed)
}

/// Итог измеренной операции
#[derive(Debug, Clone, Serialize)]
pub struct OperationReport {
    pub operation: String,
    pub duration_ms: u64,
    pub success: bool,
    pub fields: HashMap<String, Value>,
}

/// Вспомогательная структура для измерения времени операций
pub struct OperationTimer {
    start: Instant,
    operation_name: String,
    fields: HashMap<String, Value>,
}

impl OperationTimer {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            operation_name: operation_name.into(),
            fields: HashMap::new(),
        }
    }

    pub fn add_field(&mut self, key: impl Into<String>, value: impl Serialize) {
        if let Ok(v) = serde_json::to_value(value) {
            self.fields.insert(key.into(), v);
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(self) -> OperationReport {
        let duration_ms = self.start.elapsed().as_millis() as u64;

        tracing::info!(
            operation = %self.operation_name,
            duration_ms = duration_ms,
            success = true,
            fields = ?self.fields,
            "Operation completed"
        );

        OperationReport {
            operation: self.operation_name,
            duration_ms,
            success: true,
            fields: self.fields,
        }
    }

    pub fn finish_with_result<T, E: std::fmt::Display>(self, result: &Result<T, E>) -> OperationReport {
        let duration_ms = self.start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => {
                tracing::info!(
                    operation = %self.operation_name,
                    duration_ms = duration_ms,
                    success = true,
                    fields = ?self.fields,
                    "Operation completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    operation = %self.operation_name,
                    duration_ms = duration_ms,
                    success = false,
                    error = %e,
                    fields = ?self.fields,
                    "Operation failed"
                );
            }
        }

        OperationReport {
            operation: self.operation_name,
            duration_ms,
            success: result.is_ok(),
            fields: self.fields,
        }
    }
}
