//! Ошибки DI контейнера.
//!
//! Все варианты recoverable: контейнер никогда не паникует на них.
//! `ContainerError` клонируемый, чтобы одну ошибку фабрики можно было
//! раздать нескольким ожидающим resolve вызовам.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::key::ServiceKey;

pub type ContainerResult<T> = Result<T, ContainerError>;

/// Основной error type для всех операций контейнера
#[derive(Debug, Error, Clone)]
pub enum ContainerError {
    /// resolve вызван до register для этого ключа
    #[error("Dependency not registered: {key}{}", format_suggestions(.suggestions))]
    DependencyNotRegistered {
        key: ServiceKey,
        suggestions: Vec<String>,
    },

    /// Ключ уже находится в текущей цепочке разрешения
    #[error("Circular dependency detected for {key}. Resolution path: {}", format_path(.path))]
    CircularDependency {
        key: ServiceKey,
        path: Vec<ServiceKey>,
    },

    #[error("Type cast failed for {key}. Expected: {expected}, Actual: {actual}")]
    TypeCastFailed {
        key: ServiceKey,
        expected: &'static str,
        actual: &'static str,
    },

    /// Фабрика вернула ошибку, либо истёк таймаут resolve_sync
    #[error("Factory for {key} failed: {underlying:#}")]
    FactoryFailed {
        key: ServiceKey,
        underlying: Arc<anyhow::Error>,
    },

    #[error("Cannot weakly cache {key}: it is a plain value type without an independent lifetime")]
    WeakUnsupported { key: ServiceKey },

    #[error("Container has been terminated and is no longer available")]
    ContainerUnavailable,

    #[error("Scope not found: {scope_id}{}", format_scopes(.available_scopes))]
    ScopeNotFound {
        scope_id: String,
        available_scopes: Vec<String>,
    },
}

/// Underlying ошибка для `FactoryFailed`, когда resolve_sync не дождался результата
#[derive(Debug, Error, Clone)]
#[error("Synchronous resolution of {key} timed out after {}ms", .timeout.as_millis())]
pub struct SyncResolveTimeout {
    pub key: ServiceKey,
    pub timeout: Duration,
}

impl ContainerError {
    pub fn not_registered(key: ServiceKey) -> Self {
        Self::DependencyNotRegistered {
            key,
            suggestions: Vec::new(),
        }
    }

    pub fn scope_not_found(scope_id: impl Into<String>) -> Self {
        Self::ScopeNotFound {
            scope_id: scope_id.into(),
            available_scopes: Vec::new(),
        }
    }

    /// Обернуть ошибку фабрики. Типизированная ошибка контейнера
    /// (например, из вложенного resolve) пробрасывается без изменений.
    pub fn from_factory(key: &ServiceKey, error: anyhow::Error) -> Self {
        match error.downcast_ref::<ContainerError>() {
            Some(container_error) => container_error.clone(),
            None => Self::FactoryFailed {
                key: key.clone(),
                underlying: Arc::new(error),
            },
        }
    }

    pub(crate) fn sync_timeout(key: &ServiceKey, timeout: Duration) -> Self {
        Self::FactoryFailed {
            key: key.clone(),
            underlying: Arc::new(anyhow::Error::new(SyncResolveTimeout {
                key: key.clone(),
                timeout,
            })),
        }
    }

    /// Ключ, к которому относится ошибка
    pub fn key(&self) -> Option<&ServiceKey> {
        match self {
            Self::DependencyNotRegistered { key, .. }
            | Self::CircularDependency { key, .. }
            | Self::TypeCastFailed { key, .. }
            | Self::FactoryFailed { key, .. }
            | Self::WeakUnsupported { key } => Some(key),
            Self::ContainerUnavailable | Self::ScopeNotFound { .. } => None,
        }
    }

    /// Исходная ошибка фабрики (для `FactoryFailed`)
    pub fn underlying(&self) -> Option<&anyhow::Error> {
        match self {
            Self::FactoryFailed { underlying, .. } => Some(underlying.as_ref()),
            _ => None,
        }
    }

    /// true если resolve_sync не дождался фабрики
    pub fn is_timeout(&self) -> bool {
        self.underlying()
            .map(|e| e.downcast_ref::<SyncResolveTimeout>().is_some())
            .unwrap_or(false)
    }

    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::DependencyNotRegistered { .. } => {
                Some("Call register() for this type (and name) before resolving it")
            }
            Self::CircularDependency { .. } => Some(
                "Break the circular dependency: inject a factory or resolve one side lazily",
            ),
            Self::TypeCastFailed { .. } => {
                Some("Make sure the registered type matches the type the factory produces")
            }
            Self::WeakUnsupported { .. } => {
                Some("Register plain value types as singleton or transient instead of weak")
            }
            Self::FactoryFailed { .. } | Self::ContainerUnavailable | Self::ScopeNotFound { .. } => {
                None
            }
        }
    }

    /// Ошибки конфигурации со стороны вызывающего кода
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::DependencyNotRegistered { .. }
                | Self::TypeCastFailed { .. }
                | Self::WeakUnsupported { .. }
        )
    }

    pub fn is_system_error(&self) -> bool {
        matches!(self, Self::ContainerUnavailable)
    }
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(". Suggestions: {}", suggestions.join(", "))
    }
}

fn format_path(path: &[ServiceKey]) -> String {
    path.iter()
        .map(|key| key.to_string())
        .collect::<Vec<_>>()
        .join(" → ")
}

fn format_scopes(scopes: &[String]) -> String {
    if scopes.is_empty() {
        String::new()
    } else {
        format!(". Available scopes: {}", scopes.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestService;
    struct OtherService;

    #[test]
    fn test_not_registered_description() {
        let error = ContainerError::not_registered(ServiceKey::of::<TestService>());
        let description = error.to_string();

        assert!(description.contains("Dependency not registered"));
        assert!(description.contains("TestService"));
        assert!(!description.contains("Suggestions"));

        let error = ContainerError::DependencyNotRegistered {
            key: ServiceKey::of::<TestService>(),
            suggestions: vec!["ValidationService".to_string(), "RulesFactory".to_string()],
        };
        let description = error.to_string();
        assert!(description.contains("Suggestions"));
        assert!(description.contains("RulesFactory"));
    }

    #[test]
    fn test_circular_description_contains_path() {
        let error = ContainerError::CircularDependency {
            key: ServiceKey::of::<TestService>(),
            path: vec![
                ServiceKey::of::<TestService>(),
                ServiceKey::of::<OtherService>(),
                ServiceKey::of::<TestService>(),
            ],
        };
        let description = error.to_string();

        assert!(description.contains("Circular dependency detected"));
        assert!(description.contains("Resolution path"));
        assert!(description.contains("→"));
        assert!(description.contains("OtherService"));
    }

    #[test]
    fn test_scope_not_found_lists_available_scopes() {
        let error = ContainerError::scope_not_found("checkout");
        assert!(!error.to_string().contains("Available scopes"));

        let error = ContainerError::ScopeNotFound {
            scope_id: "checkout".to_string(),
            available_scopes: vec!["payment".to_string(), "vault".to_string()],
        };
        let description = error.to_string();
        assert!(description.contains("Available scopes"));
        assert!(description.contains("payment"));
        assert!(description.contains("vault"));
    }

    #[test]
    fn test_factory_error_wrapping() {
        let key = ServiceKey::of::<TestService>();

        let wrapped = ContainerError::from_factory(&key, anyhow::anyhow!("Test failure"));
        assert!(matches!(wrapped, ContainerError::FactoryFailed { .. }));
        assert!(wrapped.to_string().contains("Test failure"));
        assert!(wrapped.recovery_suggestion().is_none());

        // Типизированная ошибка проходит насквозь
        let inner = ContainerError::not_registered(ServiceKey::of::<OtherService>());
        let passed = ContainerError::from_factory(&key, anyhow::Error::new(inner));
        match passed {
            ContainerError::DependencyNotRegistered { key, .. } => {
                assert!(key.represents::<OtherService>())
            }
            other => panic!("Expected DependencyNotRegistered, got {other:?}"),
        }
    }

    #[test]
    fn test_timeout_is_factory_failure() {
        let key = ServiceKey::of::<TestService>();
        let error = ContainerError::sync_timeout(&key, Duration::from_millis(500));

        assert!(error.is_timeout());
        assert!(error.to_string().contains("timed out after 500ms"));
        assert!(!ContainerError::ContainerUnavailable.is_timeout());
    }

    #[test]
    fn test_error_classification() {
        let key = ServiceKey::of::<TestService>();

        assert!(ContainerError::not_registered(key.clone()).is_user_error());
        assert!(ContainerError::WeakUnsupported { key: key.clone() }.is_user_error());
        assert!(!ContainerError::ContainerUnavailable.is_user_error());
        assert!(!ContainerError::CircularDependency { key: key.clone(), path: vec![] }.is_user_error());

        assert!(ContainerError::ContainerUnavailable.is_system_error());
        assert!(!ContainerError::scope_not_found("test").is_system_error());
        assert!(ContainerError::scope_not_found("test").recovery_suggestion().is_none());
        assert!(ContainerError::WeakUnsupported { key }
            .recovery_suggestion()
            .map(|s| s.contains("singleton"))
            .unwrap_or(false));
    }
}
