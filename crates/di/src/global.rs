//! Глобальный реестр контейнеров.
//!
//! Опциональный слой поверх `Container` для кода, который не может
//! передавать контейнер явно. Ядро контейнера от него не зависит.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, info};

use crate::config::ContainerConfig;
use crate::container::Container;
use crate::errors::{ContainerError, ContainerResult};

static GLOBAL_REGISTRY: Lazy<GlobalRegistry> = Lazy::new(GlobalRegistry::new);

/// Процессный реестр
pub fn global() -> &'static GlobalRegistry {
    &GLOBAL_REGISTRY
}

/// Текущий контейнер плюс именованные scoped контейнеры
#[derive(Default)]
pub struct GlobalRegistry {
    current: RwLock<Option<Container>>,
    scopes: RwLock<HashMap<String, Container>>,
}

/// Восстанавливает предыдущий текущий контейнер при выходе из `with_container`,
/// в том числе при ошибке или панике
struct RestoreGuard<'a> {
    registry: &'a GlobalRegistry,
    previous: Option<Option<Container>>,
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.registry.current.write() = previous;
        }
    }
}

impl GlobalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Текущий контейнер; `ContainerUnavailable`, если не установлен
    pub fn current(&self) -> ContainerResult<Container> {
        self.current
            .read()
            .clone()
            .ok_or(ContainerError::ContainerUnavailable)
    }

    pub fn set_container(&self, container: Container) {
        debug!("Current container set to '{}'", container.name());
        *self.current.write() = Some(container);
    }

    pub fn clear_container(&self) -> Option<Container> {
        self.current.write().take()
    }

    /// Создать и установить новый главный контейнер
    pub fn setup_main_container(&self, config: ContainerConfig) -> Container {
        let container = Container::with_config(config);
        self.set_container(container.clone());
        info!("Main container '{}' installed", container.name());
        container
    }

    /// Изолированный пустой контейнер для тестов; в реестр не ставится
    pub fn create_mock_container(&self) -> Container {
        Container::with_config(ContainerConfig::named("mock"))
    }

    /// Выполнить `action` с `temp` в роли текущего контейнера, затем вернуть
    /// прежний, даже если `action` завершилась ошибкой. Вложенные вызовы
    /// восстанавливаются в обратном порядке.
    pub async fn with_container<F, Fut, R>(&self, temp: Container, action: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let previous = self.current.write().replace(temp);
        let _restore = RestoreGuard {
            registry: self,
            previous: Some(previous),
        };
        action().await
    }

    /// Зарегистрировать scoped контейнер. Прежний контейнер этого scope
    /// завершается, если это не тот же самый контейнер.
    pub fn set_scoped_container(&self, scope_id: impl Into<String>, container: Container) {
        let scope_id = scope_id.into();
        let replaced = self.scopes.write().insert(scope_id.clone(), container.clone());

        match replaced {
            Some(old) if old.ptr_eq(&container) => {
                debug!("Scoped container '{}' set again, keeping it alive", scope_id);
            }
            Some(old) => {
                old.shutdown();
                info!("Scoped container '{}' replaced", scope_id);
            }
            None => debug!("Scoped container '{}' registered", scope_id),
        }
    }

    pub fn scoped_container(&self, scope_id: &str) -> Option<Container> {
        self.scopes.read().get(scope_id).cloned()
    }

    /// Как `scoped_container`, но с ошибкой `ScopeNotFound`
    pub fn require_scope(&self, scope_id: &str) -> ContainerResult<Container> {
        self.scoped_container(scope_id)
            .ok_or_else(|| ContainerError::ScopeNotFound {
                scope_id: scope_id.to_string(),
                available_scopes: self.scope_ids(),
            })
    }

    /// Удалить scope и завершить его контейнер со всеми кэшами
    pub fn remove_scoped_container(&self, scope_id: &str) -> bool {
        let removed = self.scopes.write().remove(scope_id);
        match removed {
            Some(container) => {
                container.shutdown();
                info!("Scoped container '{}' removed", scope_id);
                true
            }
            None => false,
        }
    }

    pub fn scope_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.scopes.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
