//! Политики хранения экземпляров и стратегии, которые их реализуют.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::container::ContainerCore;
use crate::key::{Instance, ServiceKey};
use crate::registration::Registration;
use crate::resolver::Resolver;

/// Как долго контейнер удерживает созданный экземпляр
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Новый экземпляр на каждый resolve
    #[default]
    Transient,
    /// Один экземпляр на контейнер
    Singleton,
    /// Кэш живёт, пока есть внешние strong ссылки
    Weak,
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transient => "transient",
            Self::Singleton => "singleton",
            Self::Weak => "weak",
        };
        f.write_str(name)
    }
}

/// Результат работы стратегии
pub(crate) struct Resolved {
    pub(crate) instance: Instance,
    pub(crate) from_cache: bool,
}

impl Resolved {
    fn built(instance: Instance) -> Self {
        Self {
            instance,
            from_cache: false,
        }
    }

    fn cached(instance: Instance) -> Self {
        Self {
            instance,
            from_cache: true,
        }
    }
}

/// Решает, переиспользовать экземпляр или вызвать фабрику
#[async_trait]
pub(crate) trait RetentionStrategy: Send + Sync {
    async fn instance(
        &self,
        core: &ContainerCore,
        key: &ServiceKey,
        registration: &Registration,
        resolver: Resolver,
    ) -> anyhow::Result<Resolved>;
}

pub(crate) fn strategy_for(policy: RetentionPolicy) -> &'static dyn RetentionStrategy {
    match policy {
        RetentionPolicy::Transient => &TransientStrategy,
        RetentionPolicy::Singleton => &SingletonStrategy,
        RetentionPolicy::Weak => &WeakStrategy,
    }
}

pub(crate) struct TransientStrategy;

#[async_trait]
impl RetentionStrategy for TransientStrategy {
    async fn instance(
        &self,
        _core: &ContainerCore,
        _key: &ServiceKey,
        registration: &Registration,
        resolver: Resolver,
    ) -> anyhow::Result<Resolved> {
        registration.build(resolver).await.map(Resolved::built)
    }
}

pub(crate) struct SingletonStrategy;

#[async_trait]
impl RetentionStrategy for SingletonStrategy {
    async fn instance(
        &self,
        core: &ContainerCore,
        key: &ServiceKey,
        registration: &Registration,
        resolver: Resolver,
    ) -> anyhow::Result<Resolved> {
        // Регистрацию успели заменить: строим без кэширования
        let Some(cell) = core.singleton_cell(key, registration.id()) else {
            return registration.build(resolver).await.map(Resolved::built);
        };

        let built = AtomicBool::new(false);
        let built_flag = &built;
        let instance = cell
            .get_or_try_init(|| async move {
                built_flag.store(true, Ordering::Relaxed);
                registration.build(resolver).await
            })
            .await?
            .clone();

        if built.load(Ordering::Relaxed) {
            debug!("Singleton {} created", key);
            Ok(Resolved::built(instance))
        } else {
            Ok(Resolved::cached(instance))
        }
    }
}

pub(crate) struct WeakStrategy;

#[async_trait]
impl RetentionStrategy for WeakStrategy {
    async fn instance(
        &self,
        core: &ContainerCore,
        key: &ServiceKey,
        registration: &Registration,
        resolver: Resolver,
    ) -> anyhow::Result<Resolved> {
        let Some(slot) = core.weak_slot(key, registration.id()) else {
            return registration.build(resolver).await.map(Resolved::built);
        };

        if let Some(instance) = slot.live() {
            return Ok(Resolved::cached(instance));
        }

        let _build_guard = slot.lock_build().await;
        if let Some(instance) = slot.live() {
            return Ok(Resolved::cached(instance));
        }

        let instance = registration.build(resolver).await?;
        slot.store(&instance);
        debug!("Weak instance {} (re)built", key);
        Ok(Resolved::built(instance))
    }
}
