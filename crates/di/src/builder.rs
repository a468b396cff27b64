use futures::future::{self, FutureExt};
use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::container::Container;
use crate::errors::ContainerResult;
use crate::key::{Instance, ServiceKey};
use crate::registration::{ErasedFactory, Registration};
use crate::resolver::Resolver;
use crate::retention::RetentionPolicy;

/// Неизменяемая конфигурация регистрации, накапливаемая builder-ом
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationConfig {
    pub name: Option<String>,
    pub policy: RetentionPolicy,
}

/// Fluent builder регистрации.
///
/// `named`/`as_*` возвращают новый builder, ничего не меняя в контейнере.
/// `with*` фиксирует регистрацию и возвращает builder для дальнейших
/// регистраций.
///
/// ```ignore
/// container
///     .register::<String>()
///     .named("greeting")
///     .as_singleton()
///     .with(|_| async { Ok("Hello DI World!".to_string()) })?;
/// ```
pub struct RegistrationBuilder<T> {
    container: Container,
    config: RegistrationConfig,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> RegistrationBuilder<T> {
    pub(crate) fn new(container: Container) -> Self {
        Self {
            container,
            config: RegistrationConfig::default(),
            _marker: PhantomData,
        }
    }

    pub fn named(self, name: impl Into<String>) -> Self {
        self.map_config(|config| RegistrationConfig {
            name: Some(name.into()),
            ..config
        })
    }

    pub fn as_singleton(self) -> Self {
        self.with_policy(RetentionPolicy::Singleton)
    }

    pub fn as_weak(self) -> Self {
        self.with_policy(RetentionPolicy::Weak)
    }

    pub fn as_transient(self) -> Self {
        self.with_policy(RetentionPolicy::Transient)
    }

    pub fn with_policy(self, policy: RetentionPolicy) -> Self {
        self.map_config(|config| RegistrationConfig { policy, ..config })
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    pub fn key(&self) -> ServiceKey {
        ServiceKey::new::<T>(self.config.name.clone())
    }

    /// Зафиксировать асинхронную фабрику
    pub fn with<F, Fut>(self, factory: F) -> ContainerResult<Self>
    where
        F: Fn(Resolver) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let erased: ErasedFactory = Arc::new(move |resolver: Resolver| {
            factory(resolver).map(|result| result.map(Instance::new)).boxed()
        });
        self.commit(erased, None)
    }

    /// Зафиксировать синхронную фабрику (для листовых сервисов без await)
    pub fn with_sync<F>(self, factory: F) -> ContainerResult<Self>
    where
        F: Fn(&Resolver) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let erased: ErasedFactory = Arc::new(move |resolver: Resolver| {
            future::ready(factory(&resolver).map(Instance::new)).boxed()
        });
        self.commit(erased, None)
    }

    /// Зарегистрировать готовый экземпляр как singleton
    pub fn with_instance(self, value: T) -> ContainerResult<Self> {
        let instance = Instance::new(value);
        let cached = instance.clone();
        let erased: ErasedFactory = Arc::new(move |_resolver: Resolver| {
            future::ready(Ok::<_, anyhow::Error>(cached.clone())).boxed()
        });

        self.as_singleton().commit(erased, Some(instance))
    }

    fn commit(self, factory: ErasedFactory, preset: Option<Instance>) -> ContainerResult<Self> {
        let registration = Registration::new(self.config.policy, factory);
        self.container.commit(self.key(), registration, preset)?;
        Ok(self)
    }

    fn map_config(self, update: impl FnOnce(RegistrationConfig) -> RegistrationConfig) -> Self {
        Self {
            container: self.container,
            config: update(self.config),
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ContainerError;

    struct Formatter;

    #[test]
    fn test_builder_accumulates_config() {
        let container = Container::new();
        let builder = container.register::<Formatter>().named("card").as_weak();

        assert_eq!(builder.config().name.as_deref(), Some("card"));
        assert_eq!(builder.config().policy, RetentionPolicy::Weak);
        assert_eq!(builder.key(), ServiceKey::named::<Formatter>("card"));

        // Ничего не зафиксировано
        assert!(!container.is_registered::<Formatter>(Some("card")));

        let builder = builder.as_transient();
        assert_eq!(builder.config().policy, RetentionPolicy::Transient);
    }

    #[tokio::test]
    async fn test_weak_rejected_for_plain_values() {
        let container = Container::new();
        let result = container.register::<bool>().as_weak().with_sync(|_| Ok(true));

        assert!(matches!(result, Err(ContainerError::WeakUnsupported { .. })));
        assert!(!container.is_registered::<bool>(None));
    }

    #[tokio::test]
    async fn test_with_returns_builder_for_chaining() -> anyhow::Result<()> {
        let container = Container::new();
        container
            .register::<String>()
            .named("first")
            .with_sync(|_| Ok("one".to_string()))?
            .named("second")
            .with(|_| async { Ok("two".to_string()) })?;

        assert_eq!(container.resolve_named::<String>("first").await?.as_str(), "one");
        assert_eq!(container.resolve_named::<String>("second").await?.as_str(), "two");
        Ok(())
    }
}
