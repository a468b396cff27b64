use async_trait::async_trait;
use std::future::Future;
use tracing::debug;

use crate::config::ContainerConfig;
use crate::container::Container;
use crate::errors::ContainerResult;
use crate::global::GlobalRegistry;

/// Логический scope (например, один платёжный flow) со своим контейнером.
///
/// `register` создаёт новый контейнер, вызывает `setup_container` и кладёт
/// контейнер в реестр под `scope_id`. `unregister` удаляет его вместе со
/// всеми кэшами.
#[async_trait]
pub trait DependencyScope: Send + Sync {
    fn scope_id(&self) -> &str;

    /// Зарегистрировать сервисы scope
    async fn setup_container(&self, container: &Container) -> ContainerResult<()>;

    async fn register(&self, registry: &GlobalRegistry) -> ContainerResult<Container> {
        let container = Container::with_config(ContainerConfig::named(self.scope_id()));
        self.setup_container(&container).await?;
        registry.set_scoped_container(self.scope_id(), container.clone());
        debug!("Dependency scope '{}' registered", self.scope_id());
        Ok(container)
    }

    fn unregister(&self, registry: &GlobalRegistry) -> bool {
        registry.remove_scoped_container(self.scope_id())
    }

    /// Контейнер scope; `ScopeNotFound` со списком доступных scope
    fn container(&self, registry: &GlobalRegistry) -> ContainerResult<Container> {
        registry.require_scope(self.scope_id())
    }

    async fn with_container<F, Fut, R>(&self, registry: &GlobalRegistry, action: F) -> ContainerResult<R>
    where
        Self: Sized,
        F: FnOnce(Container) -> Fut + Send,
        Fut: Future<Output = R> + Send,
        R: Send,
    {
        let container = self.container(registry)?;
        Ok(action(container).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ContainerError;

    struct PaymentFlowScope {
        id: String,
    }

    #[async_trait]
    impl DependencyScope for PaymentFlowScope {
        fn scope_id(&self) -> &str {
            &self.id
        }

        async fn setup_container(&self, container: &Container) -> ContainerResult<()> {
            container
                .register::<String>()
                .named("flow_id")
                .as_singleton()
                .with_instance(self.id.clone())?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_scope_lifecycle() -> anyhow::Result<()> {
        let registry = GlobalRegistry::new();
        let scope = PaymentFlowScope {
            id: "card-payment".to_string(),
        };

        assert!(matches!(
            scope.container(&registry),
            Err(ContainerError::ScopeNotFound { .. })
        ));

        let container = scope.register(&registry).await?;
        assert_eq!(container.name(), "card-payment");

        let flow_id = scope
            .with_container(&registry, |container| async move {
                container.resolve_named::<String>("flow_id").await
            })
            .await??;
        assert_eq!(flow_id.as_str(), "card-payment");

        assert!(scope.unregister(&registry));
        assert!(!container.is_available());
        assert!(scope.container(&registry).is_err());
        Ok(())
    }
}
