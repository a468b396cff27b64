//! Параметризованные фабрики, зарегистрированные в контейнере как singleton.

use async_trait::async_trait;
use std::any::Any;

use crate::container::Container;
use crate::errors::ContainerResult;

/// Синхронная фабрика продуктов с параметрами.
/// `Params = ()` даёт простую фабрику без аргументов.
pub trait Factory: Send + Sync + 'static {
    type Product;
    type Params;

    fn create(&self, params: Self::Params) -> anyhow::Result<Self::Product>;
}

#[async_trait]
pub trait AsyncFactory: Send + Sync + 'static {
    type Product: Send;
    type Params: Send;

    async fn create(&self, params: Self::Params) -> anyhow::Result<Self::Product>;
}

impl Container {
    /// Зарегистрировать объект-фабрику (singleton по типу фабрики)
    pub fn register_factory<F: Any + Send + Sync>(&self, factory: F) -> ContainerResult<()> {
        self.register_instance(factory)
    }

    /// Разрешить фабрику `F` и вызвать её
    pub async fn create<F>(&self, params: F::Params) -> anyhow::Result<F::Product>
    where
        F: Factory,
    {
        let factory = self.resolve::<F>().await?;
        factory.create(params)
    }

    pub async fn create_async<F>(&self, params: F::Params) -> anyhow::Result<F::Product>
    where
        F: AsyncFactory,
    {
        let factory = self.resolve::<F>().await?;
        factory.create(params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ContainerError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ReceiptFormatter {
        prefix: String,
    }

    impl Factory for ReceiptFormatter {
        type Product = String;
        type Params = (String, u64);

        fn create(&self, (currency, amount): Self::Params) -> anyhow::Result<String> {
            Ok(format!("{}{} {}", self.prefix, amount, currency))
        }
    }

    #[derive(Default)]
    struct SessionFactory {
        created: AtomicUsize,
    }

    #[async_trait]
    impl AsyncFactory for SessionFactory {
        type Product = usize;
        type Params = ();

        async fn create(&self, _params: ()) -> anyhow::Result<usize> {
            Ok(self.created.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    #[tokio::test]
    async fn test_parameterised_factory() -> anyhow::Result<()> {
        let container = Container::new();
        container.register_factory(ReceiptFormatter {
            prefix: "Total: ".to_string(),
        })?;

        let text = container
            .create::<ReceiptFormatter>(("EUR".to_string(), 42))
            .await?;
        assert_eq!(text, "Total: 42 EUR");
        Ok(())
    }

    #[tokio::test]
    async fn test_async_factory_is_shared_singleton() -> anyhow::Result<()> {
        let container = Container::new();
        container.register_factory(SessionFactory::default())?;

        assert_eq!(container.create_async::<SessionFactory>(()).await?, 1);
        assert_eq!(container.create_async::<SessionFactory>(()).await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_unregistered_factory() {
        let container = Container::new();
        let error = container
            .create_async::<SessionFactory>(())
            .await
            .err()
            .and_then(|e| e.downcast::<ContainerError>().ok());

        assert!(matches!(error, Some(ContainerError::DependencyNotRegistered { .. })));
    }
}
