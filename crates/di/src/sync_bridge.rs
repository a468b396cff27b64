//! Синхронный resolve поверх асинхронного с таймаутом.
//!
//! Разрешение запускается фоновой задачей, вызывающий поток блокируется до
//! результата или таймаута. По таймауту задача НЕ отменяется: она может
//! завершиться позже и закэшировать экземпляр в контейнере.

use once_cell::sync::Lazy;
use std::any::Any;
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tracing::{error, warn};

use crate::container::{Container, ContainerCore};
use crate::errors::{ContainerError, ContainerResult};
use crate::key::ServiceKey;
use crate::resolver::active_chain;

/// Runtime для вызовов вне tokio или из current_thread runtime,
/// где блокировка потока остановила бы саму задачу
static BRIDGE_RUNTIME: Lazy<Option<Runtime>> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("di-sync-bridge")
        .enable_all()
        .build()
        .map_err(|e| error!("Failed to start sync bridge runtime: {}", e))
        .ok()
});

impl Container {
    /// Разрешить `T` синхронно с таймаутом из конфигурации (500ms по умолчанию)
    pub fn resolve_sync<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<T>> {
        self.resolve_sync_key(ServiceKey::of::<T>(), self.config().sync_timeout())
    }

    pub fn resolve_sync_named<T: Any + Send + Sync>(&self, name: &str) -> ContainerResult<Arc<T>> {
        self.resolve_sync_key(ServiceKey::named::<T>(name), self.config().sync_timeout())
    }

    pub fn resolve_sync_with_timeout<T: Any + Send + Sync>(
        &self,
        name: Option<&str>,
        timeout: Duration,
    ) -> ContainerResult<Arc<T>> {
        self.resolve_sync_key(ServiceKey::new::<T>(name.map(str::to_string)), timeout)
    }

    fn resolve_sync_key<T: Any + Send + Sync>(
        &self,
        key: ServiceKey,
        timeout: Duration,
    ) -> ContainerResult<Arc<T>> {
        let (sender, receiver) = mpsc::sync_channel(1);
        let core = self.core().clone();
        // Фоновая задача не видит task-local цепочку вызывающего
        let inherited = active_chain(&core);
        let task_key = key.clone();
        let task = async move {
            let path = inherited.unwrap_or_else(|| core.new_path());
            let result = core
                .resolve_instance(&task_key, &path)
                .await
                .and_then(|instance| ContainerCore::downcast::<T>(&task_key, instance));
            // Получатель мог уже уйти по таймауту
            let _ = sender.send(result);
        };

        let received = match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                handle.spawn(task);
                tokio::task::block_in_place(|| receiver.recv_timeout(timeout))
            }
            _ => {
                let Some(runtime) = BRIDGE_RUNTIME.as_ref() else {
                    return Err(ContainerError::from_factory(
                        &key,
                        anyhow::anyhow!("sync bridge runtime is not available"),
                    ));
                };
                runtime.spawn(task);
                receiver.recv_timeout(timeout)
            }
        };

        match received {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    "Synchronous resolution of {} timed out after {}ms",
                    key,
                    timeout.as_millis()
                );
                Err(ContainerError::sync_timeout(&key, timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ContainerError::from_factory(
                &key,
                anyhow::anyhow!("resolution task terminated before producing a result"),
            )),
        }
    }
}
