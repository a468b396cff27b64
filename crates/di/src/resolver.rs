//! Resolver: то, что фабрика получает для разрешения своих зависимостей.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use crate::container::{Container, ContainerCore};
use crate::errors::{ContainerError, ContainerResult};
use crate::key::ServiceKey;

/// Цепочка ключей одного логического resolve.
///
/// Упорядоченный список для сообщений об ошибке плюс множество для O(1)
/// проверки на цикл.
#[derive(Debug, Clone)]
pub(crate) struct ResolutionPath {
    chain_id: u64,
    keys: Vec<ServiceKey>,
    index: HashSet<ServiceKey>,
}

impl ResolutionPath {
    pub(crate) fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            keys: Vec::new(),
            index: HashSet::new(),
        }
    }

    pub(crate) fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub(crate) fn contains(&self, key: &ServiceKey) -> bool {
        self.index.contains(key)
    }

    pub(crate) fn depth(&self) -> usize {
        self.keys.len()
    }

    /// Полная цепочка от корня с повторным ключом в конце: `[A, B, A]`
    pub(crate) fn closed_with(&self, key: &ServiceKey) -> Vec<ServiceKey> {
        let mut cycle = self.keys.clone();
        cycle.push(key.clone());
        cycle
    }

    pub(crate) fn child(&self, key: ServiceKey) -> Self {
        let mut child = self.clone();
        child.index.insert(key.clone());
        child.keys.push(key);
        child
    }

    pub(crate) fn keys(&self) -> &[ServiceKey] {
        &self.keys
    }
}

tokio::task_local! {
    /// Цепочка, фабрика которой сейчас выполняется в этой задаче
    static ACTIVE_CHAIN: ActiveChain;
}

struct ActiveChain {
    container: usize,
    path: ResolutionPath,
}

fn container_id(core: &Arc<ContainerCore>) -> usize {
    Arc::as_ptr(core) as usize
}

/// Выполнить `future` как продолжение цепочки `path`.
///
/// `Container::resolve*` из фабрики, захватившей контейнер, продолжает эту
/// цепочку, поэтому цикл находится и без `Resolver`.
pub(crate) async fn within_chain<F: Future>(core: &Arc<ContainerCore>, path: ResolutionPath, future: F) -> F::Output {
    let chain = ActiveChain {
        container: container_id(core),
        path,
    };
    ACTIVE_CHAIN.scope(chain, future).await
}

/// Активная в текущей задаче цепочка этого контейнера
pub(crate) fn active_chain(core: &Arc<ContainerCore>) -> Option<ResolutionPath> {
    ACTIVE_CHAIN
        .try_with(|chain| (chain.container == container_id(core)).then(|| chain.path.clone()))
        .ok()
        .flatten()
}

/// Доступ к контейнеру изнутри фабрики.
///
/// Держит слабую ссылку на контейнер: если фабрика сохранит resolver и
/// переживёт контейнер, дальнейшие вызовы вернут `ContainerUnavailable`.
#[derive(Clone)]
pub struct Resolver {
    core: Weak<ContainerCore>,
    path: ResolutionPath,
}

impl Resolver {
    pub(crate) fn new(core: Weak<ContainerCore>, path: ResolutionPath) -> Self {
        Self { core, path }
    }

    fn core(&self) -> ContainerResult<Arc<ContainerCore>> {
        self.core.upgrade().ok_or(ContainerError::ContainerUnavailable)
    }

    pub async fn resolve<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<T>> {
        self.resolve_key(&ServiceKey::of::<T>()).await
    }

    pub async fn resolve_named<T: Any + Send + Sync>(&self, name: &str) -> ContainerResult<Arc<T>> {
        self.resolve_key(&ServiceKey::named::<T>(name)).await
    }

    /// Разрешить ключ в рамках текущей цепочки (циклы обнаруживаются)
    pub async fn resolve_key<T: Any + Send + Sync>(&self, key: &ServiceKey) -> ContainerResult<Arc<T>> {
        let core = self.core()?;
        let instance = core.resolve_instance(key, &self.path).await?;
        ContainerCore::downcast::<T>(key, instance)
    }

    /// `None`, если зависимость не зарегистрирована или не создалась
    pub async fn try_resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.resolve::<T>().await.ok()
    }

    /// Контейнер, которому принадлежит resolver
    pub fn container(&self) -> ContainerResult<Container> {
        self.core().map(Container::from_core)
    }

    /// Ключи текущей цепочки, от корня к текущему
    pub fn path(&self) -> &[ServiceKey] {
        self.path.keys()
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("chain", &self.path.chain_id())
            .field("path", &self.path.keys())
            .field("container_alive", &(self.core.strong_count() > 0))
            .finish()
    }
}
