//! Registration: фабрика + политика хранения.

use futures::future::BoxFuture;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::key::Instance;
use crate::resolver::Resolver;
use crate::retention::RetentionPolicy;

/// Type-erased фабрика. Получает `Resolver` текущей цепочки разрешения.
pub type ErasedFactory =
    Arc<dyn Fn(Resolver) -> BoxFuture<'static, anyhow::Result<Instance>> + Send + Sync>;

static NEXT_REGISTRATION_ID: AtomicU64 = AtomicU64::new(1);

/// Зарегистрированная фабрика. Принадлежит одному контейнеру.
#[derive(Clone)]
pub struct Registration {
    id: u64,
    policy: RetentionPolicy,
    factory: ErasedFactory,
    successful_resolutions: Arc<AtomicU64>,
}

impl Registration {
    pub fn new(policy: RetentionPolicy, factory: ErasedFactory) -> Self {
        Self {
            id: NEXT_REGISTRATION_ID.fetch_add(1, Ordering::Relaxed),
            policy,
            factory,
            successful_resolutions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Уникален в пределах процесса; меняется при каждой перерегистрации
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    pub(crate) fn build(&self, resolver: Resolver) -> BoxFuture<'static, anyhow::Result<Instance>> {
        (self.factory)(resolver)
    }

    pub(crate) fn mark_resolved(&self) {
        self.successful_resolutions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resolution_count(&self) -> u64 {
        self.successful_resolutions.load(Ordering::Relaxed)
    }

    pub fn was_resolved(&self) -> bool {
        self.resolution_count() > 0
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("resolutions", &self.resolution_count())
            .finish()
    }
}
