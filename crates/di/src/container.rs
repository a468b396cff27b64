use std::{
    any::{type_name, Any},
    collections::{HashMap, VecDeque},
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::builder::RegistrationBuilder;
use crate::config::ContainerConfig;
use crate::errors::{ContainerError, ContainerResult};
use crate::key::{Instance, ServiceKey, TypeDescriptor, WeakInstance};
use crate::metrics::{
    ContainerPerformanceMetrics, KeyResolutionStats, MetricsCollector, ResolutionOutcome, TimingStatsReport,
};
use crate::registration::{ErasedFactory, Registration};
use crate::resolver::{active_chain, within_chain, ResolutionPath, Resolver};
use crate::retention::{strategy_for, Resolved, RetentionPolicy};

/// Сколько последних обнаруженных циклов помнить для health check
const RECENT_CYCLES_LIMIT: usize = 16;

/// Ячейка weak кэша одного ключа
pub(crate) struct WeakSlot {
    instance: Mutex<Option<WeakInstance>>,
    /// Сериализует пересборку, чтобы конкурентные resolve не вызвали фабрику дважды
    build_lock: tokio::sync::Mutex<()>,
}

impl WeakSlot {
    fn new() -> Self {
        Self {
            instance: Mutex::new(None),
            build_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn live(&self) -> Option<Instance> {
        self.instance.lock().as_ref().and_then(WeakInstance::upgrade)
    }

    pub(crate) fn store(&self, instance: &Instance) {
        *self.instance.lock() = Some(instance.downgrade());
    }

    pub(crate) async fn lock_build(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.build_lock.lock().await
    }

    fn holds_reference(&self) -> bool {
        self.instance.lock().is_some()
    }

    fn is_alive(&self) -> bool {
        self.instance
            .lock()
            .as_ref()
            .map(WeakInstance::is_alive)
            .unwrap_or(false)
    }

    fn is_building(&self) -> bool {
        self.build_lock.try_lock().is_err()
    }
}

/// Всё изменяемое состояние контейнера. Доступ только под `ContainerCore::state`,
/// лок никогда не удерживается через await.
#[derive(Default)]
struct ContainerState {
    factories: HashMap<ServiceKey, Registration>,
    strong: HashMap<ServiceKey, Arc<OnceCell<Instance>>>,
    weak: HashMap<ServiceKey, Arc<WeakSlot>>,
    /// глубина -> количество активных кадров разрешения на этой глубине
    active_depths: HashMap<usize, usize>,
    peak_depth: usize,
    recent_cycles: VecDeque<Vec<ServiceKey>>,
}

impl ContainerState {
    fn current_depth(&self) -> usize {
        self.active_depths.keys().copied().max().unwrap_or(0)
    }
}

/// Срез состояния для диагностики
pub(crate) struct StateSnapshot {
    pub(crate) registered_keys: Vec<ServiceKey>,
    pub(crate) unused_registrations: usize,
    pub(crate) singleton_instances: usize,
    pub(crate) weak_references: usize,
    pub(crate) active_weak_references: usize,
    pub(crate) current_depth: usize,
    pub(crate) peak_depth: usize,
    pub(crate) recent_cycles: Vec<Vec<ServiceKey>>,
}

pub(crate) struct ContainerCore {
    config: ContainerConfig,
    state: Mutex<ContainerState>,
    metrics: MetricsCollector,
    next_chain_id: AtomicU64,
    torn_down: AtomicBool,
}

/// Кадр активного разрешения; снимается в Drop на любом пути выхода
struct ActiveFrame<'a> {
    core: &'a ContainerCore,
    depth: usize,
}

impl<'a> ActiveFrame<'a> {
    fn enter(core: &'a ContainerCore, depth: usize) -> Self {
        let mut state = core.state.lock();
        *state.active_depths.entry(depth).or_insert(0) += 1;
        state.peak_depth = state.peak_depth.max(depth);
        Self { core, depth }
    }
}

impl Drop for ActiveFrame<'_> {
    fn drop(&mut self) {
        let mut state = self.core.state.lock();
        if let Some(count) = state.active_depths.get_mut(&self.depth) {
            *count -= 1;
            if *count == 0 {
                state.active_depths.remove(&self.depth);
            }
        }
    }
}

impl ContainerCore {
    fn new(config: ContainerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ContainerState::default()),
            metrics: MetricsCollector::new(),
            next_chain_id: AtomicU64::new(1),
            torn_down: AtomicBool::new(false),
        }
    }

    pub(crate) fn config(&self) -> &ContainerConfig {
        &self.config
    }

    fn ensure_available(&self) -> ContainerResult<()> {
        if self.torn_down.load(Ordering::Acquire) {
            Err(ContainerError::ContainerUnavailable)
        } else {
            Ok(())
        }
    }

    /// Новая логическая цепочка разрешения
    pub(crate) fn new_path(&self) -> ResolutionPath {
        ResolutionPath::new(self.next_chain_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Цепочка, активная в текущей задаче, или новая
    pub(crate) fn chain_path(self: &Arc<Self>) -> ResolutionPath {
        active_chain(self).unwrap_or_else(|| self.new_path())
    }

    /// Once-cell для singleton, если регистрация `registration_id` всё ещё актуальна
    pub(crate) fn singleton_cell(&self, key: &ServiceKey, registration_id: u64) -> Option<Arc<OnceCell<Instance>>> {
        let mut state = self.state.lock();
        if state.factories.get(key).map(Registration::id) != Some(registration_id) {
            return None;
        }
        Some(
            state
                .strong
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone(),
        )
    }

    pub(crate) fn weak_slot(&self, key: &ServiceKey, registration_id: u64) -> Option<Arc<WeakSlot>> {
        let mut state = self.state.lock();
        if state.factories.get(key).map(Registration::id) != Some(registration_id) {
            return None;
        }
        Some(
            state
                .weak
                .entry(key.clone())
                .or_insert_with(|| Arc::new(WeakSlot::new()))
                .clone(),
        )
    }

    pub(crate) async fn resolve_instance(
        self: &Arc<Self>,
        key: &ServiceKey,
        path: &ResolutionPath,
    ) -> ContainerResult<Instance> {
        let started = Instant::now();
        let result = self.resolve_uninstrumented(key, path).await;
        let elapsed = started.elapsed();

        if self.config.enable_metrics {
            let outcome = match &result {
                Ok(resolved) if resolved.from_cache => ResolutionOutcome::CacheHit,
                Ok(_) => ResolutionOutcome::Built,
                Err(_) => ResolutionOutcome::Failed,
            };
            self.metrics.record_resolution(key, elapsed, outcome);
        }

        let resolved = result?;
        debug!(
            key = %key,
            chain = path.chain_id(),
            cached = resolved.from_cache,
            elapsed_us = elapsed.as_micros() as u64,
            "Dependency resolved"
        );
        Ok(resolved.instance)
    }

    async fn resolve_uninstrumented(
        self: &Arc<Self>,
        key: &ServiceKey,
        path: &ResolutionPath,
    ) -> ContainerResult<Resolved> {
        self.ensure_available()?;

        let registration = self.state.lock().factories.get(key).cloned();
        let Some(registration) = registration else {
            return Err(self.not_registered(key));
        };

        if path.contains(key) {
            let cycle = path.closed_with(key);
            let error = ContainerError::CircularDependency {
                key: key.clone(),
                path: cycle.clone(),
            };
            error!(chain = path.chain_id(), "{}", error);
            self.record_cycle(cycle);
            return Err(error);
        }

        let child = path.child(key.clone());
        let _frame = ActiveFrame::enter(self, child.depth());
        let resolver = Resolver::new(Arc::downgrade(self), child.clone());

        let strategy = strategy_for(registration.policy()).instance(self, key, &registration, resolver);
        let resolved = within_chain(self, child, strategy)
            .await
            .map_err(|e| ContainerError::from_factory(key, e))?;

        if resolved.instance.type_id() != key.type_id() {
            return Err(ContainerError::TypeCastFailed {
                key: key.clone(),
                expected: key.type_name(),
                actual: resolved.instance.type_name(),
            });
        }

        registration.mark_resolved();
        Ok(resolved)
    }

    pub(crate) fn downcast<T: Any + Send + Sync>(key: &ServiceKey, instance: Instance) -> ContainerResult<Arc<T>> {
        instance
            .downcast::<T>()
            .ok_or_else(|| ContainerError::TypeCastFailed {
                key: key.clone(),
                expected: type_name::<T>(),
                actual: instance.type_name(),
            })
    }

    /// Ошибка с подсказками: тот же тип под другим именем или то же имя у другого типа
    fn not_registered(&self, key: &ServiceKey) -> ContainerError {
        let state = self.state.lock();
        let mut suggestions: Vec<String> = state
            .factories
            .keys()
            .filter(|&candidate| {
                ServiceKey::type_id(candidate) == key.type_id()
                    || (key.name().is_some() && candidate.name() == key.name())
            })
            .map(ToString::to_string)
            .collect();
        suggestions.sort();

        ContainerError::DependencyNotRegistered {
            key: key.clone(),
            suggestions,
        }
    }

    fn record_cycle(&self, cycle: Vec<ServiceKey>) {
        let mut state = self.state.lock();
        state.recent_cycles.push_back(cycle);
        while state.recent_cycles.len() > RECENT_CYCLES_LIMIT {
            state.recent_cycles.pop_front();
        }
    }

    pub(crate) fn snapshot(&self) -> StateSnapshot {
        let state = self.state.lock();

        let mut registered_keys: Vec<ServiceKey> = state.factories.keys().cloned().collect();
        registered_keys.sort_by_cached_key(ToString::to_string);

        StateSnapshot {
            registered_keys,
            unused_registrations: state.factories.values().filter(|r| !r.was_resolved()).count(),
            singleton_instances: state.strong.values().filter(|cell| cell.initialized()).count(),
            weak_references: state.weak.values().filter(|slot| slot.holds_reference()).count(),
            active_weak_references: state.weak.values().filter(|slot| slot.is_alive()).count(),
            current_depth: state.current_depth(),
            peak_depth: state.peak_depth,
            recent_cycles: state.recent_cycles.iter().cloned().collect(),
        }
    }
}

/// Асинхронный DI контейнер.
///
/// Дешево клонируется: все клоны разделяют одно состояние. Кэшированные
/// экземпляры живут не дольше контейнера и никогда не разделяются между
/// контейнерами.
// @component: {"k":"C","id":"di_container","t":"Async DI container with retention strategies and cycle detection","m":{"cur":100,"tgt":100,"u":"%"},"f":["di","async","retention","cycles"]}
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerCore>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    pub fn with_config(config: ContainerConfig) -> Self {
        debug!("Creating container '{}'", config.name);
        Self {
            inner: Arc::new(ContainerCore::new(config)),
        }
    }

    pub(crate) fn from_core(inner: Arc<ContainerCore>) -> Self {
        Self { inner }
    }

    pub(crate) fn core(&self) -> &Arc<ContainerCore> {
        &self.inner
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    /// Два handle указывают на один и тот же контейнер
    pub fn ptr_eq(&self, other: &Container) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ---------------------------------------------------------------------
    // Регистрация
    // ---------------------------------------------------------------------

    /// Начать регистрацию типа `T`. Ничего не меняется до вызова `with`.
    pub fn register<T: Any + Send + Sync>(&self) -> RegistrationBuilder<T> {
        RegistrationBuilder::new(self.clone())
    }

    /// Builder только если ключ (тип + имя) ещё не зарегистрирован
    pub fn register_if_needed<T: Any + Send + Sync>(&self, name: Option<&str>) -> Option<RegistrationBuilder<T>> {
        if self.is_registered::<T>(name) {
            debug!("{} already registered, skipping", ServiceKey::new::<T>(name.map(str::to_string)));
            return None;
        }

        let builder = self.register::<T>();
        Some(match name {
            Some(name) => builder.named(name),
            None => builder,
        })
    }

    /// Singleton с уже готовым экземпляром
    pub fn register_instance<T: Any + Send + Sync>(&self, value: T) -> ContainerResult<()> {
        self.register::<T>().with_instance(value).map(|_| ())
    }

    /// Низкоуровневая регистрация type-erased фабрики.
    ///
    /// Если фабрика вернёт экземпляр не того типа, resolve завершится
    /// `TypeCastFailed`.
    pub fn register_erased(
        &self,
        key: ServiceKey,
        policy: RetentionPolicy,
        factory: ErasedFactory,
    ) -> ContainerResult<()> {
        self.commit(key, Registration::new(policy, factory), None)
    }

    /// Единственная точка записи регистрации. Кэш по ключу вытесняется
    /// до сохранения новой фабрики.
    pub(crate) fn commit(
        &self,
        key: ServiceKey,
        registration: Registration,
        preset: Option<Instance>,
    ) -> ContainerResult<()> {
        self.inner.ensure_available()?;

        let policy = registration.policy();
        if policy == RetentionPolicy::Weak && !key.type_descriptor().supports_weak_retention() {
            return Err(ContainerError::WeakUnsupported { key });
        }

        let replaced = {
            let mut state = self.inner.state.lock();
            state.strong.remove(&key);
            state.weak.remove(&key);
            if let Some(instance) = preset {
                state
                    .strong
                    .insert(key.clone(), Arc::new(OnceCell::new_with(Some(instance))));
            }
            state.factories.insert(key.clone(), registration).is_some()
        };

        if replaced {
            warn!("Registration for {} replaced, cached instance evicted", key);
        } else {
            debug!("Registered {} as {}", key, policy);
        }

        if self.inner.config.enable_metrics {
            self.inner.metrics.record_registration(&key);
        }
        Ok(())
    }

    pub fn unregister<T: Any>(&self, name: Option<&str>) -> bool {
        self.unregister_key(&ServiceKey::new::<T>(name.map(str::to_string)))
    }

    /// Удалить фабрику и оба кэша. `true`, если регистрация существовала.
    pub fn unregister_key(&self, key: &ServiceKey) -> bool {
        let removed = {
            let mut state = self.inner.state.lock();
            state.strong.remove(key);
            state.weak.remove(key);
            state.factories.remove(key).is_some()
        };

        if removed {
            debug!("Unregistered {}", key);
        }
        removed
    }

    pub fn is_registered<T: Any>(&self, name: Option<&str>) -> bool {
        self.contains_key(&ServiceKey::new::<T>(name.map(str::to_string)))
    }

    pub fn contains_key(&self, key: &ServiceKey) -> bool {
        self.inner.state.lock().factories.contains_key(key)
    }

    pub fn registered_keys(&self) -> Vec<ServiceKey> {
        self.inner.snapshot().registered_keys
    }

    // ---------------------------------------------------------------------
    // Разрешение
    // ---------------------------------------------------------------------

    pub async fn resolve<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<T>> {
        self.resolve_key(&ServiceKey::of::<T>()).await
    }

    pub async fn resolve_named<T: Any + Send + Sync>(&self, name: &str) -> ContainerResult<Arc<T>> {
        self.resolve_key(&ServiceKey::named::<T>(name)).await
    }

    /// Разрешить ключ. Вне фабрик начинается новая цепочка, внутри фабрики
    /// этого контейнера продолжается текущая.
    pub async fn resolve_key<T: Any + Send + Sync>(&self, key: &ServiceKey) -> ContainerResult<Arc<T>> {
        let path = self.inner.chain_path();
        let instance = self.inner.resolve_instance(key, &path).await?;
        ContainerCore::downcast::<T>(key, instance)
    }

    pub async fn try_resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.resolve::<T>().await.ok()
    }

    /// Все доступные экземпляры типа `T` под любыми именами.
    ///
    /// Возвращает закэшированные singleton и живые weak экземпляры, а
    /// ещё не созданные singleton/weak регистрации `T` строит. Transient
    /// регистрации не создаются. Ошибки сборки пропускаются.
    pub async fn resolve_all<T: Any + Send + Sync>(&self) -> Vec<Arc<T>> {
        if self.inner.ensure_available().is_err() {
            return Vec::new();
        }

        let (mut instances, pending) = {
            let state = self.inner.state.lock();

            let mut instances: Vec<Instance> = state
                .strong
                .values()
                .filter_map(|cell| cell.get().cloned())
                .collect();
            instances.extend(state.weak.values().filter_map(|slot| slot.live()));

            let pending: Vec<ServiceKey> = state
                .factories
                .iter()
                .filter(|(key, registration)| {
                    registration.policy() != RetentionPolicy::Transient && key.represents::<T>()
                })
                .filter(|(key, _)| {
                    let cached = state.strong.get(*key).map_or(false, |cell| cell.initialized())
                        || state.weak.get(*key).map_or(false, |slot| slot.is_alive());
                    !cached
                })
                .map(|(key, _)| key.clone())
                .collect();

            (instances, pending)
        };

        for key in pending {
            let path = self.inner.chain_path();
            match self.inner.resolve_instance(&key, &path).await {
                Ok(instance) => instances.push(instance),
                Err(e) => debug!("resolve_all skipped {}: {}", key, e),
            }
        }

        let mut seen: Vec<Instance> = Vec::new();
        let mut result = Vec::new();
        for instance in instances {
            if seen.iter().any(|known| known.ptr_eq(&instance)) {
                continue;
            }
            if let Some(value) = instance.downcast::<T>() {
                result.push(value);
                seen.push(instance);
            }
        }
        result
    }

    /// Разрешить несколько имён типа `T` параллельно.
    /// Порядок результата совпадает с порядком запросов.
    pub async fn resolve_batch<T: Any + Send + Sync>(
        &self,
        names: Vec<Option<String>>,
    ) -> ContainerResult<Vec<Arc<T>>> {
        let keys: Vec<ServiceKey> = names.into_iter().map(ServiceKey::new::<T>).collect();
        let instances = self.resolve_batch_keys(keys.clone()).await?;

        keys.iter()
            .zip(instances)
            .map(|(key, instance)| ContainerCore::downcast::<T>(key, instance))
            .collect()
    }

    /// Разрешить произвольные ключи параллельно, каждый в своей цепочке.
    /// Вызванный из фабрики, каждый ключ продолжает её цепочку.
    ///
    /// Первая ошибка отменяет остальные задачи; частичный результат не
    /// возвращается.
    pub async fn resolve_batch_keys(&self, keys: Vec<ServiceKey>) -> ContainerResult<Vec<Instance>> {
        let inherited = active_chain(&self.inner);
        let mut tasks = JoinSet::new();
        for (index, key) in keys.into_iter().enumerate() {
            let core = self.inner.clone();
            let inherited = inherited.clone();
            tasks.spawn(async move {
                let path = inherited.unwrap_or_else(|| core.new_path());
                core.resolve_instance(&key, &path)
                    .await
                    .map(|instance| (index, instance))
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(entry)) => results.push(entry),
                Ok(Err(e)) => return Err(e),
                Err(join_error) if join_error.is_panic() => {
                    std::panic::resume_unwind(join_error.into_panic())
                }
                Err(_) => return Err(ContainerError::ContainerUnavailable),
            }
        }

        results.sort_by_key(|(index, _)| *index);
        Ok(results.into_iter().map(|(_, instance)| instance).collect())
    }

    // ---------------------------------------------------------------------
    // Жизненный цикл
    // ---------------------------------------------------------------------

    /// Удалить все регистрации и кэши, кроме ключей типов из `ignoring`
    /// (под любыми именами). Уже начатые resolve могут завершиться со
    /// старой регистрацией, но ничего не закэшируют.
    pub fn reset(&self, ignoring: &[TypeDescriptor]) {
        let keep = |key: &ServiceKey| ignoring.iter().any(|t| t.id() == key.type_id());

        let (removed, kept) = {
            let mut state = self.inner.state.lock();
            let before = state.factories.len();
            state.factories.retain(|key, _| keep(key));
            state.strong.retain(|key, _| keep(key));
            state.weak.retain(|key, _| keep(key));
            state.recent_cycles.clear();
            state.peak_depth = state.current_depth();
            (before - state.factories.len(), state.factories.len())
        };

        self.inner.metrics.clear();
        info!(
            "Container '{}' reset: {} registrations removed, {} kept",
            self.name(),
            removed,
            kept
        );
    }

    /// Завершить контейнер. Все последующие операции (в том числе через
    /// сохранённые `Resolver`) возвращают `ContainerUnavailable`.
    pub fn shutdown(&self) {
        if self.inner.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }

        // Экземпляры освобождаются вне лока
        let discarded = std::mem::take(&mut *self.inner.state.lock());
        drop(discarded);
        self.inner.metrics.clear();
        info!("Container '{}' shut down", self.name());
    }

    pub fn is_available(&self) -> bool {
        !self.inner.torn_down.load(Ordering::Acquire)
    }

    /// Удалить weak записи, чьи экземпляры уже освобождены
    pub fn perform_maintenance_cleanup(&self) -> usize {
        let removed = {
            let mut state = self.inner.state.lock();
            let before = state.weak.len();
            state.weak.retain(|_, slot| slot.is_alive() || slot.is_building());
            before - state.weak.len()
        };

        debug!("Maintenance cleanup removed {} dead weak references", removed);
        removed
    }

    pub fn performance_metrics(&self) -> ContainerPerformanceMetrics {
        self.inner
            .metrics
            .snapshot(self.inner.config.slowest_resolutions_limit)
    }

    pub fn timing_stats(&self) -> TimingStatsReport {
        self.inner.metrics.timing_stats()
    }

    /// Статистика разрешений одного ключа (если метрики включены)
    pub fn key_stats(&self, key: &ServiceKey) -> Option<KeyResolutionStats> {
        self.inner.metrics.key_stats(key)
    }

    pub(crate) fn failed_resolutions(&self) -> u64 {
        self.inner.metrics.error_count()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registrations = self.inner.state.lock().factories.len();
        f.debug_struct("Container")
            .field("name", &self.name())
            .field("registrations", &registrations)
            .field("available", &self.is_available())
            .finish()
    }
}
