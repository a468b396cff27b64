//! Сбор метрик производительности разрешения зависимостей.

use parking_lot::RwLock;
use serde::Serialize;
use std::{
    collections::HashMap,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tracing::debug;

use crate::key::{ServiceKey, ServiceKeyDescriptor};

/// Сколько последних длительностей хранить для percentiles
const RECENT_SAMPLES_LIMIT: usize = 100;

/// Атомарные счетчики для thread-safe метрик
struct AtomicCounters {
    total_resolutions: AtomicU64,
    total_registrations: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    errors: AtomicU64,
}

impl AtomicCounters {
    fn new() -> Self {
        Self {
            total_resolutions: AtomicU64::new(0),
            total_registrations: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    fn reset(&self) {
        self.total_resolutions.store(0, Ordering::Relaxed);
        self.total_registrations.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

/// Исход одного resolve для учёта в метриках
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// Экземпляр взят из кэша (Singleton/Weak)
    CacheHit,
    /// Вызвана фабрика
    Built,
    Failed,
}

/// Статистика разрешений одного ключа
#[derive(Debug, Clone, Default)]
pub struct KeyResolutionStats {
    pub resolutions: u64,
    pub total_time: Duration,
    pub max_time: Duration,
    pub cache_hits: u64,
    pub error_count: u64,
}

impl KeyResolutionStats {
    fn record(&mut self, duration: Duration, outcome: ResolutionOutcome) {
        self.resolutions += 1;
        self.total_time += duration;
        self.max_time = self.max_time.max(duration);
        match outcome {
            ResolutionOutcome::CacheHit => self.cache_hits += 1,
            ResolutionOutcome::Failed => self.error_count += 1,
            ResolutionOutcome::Built => {}
        }
    }

    pub fn average_time(&self) -> Duration {
        if self.resolutions > 0 {
            Duration::from_secs_f64(self.total_time.as_secs_f64() / self.resolutions as f64)
        } else {
            Duration::ZERO
        }
    }
}

#[derive(Debug, Default)]
struct TimingStats {
    total_resolution_time: Duration,
    min_resolution_time: Option<Duration>,
    max_resolution_time: Option<Duration>,
    recent_resolutions: Vec<Duration>,
}

impl TimingStats {
    fn record_duration(&mut self, duration: Duration) {
        self.total_resolution_time += duration;
        self.min_resolution_time = Some(self.min_resolution_time.map_or(duration, |d| d.min(duration)));
        self.max_resolution_time = Some(self.max_resolution_time.map_or(duration, |d| d.max(duration)));

        self.recent_resolutions.push(duration);
        if self.recent_resolutions.len() > RECENT_SAMPLES_LIMIT {
            self.recent_resolutions.remove(0);
        }
    }

    fn get_percentile(&self, percentile: f64) -> Option<Duration> {
        if self.recent_resolutions.is_empty() {
            return None;
        }

        let mut sorted = self.recent_resolutions.clone();
        sorted.sort();

        let index = (sorted.len() as f64 * percentile / 100.0) as usize;
        sorted.get(index.min(sorted.len() - 1)).copied()
    }
}

/// Детальные timing статистики
#[derive(Debug, Clone)]
pub struct TimingStatsReport {
    pub total_time: Duration,
    pub min_time: Option<Duration>,
    pub max_time: Option<Duration>,
    pub p50: Option<Duration>,
    pub p95: Option<Duration>,
    pub p99: Option<Duration>,
    pub sample_count: usize,
}

/// Сводка производительности контейнера
#[derive(Debug, Clone, Serialize)]
pub struct ContainerPerformanceMetrics {
    pub total_resolutions: u64,
    /// Включая перерегистрации
    pub total_registrations: u64,
    pub average_resolution_time_ms: f64,
    /// Доля resolve, обслуженных из кэша, в диапазоне 0..=1
    pub cache_hit_rate: f64,
    /// Самые медленные ключи по среднему времени, по убыванию
    pub slowest_resolutions: Vec<(ServiceKeyDescriptor, f64)>,
    /// Оценка памяти, занятой самими метриками (байты)
    pub memory_usage_estimate: usize,
}

impl fmt::Display for ContainerPerformanceMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Container Performance Metrics")?;
        writeln!(f, "  Total Resolutions: {}", self.total_resolutions)?;
        writeln!(f, "  Total Registrations: {}", self.total_registrations)?;
        writeln!(f, "  Average Resolution Time: {:.3}ms", self.average_resolution_time_ms)?;
        writeln!(f, "  Cache Hit Rate: {:.1}%", self.cache_hit_rate * 100.0)?;
        writeln!(f, "  Memory Usage: {} bytes", self.memory_usage_estimate)?;
        if !self.slowest_resolutions.is_empty() {
            writeln!(f, "  Slowest Resolutions:")?;
            for (key, ms) in &self.slowest_resolutions {
                writeln!(f, "    {key}: {ms:.3}ms")?;
            }
        }
        Ok(())
    }
}

/// Сборщик метрик контейнера
pub(crate) struct MetricsCollector {
    counters: AtomicCounters,
    key_metrics: RwLock<HashMap<ServiceKey, KeyResolutionStats>>,
    timing_stats: RwLock<TimingStats>,
}

impl MetricsCollector {
    pub(crate) fn new() -> Self {
        Self {
            counters: AtomicCounters::new(),
            key_metrics: RwLock::new(HashMap::new()),
            timing_stats: RwLock::new(TimingStats::default()),
        }
    }

    pub(crate) fn record_registration(&self, key: &ServiceKey) {
        self.counters.total_registrations.fetch_add(1, Ordering::Relaxed);
        debug!("Registration recorded for {}", key);
    }

    pub(crate) fn record_resolution(&self, key: &ServiceKey, duration: Duration, outcome: ResolutionOutcome) {
        self.counters.total_resolutions.fetch_add(1, Ordering::Relaxed);
        match outcome {
            ResolutionOutcome::CacheHit => {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            }
            ResolutionOutcome::Built => {
                self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
            }
            ResolutionOutcome::Failed => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.key_metrics
            .write()
            .entry(key.clone())
            .or_insert_with(KeyResolutionStats::default)
            .record(duration, outcome);
        self.timing_stats.write().record_duration(duration);
    }

    pub(crate) fn key_stats(&self, key: &ServiceKey) -> Option<KeyResolutionStats> {
        self.key_metrics.read().get(key).cloned()
    }

    pub(crate) fn error_count(&self) -> u64 {
        self.counters.errors.load(Ordering::Relaxed)
    }

    pub(crate) fn timing_stats(&self) -> TimingStatsReport {
        let stats = self.timing_stats.read();

        TimingStatsReport {
            total_time: stats.total_resolution_time,
            min_time: stats.min_resolution_time,
            max_time: stats.max_resolution_time,
            p50: stats.get_percentile(50.0),
            p95: stats.get_percentile(95.0),
            p99: stats.get_percentile(99.0),
            sample_count: stats.recent_resolutions.len(),
        }
    }

    pub(crate) fn snapshot(&self, slowest_limit: usize) -> ContainerPerformanceMetrics {
        let total_resolutions = self.counters.total_resolutions.load(Ordering::Relaxed);
        let cache_hits = self.counters.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.counters.cache_misses.load(Ordering::Relaxed);

        let (average_resolution_time_ms, recent_samples) = {
            let stats = self.timing_stats.read();
            let average = if total_resolutions > 0 {
                duration_ms(stats.total_resolution_time) / total_resolutions as f64
            } else {
                0.0
            };
            (average, stats.recent_resolutions.len())
        };

        let cache_lookups = cache_hits + cache_misses;
        let cache_hit_rate = if cache_lookups > 0 {
            cache_hits as f64 / cache_lookups as f64
        } else {
            0.0
        };

        let key_metrics = self.key_metrics.read();
        let mut slowest: Vec<_> = key_metrics
            .iter()
            .map(|(key, metrics)| (key.descriptor(), duration_ms(metrics.average_time())))
            .collect();
        slowest.sort_by(|a, b| b.1.total_cmp(&a.1));
        slowest.truncate(slowest_limit);

        let memory_usage_estimate = key_metrics
            .keys()
            .map(|key| {
                std::mem::size_of::<ServiceKey>()
                    + std::mem::size_of::<KeyResolutionStats>()
                    + key.name().map_or(0, str::len)
            })
            .sum::<usize>()
            + recent_samples * std::mem::size_of::<Duration>();

        ContainerPerformanceMetrics {
            total_resolutions,
            total_registrations: self.counters.total_registrations.load(Ordering::Relaxed),
            average_resolution_time_ms,
            cache_hit_rate,
            slowest_resolutions: slowest,
            memory_usage_estimate,
        }
    }

    pub(crate) fn clear(&self) {
        self.counters.reset();
        self.key_metrics.write().clear();
        *self.timing_stats.write() = TimingStats::default();
        debug!("Metrics cleared");
    }
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
