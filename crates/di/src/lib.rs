//! Асинхронный DI контейнер.
//!
//! Регистрация сервисов через fluent builder, разрешение с тремя политиками
//! хранения (transient, singleton, weak), обнаружение циклов, параллельное
//! batch разрешение, синхронный мост с таймаутом, диагностика и глобальный
//! реестр scoped контейнеров.

pub mod builder;
pub mod config;
pub mod container;
pub mod diagnostics;
pub mod errors;
pub mod factory;
pub mod global;
pub mod key;
pub mod metrics;
pub mod registration;
pub mod resolver;
pub mod retention;
pub mod scope;
mod sync_bridge;

pub use builder::{RegistrationBuilder, RegistrationConfig};
pub use config::{ConfigurationLoader, ContainerConfig, HealthThresholds};
pub use container::Container;
pub use diagnostics::{ContainerDiagnostics, ContainerHealthReport, HealthIssue, HealthStatus};
pub use errors::{ContainerError, ContainerResult, SyncResolveTimeout};
pub use factory::{AsyncFactory, Factory};
pub use global::{global, GlobalRegistry};
pub use key::{Instance, ServiceKey, ServiceKeyDescriptor, TypeDescriptor, WeakInstance};
pub use metrics::{ContainerPerformanceMetrics, KeyResolutionStats, TimingStatsReport};
pub use registration::{ErasedFactory, Registration};
pub use resolver::Resolver;
pub use retention::RetentionPolicy;
pub use scope::DependencyScope;
