//! Диагностика и health check контейнера. Только чтение состояния:
//! ничего не очищается и не блокирует resolve.

use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::container::Container;
use crate::key::ServiceKeyDescriptor;

#[derive(Debug, Clone, Serialize)]
pub struct ContainerDiagnostics {
    pub total_registrations: usize,
    pub singleton_instances: usize,
    pub weak_references: usize,
    pub active_weak_references: usize,
    pub registered_types: Vec<ServiceKeyDescriptor>,
    /// Регистрации, которые ни разу не были успешно разрешены
    pub unused_registrations: usize,
    pub current_resolution_depth: usize,
    pub peak_resolution_depth: usize,
    pub failed_resolutions: u64,
}

impl ContainerDiagnostics {
    /// Доля живых weak ссылок; 1.0 если weak ссылок нет
    pub fn memory_efficiency(&self) -> f64 {
        if self.weak_references == 0 {
            1.0
        } else {
            self.active_weak_references as f64 / self.weak_references as f64
        }
    }
}

impl fmt::Display for ContainerDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Container Diagnostics")?;
        writeln!(f, "  Total Registrations: {}", self.total_registrations)?;
        writeln!(f, "  Singleton Instances: {}", self.singleton_instances)?;
        writeln!(
            f,
            "  Weak References: {} (active: {})",
            self.weak_references, self.active_weak_references
        )?;
        writeln!(f, "  Memory Efficiency: {:.1}%", self.memory_efficiency() * 100.0)?;
        writeln!(f, "  Unused Registrations: {}", self.unused_registrations)?;
        writeln!(f, "  Peak Resolution Depth: {}", self.peak_resolution_depth)?;
        if !self.registered_types.is_empty() {
            writeln!(f, "  Registered Types:")?;
            for key in &self.registered_types {
                writeln!(f, "    - {key}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    HasIssues,
    Critical,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Healthy => "healthy",
            Self::HasIssues => "has issues",
            Self::Critical => "critical",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum HealthIssue {
    MemoryLeak(String),
    OrphanedRegistrations(usize),
    DeepResolutionStack(String),
    CircularDependency(Vec<ServiceKeyDescriptor>),
}

impl fmt::Display for HealthIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MemoryLeak(detail) => write!(f, "Memory leak: {detail}"),
            Self::OrphanedRegistrations(count) => write!(f, "Orphaned registrations: {count}"),
            Self::DeepResolutionStack(detail) => write!(f, "Deep resolution stack: {detail}"),
            Self::CircularDependency(path) => {
                let path: Vec<String> = path.iter().map(ToString::to_string).collect();
                write!(f, "Circular dependency: {}", path.join(" → "))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerHealthReport {
    pub status: HealthStatus,
    pub issues: Vec<HealthIssue>,
    pub recommendations: Vec<String>,
    pub diagnostics: ContainerDiagnostics,
}

impl Container {
    pub fn get_diagnostics(&self) -> ContainerDiagnostics {
        let snapshot = self.core().snapshot();

        ContainerDiagnostics {
            total_registrations: snapshot.registered_keys.len(),
            singleton_instances: snapshot.singleton_instances,
            weak_references: snapshot.weak_references,
            active_weak_references: snapshot.active_weak_references,
            registered_types: snapshot.registered_keys.iter().map(|k| k.descriptor()).collect(),
            unused_registrations: snapshot.unused_registrations,
            current_resolution_depth: snapshot.current_depth,
            peak_resolution_depth: snapshot.peak_depth,
            failed_resolutions: self.failed_resolutions(),
        }
    }

    /// Советующие сигналы о состоянии контейнера; никогда не блокирует resolve
    pub fn perform_health_check(&self) -> ContainerHealthReport {
        let thresholds = &self.core().config().health;
        let snapshot = self.core().snapshot();
        let diagnostics = self.get_diagnostics();
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        if diagnostics.weak_references > 0 {
            let efficiency = diagnostics.memory_efficiency();
            if efficiency < thresholds.min_weak_efficiency {
                issues.push(HealthIssue::MemoryLeak(format!(
                    "Low weak reference efficiency: {:.1}%",
                    efficiency * 100.0
                )));
                recommendations
                    .push("Consider calling perform_maintenance_cleanup() more frequently".to_string());
            }
        }

        if diagnostics.total_registrations > 0 {
            let unused_ratio =
                diagnostics.unused_registrations as f64 / diagnostics.total_registrations as f64;
            if unused_ratio > thresholds.max_unused_ratio {
                issues.push(HealthIssue::OrphanedRegistrations(diagnostics.unused_registrations));
                recommendations.push("Remove unused registrations to improve performance".to_string());
            }
        }

        let depth = diagnostics
            .peak_resolution_depth
            .max(diagnostics.current_resolution_depth);
        if depth > thresholds.max_resolution_depth {
            issues.push(HealthIssue::DeepResolutionStack(format!(
                "Resolution stack depth: {depth}"
            )));
            recommendations.push("Consider breaking complex dependency chains".to_string());
        }

        let has_cycles = !snapshot.recent_cycles.is_empty();
        for cycle in &snapshot.recent_cycles {
            issues.push(HealthIssue::CircularDependency(
                cycle.iter().map(|k| k.descriptor()).collect(),
            ));
        }
        if has_cycles {
            recommendations
                .push("Break circular dependencies by injecting factories or resolving lazily".to_string());
        }

        let status = if has_cycles {
            HealthStatus::Critical
        } else if issues.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::HasIssues
        };

        debug!(
            "Health check for '{}': {} ({} issues)",
            self.name(),
            status,
            issues.len()
        );

        ContainerHealthReport {
            status,
            issues,
            recommendations,
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_efficiency() {
        let mut diagnostics = ContainerDiagnostics {
            total_registrations: 3,
            singleton_instances: 1,
            weak_references: 0,
            active_weak_references: 0,
            registered_types: vec![],
            unused_registrations: 0,
            current_resolution_depth: 0,
            peak_resolution_depth: 0,
            failed_resolutions: 0,
        };
        assert_eq!(diagnostics.memory_efficiency(), 1.0);

        diagnostics.weak_references = 4;
        diagnostics.active_weak_references = 3;
        assert_eq!(diagnostics.memory_efficiency(), 0.75);

        let text = diagnostics.to_string();
        assert!(text.contains("Total Registrations: 3"));
        assert!(text.contains("Weak References: 4 (active: 3)"));
        assert!(text.contains("Memory Efficiency: 75.0%"));
    }

    #[test]
    fn test_empty_container_is_healthy() {
        let report = Container::new().perform_health_check();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.issues.is_empty());
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn test_issue_serialization() {
        let json = serde_json::to_string(&HealthIssue::OrphanedRegistrations(2)).unwrap_or_default();
        assert!(json.contains("orphaned_registrations"));
        assert_eq!(HealthIssue::OrphanedRegistrations(2).to_string(), "Orphaned registrations: 2");
    }
}
