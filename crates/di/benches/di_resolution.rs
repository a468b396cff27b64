use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use di::Container;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Benchmarks для DI контейнера: регистрация, resolve по политикам, цепочки

struct LightweightService {
    id: u64,
}

/// Сервис с заметной работой в конструкторе
struct HeavyService {
    checksum: u64,
}

impl HeavyService {
    fn new(seed: u64) -> Self {
        let checksum = (0..1000u64).map(|i| (i * seed) % 1000).sum();
        Self { checksum }
    }
}

struct DependentService {
    lightweight: Arc<LightweightService>,
    heavy: Arc<HeavyService>,
}

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("di_registration");

    for count in [10u64, 100, 500] {
        group.bench_with_input(BenchmarkId::new("named_singletons", count), &count, |b, &count| {
            b.iter(|| {
                let container = Container::new();
                for i in 0..count {
                    let _ = container
                        .register::<LightweightService>()
                        .named(format!("service-{i}"))
                        .as_singleton()
                        .with_sync(move |_| Ok(LightweightService { id: i }));
                }
                black_box(container)
            });
        });
    }

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("di_resolution");
    let runtime = Runtime::new().expect("tokio runtime");

    let container = Container::new();
    let _ = container
        .register::<LightweightService>()
        .as_singleton()
        .with_sync(|_| Ok(LightweightService { id: 1 }));
    let _ = container
        .register::<HeavyService>()
        .as_transient()
        .with_sync(|_| Ok(HeavyService::new(7)));
    let _ = container
        .register::<DependentService>()
        .as_transient()
        .with(|resolver| async move {
            Ok(DependentService {
                lightweight: resolver.resolve::<LightweightService>().await?,
                heavy: resolver.resolve::<HeavyService>().await?,
            })
        });

    group.bench_function("singleton", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let service = container.resolve::<LightweightService>().await;
                black_box(service.map(|s| s.id).unwrap_or_default())
            })
        });
    });

    group.bench_function("transient", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let service = container.resolve::<HeavyService>().await;
                black_box(service.map(|s| s.checksum).unwrap_or_default())
            })
        });
    });

    group.bench_function("dependency_chain", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let service = container.resolve::<DependentService>().await;
                black_box(service.map(|s| s.lightweight.id + s.heavy.checksum).unwrap_or_default())
            })
        });
    });

    group.bench_function("resolve_sync_singleton", |b| {
        b.iter(|| black_box(container.resolve_sync::<LightweightService>().is_ok()));
    });

    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("di_batch");
    let runtime = Runtime::new().expect("tokio runtime");

    let container = Container::new();
    let names: Vec<Option<String>> = (0..32).map(|i| Some(format!("worker-{i}"))).collect();
    for i in 0..32u64 {
        let _ = container
            .register::<HeavyService>()
            .named(format!("worker-{i}"))
            .as_transient()
            .with_sync(move |_| Ok(HeavyService::new(i)));
    }

    group.bench_function("resolve_batch_32", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let services = container.resolve_batch::<HeavyService>(names.clone()).await;
                black_box(services.map(|s| s.len()).unwrap_or_default())
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_registration, bench_resolution, bench_batch);
criterion_main!(benches);
