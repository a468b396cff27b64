use anyhow::Result;
use di::{Container, ContainerError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use tokio::time::{sleep, Duration};

struct AnalyticsReporter {
    session: usize,
}

struct TokenizationClient {
    id: usize,
}

fn counting_reporter(container: &Container, builds: &Arc<AtomicUsize>) -> Result<()> {
    let builds = builds.clone();
    container
        .register::<AnalyticsReporter>()
        .as_weak()
        .with_sync(move |_| {
            let session = builds.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(AnalyticsReporter { session })
        })?;
    Ok(())
}

#[tokio::test]
async fn test_weak_reuses_while_referenced() -> Result<()> {
    let container = Container::new();
    let builds = Arc::new(AtomicUsize::new(0));
    counting_reporter(&container, &builds)?;

    let first = container.resolve::<AnalyticsReporter>().await?;
    let second = container.resolve::<AnalyticsReporter>().await?;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.session, 1);
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_weak_rebuilds_after_release() -> Result<()> {
    let container = Container::new();
    let builds = Arc::new(AtomicUsize::new(0));
    counting_reporter(&container, &builds)?;

    let first = container.resolve::<AnalyticsReporter>().await?;
    assert_eq!(first.session, 1);
    drop(first);

    let second = container.resolve::<AnalyticsReporter>().await?;
    assert_eq!(second.session, 2);
    assert_eq!(builds.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_weak_diagnostics_and_cleanup() -> Result<()> {
    let container = Container::new();
    let builds = Arc::new(AtomicUsize::new(0));
    counting_reporter(&container, &builds)?;

    let reporter = container.resolve::<AnalyticsReporter>().await?;
    let diagnostics = container.get_diagnostics();
    assert_eq!(diagnostics.weak_references, 1);
    assert_eq!(diagnostics.active_weak_references, 1);

    drop(reporter);
    let diagnostics = container.get_diagnostics();
    assert_eq!(diagnostics.weak_references, 1);
    assert_eq!(diagnostics.active_weak_references, 0);
    assert_eq!(diagnostics.memory_efficiency(), 0.0);

    assert_eq!(container.perform_maintenance_cleanup(), 1);
    assert_eq!(container.get_diagnostics().weak_references, 0);
    assert_eq!(container.perform_maintenance_cleanup(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_singleton_built_once() -> Result<()> {
    let container = Container::new();
    let builds = Arc::new(AtomicUsize::new(0));

    let counter = builds.clone();
    container
        .register::<TokenizationClient>()
        .as_singleton()
        .with(move |_| {
            let counter = counter.clone();
            async move {
                // Медленная фабрика, чтобы конкурентные resolve пересеклись
                sleep(Duration::from_millis(50)).await;
                Ok(TokenizationClient {
                    id: counter.fetch_add(1, Ordering::SeqCst) + 1,
                })
            }
        })?;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let container = container.clone();
        handles.push(tokio::spawn(async move {
            container.resolve::<TokenizationClient>().await
        }));
    }

    let mut clients = Vec::new();
    for handle in handles {
        clients.push(handle.await??);
    }

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
    assert_eq!(clients[0].id, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_weak_built_once_while_held() -> Result<()> {
    let container = Container::new();
    let builds = Arc::new(AtomicUsize::new(0));

    let counter = builds.clone();
    container
        .register::<AnalyticsReporter>()
        .as_weak()
        .with(move |_| {
            let counter = counter.clone();
            async move {
                sleep(Duration::from_millis(30)).await;
                Ok(AnalyticsReporter {
                    session: counter.fetch_add(1, Ordering::SeqCst) + 1,
                })
            }
        })?;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let container = container.clone();
        handles.push(tokio::spawn(async move {
            container.resolve::<AnalyticsReporter>().await
        }));
    }

    let mut reporters = Vec::new();
    for handle in handles {
        reporters.push(handle.await??);
    }

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(reporters.iter().all(|r| Arc::ptr_eq(r, &reporters[0])));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_re_registration_during_concurrent_weak_build() -> Result<()> {
    let container = Container::new();
    let builds = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(Notify::new());
    let gate = Arc::new(Semaphore::new(0));

    let (counter, started_tx, gate_rx) = (builds.clone(), started.clone(), gate.clone());
    container
        .register::<AnalyticsReporter>()
        .as_weak()
        .with(move |_| {
            let (counter, started, gate) = (counter.clone(), started_tx.clone(), gate_rx.clone());
            async move {
                started.notify_one();
                let _permit = gate.acquire().await?;
                Ok::<_, anyhow::Error>(AnalyticsReporter {
                    session: counter.fetch_add(1, Ordering::SeqCst) + 1,
                })
            }
        })?;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let container = container.clone();
        handles.push(tokio::spawn(async move {
            container.resolve::<AnalyticsReporter>().await
        }));
    }

    // Первая сборка уже идёт; заменяем регистрацию до её завершения
    started.notified().await;
    container
        .register::<AnalyticsReporter>()
        .as_weak()
        .with_sync(|_| Ok(AnalyticsReporter { session: 100 }))?;
    gate.add_permits(1);

    let mut reporters = Vec::new();
    for handle in handles {
        reporters.push(handle.await??);
    }

    // Старая фабрика вызвана один раз, все её потребители делят экземпляр
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    let old: Vec<_> = reporters.iter().filter(|r| r.session != 100).collect();
    assert!(!old.is_empty());
    assert!(old.iter().all(|r| r.session == 1 && Arc::ptr_eq(*r, old[0])));

    // Результат старой сборки не попал в кэш новой регистрации
    let fresh = container.resolve::<AnalyticsReporter>().await?;
    assert_eq!(fresh.session, 100);
    assert!(!Arc::ptr_eq(&fresh, old[0]));
    let again = container.resolve::<AnalyticsReporter>().await?;
    assert!(Arc::ptr_eq(&fresh, &again));
    Ok(())
}

#[tokio::test]
async fn test_weak_rejected_for_scalars() -> Result<()> {
    let container = Container::new();

    let result = container.register::<u32>().as_weak().with_sync(|_| Ok(7));
    match result {
        Err(error @ ContainerError::WeakUnsupported { .. }) => {
            assert!(error.to_string().contains("weakly cache"));
            assert!(error.is_user_error());
        }
        Err(other) => panic!("Expected WeakUnsupported, got {other:?}"),
        Ok(_) => panic!("Weak registration of u32 must fail"),
    }

    // Тот же тип как singleton допустим
    container.register::<u32>().as_singleton().with_sync(|_| Ok(7))?;
    assert_eq!(*container.resolve::<u32>().await?, 7);
    Ok(())
}

#[tokio::test]
async fn test_re_registration_evicts_weak_instance() -> Result<()> {
    let container = Container::new();
    let builds = Arc::new(AtomicUsize::new(0));
    counting_reporter(&container, &builds)?;

    let held = container.resolve::<AnalyticsReporter>().await?;

    container
        .register::<AnalyticsReporter>()
        .as_weak()
        .with_sync(|_| Ok(AnalyticsReporter { session: 100 }))?;

    let fresh = container.resolve::<AnalyticsReporter>().await?;
    assert!(!Arc::ptr_eq(&held, &fresh));
    assert_eq!(fresh.session, 100);
    Ok(())
}
