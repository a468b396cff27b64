//! Демонстрационный composition root: небольшой checkout flow,
//! собранный на контейнере со всеми тремя политиками хранения.

use anyhow::Result;
use di::{Container, ContainerResult};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

pub const FORMATTER_NAMES: [&str; 3] = ["usd", "eur", "gbp"];

/// Последовательные идентификаторы котировок
pub struct QuoteSequence {
    next: AtomicU64,
}

impl QuoteSequence {
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }
}

pub struct CurrencyFormatter {
    pub code: &'static str,
    symbol: &'static str,
}

impl CurrencyFormatter {
    pub fn format(&self, amount_cents: u64) -> String {
        format!("{}{}.{:02}", self.symbol, amount_cents / 100, amount_cents % 100)
    }
}

/// Живёт, пока кто-то держит ссылку (weak)
pub struct AnalyticsReporter {
    events: AtomicU64,
}

impl AnalyticsReporter {
    pub fn track(&self, event: &str) {
        let total = self.events.fetch_add(1, Ordering::Relaxed) + 1;
        info!(event, total, "Analytics event tracked");
    }

    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }
}

pub struct CheckoutService {
    sequence: Arc<QuoteSequence>,
    formatter: Arc<CurrencyFormatter>,
    reporter: Arc<AnalyticsReporter>,
}

impl CheckoutService {
    pub fn quote(&self, amount_cents: u64) -> String {
        let quote_id = self.sequence.next_id();
        self.reporter.track("quote_issued");
        info!(quote_id, amount_cents, "Quote issued");
        self.formatter.format(amount_cents)
    }
}

/// Зарегистрировать все сервисы checkout flow
pub fn compose(container: &Container) -> ContainerResult<()> {
    container
        .register::<QuoteSequence>()
        .as_singleton()
        .with_sync(|_| {
            Ok(QuoteSequence {
                next: AtomicU64::new(0),
            })
        })?;

    for (name, symbol) in FORMATTER_NAMES.into_iter().zip(["$", "€", "£"]) {
        container
            .register::<CurrencyFormatter>()
            .named(name)
            .as_singleton()
            .with_sync(move |_| Ok(CurrencyFormatter { code: name, symbol }))?;
    }

    container
        .register::<AnalyticsReporter>()
        .as_weak()
        .with_sync(|_| {
            Ok(AnalyticsReporter {
                events: AtomicU64::new(0),
            })
        })?;

    container.register::<CheckoutService>().with(|resolver| async move {
        Ok(CheckoutService {
            sequence: resolver.resolve::<QuoteSequence>().await?,
            formatter: resolver.resolve_named::<CurrencyFormatter>("usd").await?,
            reporter: resolver.resolve::<AnalyticsReporter>().await?,
        })
    })?;

    container.register_instance(String::from("di-inspect checkout demo"))?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct ExerciseSummary {
    pub quote: String,
    pub batch_currencies: Vec<String>,
    pub all_formatters: usize,
    pub analytics_events: u64,
    pub banner: String,
}

/// Прогнать типичные сценарии разрешения против собранного контейнера
pub async fn exercise(container: &Container) -> Result<ExerciseSummary> {
    let checkout = container.resolve::<CheckoutService>().await?;
    let quote = checkout.quote(1250);

    let names = FORMATTER_NAMES.iter().map(|n| Some(n.to_string())).collect();
    let batch = container.resolve_batch::<CurrencyFormatter>(names).await?;
    let batch_currencies = batch.iter().map(|f| f.code.to_string()).collect();

    let all_formatters = container.resolve_all::<CurrencyFormatter>().await.len();

    // Тот же weak экземпляр, пока checkout держит ссылку
    let reporter = container.resolve::<AnalyticsReporter>().await?;
    let analytics_events = reporter.events();
    drop(checkout);
    drop(reporter);

    let banner = container.resolve_sync::<String>()?;

    Ok(ExerciseSummary {
        quote,
        batch_currencies,
        all_formatters,
        analytics_events,
        banner: banner.as_str().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_sequence() {
        let sequence = QuoteSequence {
            next: AtomicU64::new(0),
        };
        assert_eq!(sequence.next_id(), 1);
        assert_eq!(sequence.next_id(), 2);
    }

    #[test]
    fn test_currency_formatter() {
        let formatter = CurrencyFormatter {
            code: "eur",
            symbol: "€",
        };
        assert_eq!(formatter.format(1250), "€12.50");
        assert_eq!(formatter.format(7), "€0.07");
    }
}
