//! Basic walkthrough: store context across the tiers and query it back.
//!
//! ```sh
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;

use strata_core::models::{MetaValue, Metadata, RetrievalRequest, RetrievalStrategy, TierHint};
use strata_core::{StrataConfig, SystemClock};
use strata_engine::Orchestrator;

#[tokio::main]
async fn main() -> strata_core::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let orchestrator = Orchestrator::in_memory(StrataConfig::from_env(), Arc::new(SystemClock));

    // A preference routes to long-term automatically.
    let mut preference = Metadata::new();
    preference.insert("type".into(), MetaValue::from("preference"));
    orchestrator
        .store(
            "The user prefers concise answers with code examples.",
            preference,
            Some("demo"),
            TierHint::Auto,
        )
        .await?;

    // Conversation turns land in the immediate ring and the session tier.
    for line in [
        "How do I share state between tokio tasks?",
        "Arc<Mutex<T>> works, but prefer message passing for complex flows.",
        "What about read-heavy workloads?",
        "Use Arc<RwLock<T>> so readers proceed in parallel.",
    ] {
        orchestrator
            .store(line, Metadata::new(), Some("demo"), TierHint::Auto)
            .await?;
    }

    let response = orchestrator
        .retrieve(
            RetrievalRequest::new("how should state be shared between tasks?")
                .with_conversation("demo")
                .with_strategy(RetrievalStrategy::Hybrid)
                .with_max_results(5),
        )
        .await?;

    println!(
        "retrieved {} items ({} tokens, degraded: {})",
        response.items.len(),
        response.total_tokens(),
        response.degraded
    );
    for scored in &response.items {
        println!(
            "  [{:.3}] ({}) {}",
            scored.score, scored.source_tier, scored.item.content
        );
    }

    let stats = orchestrator.stats().await;
    println!(
        "stores: {}, retrievals: {}, cache hit rate: {:.2}",
        stats.total_stores,
        stats.total_retrievals,
        stats.cache_hit_rate()
    );

    Ok(())
}
