//! Usage ledger: append metered operations and summarize history.

use chrono::{Duration, Utc};
use eyre::Result;

use crate::domain::{ModelTier, UsageEvent};
use crate::storage::Store;

/// Record a usage event, deriving cost from the tier's pricing.
///
/// Returns the inserted record id.
pub fn record_usage(
    store: &Store,
    tier: ModelTier,
    input_tokens: u32,
    output_tokens: u32,
    task_id: Option<i64>,
    autonomous: bool,
) -> Result<i64> {
    let event = UsageEvent {
        id: 0,
        timestamp: Utc::now(),
        tier,
        input_tokens,
        output_tokens,
        cost_usd: tier.cost_usd(input_tokens, output_tokens),
        task_id,
        autonomous,
    };
    store.insert_usage(&event)
}

/// Aggregate usage over a trailing period.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSummary {
    pub total_cost: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub request_count: usize,
    pub autonomous_cost: f64,
}

/// Summarize the last `hours` hours of ledger entries.
pub fn usage_summary(store: &Store, hours: i64) -> Result<UsageSummary> {
    let since = Utc::now() - Duration::hours(hours);
    let events = store.usage_since(since)?;

    let mut summary = UsageSummary {
        total_cost: 0.0,
        total_input_tokens: 0,
        total_output_tokens: 0,
        request_count: events.len(),
        autonomous_cost: 0.0,
    };

    for event in &events {
        summary.total_cost += event.cost_usd;
        summary.total_input_tokens += event.input_tokens as u64;
        summary.total_output_tokens += event.output_tokens as u64;
        if event.autonomous {
            summary.autonomous_cost += event.cost_usd;
        }
    }

    Ok(summary)
}
