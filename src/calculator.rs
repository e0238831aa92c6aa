//! Bill-of-materials resolution
//!
//! Walks the recipe tiers top-down. Each tier's accumulated demand becomes
//! the request for the next tier, corrected by the recipe yield so that a
//! demand of `q` units of an item yielding `y` per cycle costs `q / y`
//! production cycles.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::db::CostDatabase;
use crate::models::RequestVector;

/// Deepest tier chain followed before giving up
const MAX_DEPTH: usize = 20;

#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("Unknown item: {0}")]
    UnknownItem(String),

    #[error("Maximum recursion depth exceeded - possible cycle in recipe chain")]
    DepthExceeded,
}

/// Demand and production time of one tier
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierTotals {
    pub demand: BTreeMap<String, f64>,
    pub time_seconds: f64,
}

/// Totals at every visited tier, top tier first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateResult {
    pub tiers: Vec<TierTotals>,
    /// Terminal items (no further recipe) summed over all tiers
    pub raw: BTreeMap<String, f64>,
}

impl AggregateResult {
    pub fn total_time(&self) -> f64 {
        self.tiers.iter().map(|t| t.time_seconds).sum()
    }

    /// Cumulative quantity of an identity over all tiers
    #[cfg(test)]
    pub fn quantity(&self, id: &str) -> Option<f64> {
        let mut found = None;
        for tier in &self.tiers {
            if let Some(q) = tier.demand.get(id) {
                *found.get_or_insert(0.0) += q;
            }
        }
        found
    }

    pub fn tier(&self, index: usize) -> Option<&TierTotals> {
        self.tiers.get(index)
    }
}

/// Resolve a request down to terminal materials.
///
/// Every requested identity must have a recipe. Below the top tier, an
/// identity without a recipe is terminal when some recipe uses it as an
/// ingredient; otherwise the database doesn't know it and resolution fails.
pub fn resolve(db: &CostDatabase, request: &RequestVector) -> Result<AggregateResult, ResolveError> {
    let referenced = db.referenced_ingredients();
    let mut result = AggregateResult::default();
    let mut demand: BTreeMap<String, f64> = request.clone();

    while !demand.is_empty() {
        if result.tiers.len() >= MAX_DEPTH {
            return Err(ResolveError::DepthExceeded);
        }

        let mut next: BTreeMap<String, f64> = BTreeMap::new();
        let mut time_seconds = 0.0;

        let top_tier = result.tiers.is_empty();
        for (id, &quantity) in &demand {
            let record = match db.get(id) {
                Some(record) => record,
                None if !top_tier && referenced.contains(id.as_str()) => {
                    *result.raw.entry(id.clone()).or_default() += quantity;
                    continue;
                }
                None => return Err(ResolveError::UnknownItem(id.clone())),
            };

            let cycles = quantity / record.yield_quantity;
            time_seconds += cycles * record.build_time;

            if record.ingredients.is_empty() {
                *result.raw.entry(id.clone()).or_default() += quantity;
            }
            for (child, amount) in &record.ingredients {
                *next.entry(child.clone()).or_default() += cycles * amount;
            }
        }

        result.tiers.push(TierTotals {
            demand,
            time_seconds,
        });
        demand = next;
    }

    Ok(result)
}

/// Identities that were expanded through a recipe at tier `from_tier` or below
pub fn intermediate_items(result: &AggregateResult, from_tier: usize) -> BTreeMap<String, f64> {
    let terminals: BTreeSet<&str> = result.raw.keys().map(String::as_str).collect();
    let mut items = BTreeMap::new();
    for tier in result.tiers.iter().skip(from_tier) {
        for (id, quantity) in &tier.demand {
            if !terminals.contains(id.as_str()) {
                *items.entry(id.clone()).or_default() += quantity;
            }
        }
    }
    items
}
