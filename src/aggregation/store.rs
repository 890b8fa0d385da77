use std::collections::HashMap;
use std::sync::Mutex;
use dashmap::DashMap;
use crate::models::{AggregateResult, CategoryAggregate, GlobalAggregate};

// ============================================================================
// Aggregate Store
// ============================================================================
//
// Owns every running aggregate in the process.
//
// - Per-product values live in a sharded DashMap. An update holds the shard
//   write lock for the one entry it replaces, so updates to the same product
//   serialise while products on other shards proceed in parallel.
// - The global rollup sits behind its own mutex and is updated as a separate
//   atomic step with the same price. A reader can see one side updated before
//   the other; each side on its own is never torn.
//
// Values are volatile and start empty on every process start.
//
// ============================================================================

#[derive(Default)]
pub struct AggregateStore {
    categories: DashMap<String, CategoryAggregate>,
    global: Mutex<Option<GlobalAggregate>>,
}

impl AggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one price into its product and into the global rollup.
    ///
    /// Callers must have validated `price > 0`.
    pub fn apply(&self, product: &str, price: f64) -> AggregateResult {
        let category = *self
            .categories
            .entry(product.to_string())
            .and_modify(|agg| *agg = agg.with(price))
            .or_insert_with(|| CategoryAggregate::first(price));

        let global = {
            let mut guard = self
                .global
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let next = match guard.as_ref() {
                Some(current) => current.with(price),
                None => CategoryAggregate::first(price),
            };
            *guard = Some(next);
            next
        };

        AggregateResult { category, global }
    }

    /// Point-in-time copy of every category. Each entry is copied under its
    /// shard read lock, so no entry is ever half-updated.
    pub fn snapshot(&self) -> HashMap<String, CategoryAggregate> {
        self.categories
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    #[cfg(test)]
    pub fn category(&self, product: &str) -> Option<CategoryAggregate> {
        self.categories.get(product).map(|entry| *entry.value())
    }

    /// `None` until the first apply.
    pub fn global(&self) -> Option<GlobalAggregate> {
        *self
            .global
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
