//! In-memory caches owned and injected explicitly by the host process.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::domain::deal::{CustomerId, HistoricalDeal};

/// TTL cache over a customer's historical deal list.
///
/// Invalidation contract: the host MUST call [`DealCache::invalidate`]
/// immediately after any write to that customer's deal collection; the TTL
/// only bounds staleness for reads that race no write.
pub struct DealCache {
    ttl: Duration,
    entries: Mutex<HashMap<CustomerId, (Instant, Vec<HistoricalDeal>)>>,
}

impl DealCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    pub fn get(&self, customer: &CustomerId) -> Option<Vec<HistoricalDeal>> {
        let entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries
            .get(customer)
            .filter(|(inserted, _)| inserted.elapsed() < self.ttl)
            .map(|(_, deals)| deals.clone())
    }

    pub fn put(&self, customer: CustomerId, deals: Vec<HistoricalDeal>) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(customer, (Instant::now(), deals));
    }

    pub fn invalidate(&self, customer: &CustomerId) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.remove(customer);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;

    use super::DealCache;
    use crate::domain::deal::{
        CustomerId, DealContext, DealInput, DealOutcome, HistoricalDeal,
    };
    use crate::domain::margin::FractionMargin;

    fn deals() -> Vec<HistoricalDeal> {
        vec![HistoricalDeal {
            context: DealContext::from_input(DealInput {
                oem_cost: Decimal::new(10_000_00, 2),
                ..DealInput::default()
            }),
            achieved_margin: FractionMargin(0.15),
            outcome: DealOutcome::Won,
            loss_reason: None,
            close_date: None,
        }]
    }

    #[test]
    fn fresh_entries_are_served() {
        let cache = DealCache::new(Duration::from_secs(60));
        let customer = CustomerId("cust-1".to_owned());

        cache.put(customer.clone(), deals());
        assert_eq!(cache.get(&customer).map(|deals| deals.len()), Some(1));
    }

    #[test]
    fn invalidation_removes_the_entry_at_once() {
        let cache = DealCache::new(Duration::from_secs(60));
        let customer = CustomerId("cust-1".to_owned());

        cache.put(customer.clone(), deals());
        cache.invalidate(&customer);
        assert!(cache.get(&customer).is_none());
    }

    #[test]
    fn expired_entries_read_as_misses() {
        let cache = DealCache::new(Duration::ZERO);
        let customer = CustomerId("cust-1".to_owned());

        cache.put(customer.clone(), deals());
        assert!(cache.get(&customer).is_none());
    }
}
