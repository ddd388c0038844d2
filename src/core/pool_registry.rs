use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;

use crate::types::PoolConfig;

/// Read side of the pool configuration table.
pub trait PoolLookup {
    /// Resolves a pool by its own address or by either of its vault addresses.
    fn lookup_pool_by_address(&self, address: &str) -> Option<&PoolConfig>;
}

/// Immutable view of every known pool, indexed by pool and vault address.
#[derive(Debug, Default)]
pub struct PoolSnapshot {
    pools: Vec<PoolConfig>,
    by_address: FxHashMap<String, usize>,
}

impl PoolSnapshot {
    pub fn new(pools: Vec<PoolConfig>) -> Self {
        let mut by_address = FxHashMap::default();
        for (idx, pool) in pools.iter().enumerate() {
            by_address.insert(pool.address.clone(), idx);
            by_address.entry(pool.token_a_vault.clone()).or_insert(idx);
            by_address.entry(pool.token_b_vault.clone()).or_insert(idx);
        }
        Self { pools, by_address }
    }

    pub fn pools(&self) -> &[PoolConfig] {
        &self.pools
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl PoolLookup for PoolSnapshot {
    fn lookup_pool_by_address(&self, address: &str) -> Option<&PoolConfig> {
        self.by_address
            .get(address)
            .and_then(|idx| self.pools.get(*idx))
    }
}

/// Shared handle whose snapshot is swapped wholesale by the refresher.
/// Readers clone the `Arc` and never observe a half-updated table.
#[derive(Clone, Debug, Default)]
pub struct PoolRegistry {
    current: Arc<RwLock<Arc<PoolSnapshot>>>,
}

impl PoolRegistry {
    pub fn new(pools: Vec<PoolConfig>) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(PoolSnapshot::new(pools)))),
        }
    }

    pub fn snapshot(&self) -> Arc<PoolSnapshot> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    pub fn replace(&self, pools: Vec<PoolConfig>) {
        let next = Arc::new(PoolSnapshot::new(pools));
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProtocolVersion;

    fn pool(address: &str) -> PoolConfig {
        PoolConfig {
            address: address.to_string(),
            version: ProtocolVersion::V1,
            token_a_mint: format!("{address}-mint-a"),
            token_b_mint: format!("{address}-mint-b"),
            token_a_vault: format!("{address}-vault-a"),
            token_b_vault: format!("{address}-vault-b"),
            token_a_decimals: 9,
            token_b_decimals: 6,
            fee_rate: 3000,
        }
    }

    #[test]
    fn resolves_by_pool_and_vault() {
        let snapshot = PoolSnapshot::new(vec![pool("p1"), pool("p2")]);
        assert_eq!(
            snapshot.lookup_pool_by_address("p2").map(|p| p.address.as_str()),
            Some("p2")
        );
        assert_eq!(
            snapshot
                .lookup_pool_by_address("p1-vault-b")
                .map(|p| p.address.as_str()),
            Some("p1")
        );
        assert!(snapshot.lookup_pool_by_address("unknown").is_none());
    }

    #[test]
    fn old_snapshot_survives_replace() {
        let registry = PoolRegistry::new(vec![pool("p1")]);
        let before = registry.snapshot();
        registry.replace(vec![pool("p2")]);

        assert!(before.lookup_pool_by_address("p1").is_some());
        let after = registry.snapshot();
        assert!(after.lookup_pool_by_address("p1").is_none());
        assert!(after.lookup_pool_by_address("p2").is_some());
    }
}
