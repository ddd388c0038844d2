use rustc_hash::FxHashMap;

/// Pool → shard assignment. Filled once at startup and read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct ShardMap {
    shard_count: u16,
    assignments: FxHashMap<String, u16>,
}

impl ShardMap {
    pub fn new(shard_count: u16, assignments: impl IntoIterator<Item = (String, u16)>) -> Self {
        let shard_count = shard_count.max(1);
        let assignments = assignments
            .into_iter()
            .filter(|(_, shard)| *shard < shard_count)
            .collect();
        Self {
            shard_count,
            assignments,
        }
    }

    pub fn shard_count(&self) -> u16 {
        self.shard_count
    }

    pub fn shard_for(&self, pool: &str) -> Option<u16> {
        self.assignments.get(pool).copied()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Assigns every unknown pool to the currently least-loaded shard (lowest
    /// index on ties) and returns only the new assignments.
    pub fn assign_missing<'a>(
        &mut self,
        pools: impl IntoIterator<Item = &'a str>,
    ) -> Vec<(String, u16)> {
        let mut load = vec![0usize; self.shard_count as usize];
        for shard in self.assignments.values() {
            load[*shard as usize] += 1;
        }

        let mut added = Vec::new();
        for pool in pools {
            if self.assignments.contains_key(pool) {
                continue;
            }
            let shard = load
                .iter()
                .enumerate()
                .min_by_key(|(idx, count)| (**count, *idx))
                .map(|(idx, _)| idx as u16)
                .unwrap_or(0);
            load[shard as usize] += 1;
            self.assignments.insert(pool.to_string(), shard);
            added.push((pool.to_string(), shard));
        }
        added
    }

    pub fn table_name(shard: u16) -> String {
        format!("kline_bucket_{shard:02}")
    }
}
