use std::time::SystemTime;
use crate::index::index::IndexStats;
use crate::search::cache::CacheStats;

/// Store statistics for monitoring
#[derive(Debug, Clone)]
pub struct StoreStats {
    // General info
    pub uptime_secs: u64,
    pub start_time: SystemTime,

    // Storage
    pub index: IndexStats,
    pub index_size_bytes: u64,

    // Workload since open
    pub inserts: u64,
    pub searches: u64,
    pub queries_per_second: f64,
    pub cache_stats: Option<CacheStats>,
}

impl StoreStats {
    /// Nodes reachable in both tries
    pub fn live_nodes(&self) -> u64 {
        self.index.forward.live_nodes() + self.index.reverse.live_nodes()
    }

    pub fn part_count(&self) -> usize {
        self.index.forward.parts.len() + self.index.reverse.parts.len()
    }
}
