use std::path::PathBuf;
use std::sync::Arc;
use crate::storage::grow_policy::{CappedGrowPolicy, ExponentialGrowPolicy, GrowPolicy};

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_path: PathBuf,

    // Shard sizing, see GrowPolicy
    pub shard_initial_size: usize,
    pub shard_free_factor: f64,
    pub shard_grow_factor: f64,
    pub shard_size_limit: Option<usize>,    // None = uncapped exponential policy

    // Search
    pub max_edits: usize,                   // Largest accepted edit budget
    pub query_cache_size: usize,            // 0 disables the store's result cache
    pub parallel_search: bool,              // Run split plans on the rayon pool
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data"),

            shard_initial_size: 256 * 1024 * 1024,     // 256MB per shard
            shard_free_factor: 0.05,                   // Exhausted below 5% free
            shard_grow_factor: 2.0,
            shard_size_limit: Some(256 * 1024 * 1024), // Never grow in place

            max_edits: 4,
            query_cache_size: 1024,
            parallel_search: true,
        }
    }
}

impl Config {
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Config {
            storage_path: path.into(),
            ..Config::default()
        }
    }

    pub fn grow_policy(&self) -> Arc<dyn GrowPolicy> {
        match self.shard_size_limit {
            Some(limit) => Arc::new(CappedGrowPolicy::new(
                self.shard_initial_size,
                self.shard_free_factor,
                self.shard_grow_factor,
                limit,
            )),
            None => Arc::new(ExponentialGrowPolicy::new(
                self.shard_initial_size,
                self.shard_free_factor,
                self.shard_grow_factor,
            )),
        }
    }
}
