use std::fmt::Debug;

/// Policy for sizing shard files and deciding when one is full
pub trait GrowPolicy: Send + Sync + Debug {
    /// Size of a freshly created shard file
    fn initial_size(&self) -> usize;

    /// Check if a shard with `free` bytes left out of `current_size` needs more room
    fn should_grow(&self, current_size: usize, free: usize) -> bool;

    /// Size to grow to, or None once no further growth is possible
    fn grow(&self, current_size: usize) -> Option<usize>;
}

/// Grows by a constant factor without bound
#[derive(Debug, Clone)]
pub struct ExponentialGrowPolicy {
    pub initial_size: usize,
    pub free_factor: f64,
    pub grow_factor: f64,
}

impl ExponentialGrowPolicy {
    pub fn new(initial_size: usize, free_factor: f64, grow_factor: f64) -> Self {
        ExponentialGrowPolicy {
            initial_size,
            free_factor,
            grow_factor,
        }
    }
}

impl GrowPolicy for ExponentialGrowPolicy {
    fn initial_size(&self) -> usize {
        self.initial_size
    }

    fn should_grow(&self, current_size: usize, free: usize) -> bool {
        if current_size == 0 {
            return true;
        }
        (free as f64 / current_size as f64) < self.free_factor
    }

    fn grow(&self, current_size: usize) -> Option<usize> {
        Some((self.grow_factor * current_size as f64) as usize)
    }
}

/// Exponential growth that stops at `limit`
///
/// With `limit == initial_size` a shard never grows: once it runs low on
/// free space, new nodes go to the next shard.
#[derive(Debug, Clone)]
pub struct CappedGrowPolicy {
    pub inner: ExponentialGrowPolicy,
    pub limit: usize,
}

impl CappedGrowPolicy {
    pub fn new(initial_size: usize, free_factor: f64, grow_factor: f64, limit: usize) -> Self {
        CappedGrowPolicy {
            inner: ExponentialGrowPolicy::new(initial_size, free_factor, grow_factor),
            limit,
        }
    }

    /// A policy for shards of a fixed size that never grow
    pub fn fixed(size: usize, free_factor: f64) -> Self {
        Self::new(size, free_factor, 2.0, size)
    }
}

impl GrowPolicy for CappedGrowPolicy {
    fn initial_size(&self) -> usize {
        self.inner.initial_size()
    }

    fn should_grow(&self, current_size: usize, free: usize) -> bool {
        self.inner.should_grow(current_size, free)
    }

    fn grow(&self, current_size: usize) -> Option<usize> {
        let new_size = self.inner.grow(current_size)?;
        if new_size > self.limit {
            return None;
        }
        Some(new_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_always_reports_a_target() {
        let policy = ExponentialGrowPolicy::new(1024, 0.1, 2.0);
        assert_eq!(policy.initial_size(), 1024);
        assert!(!policy.should_grow(1024, 512));
        assert!(policy.should_grow(1024, 100));
        assert_eq!(policy.grow(1024), Some(2048));
    }

    #[test]
    fn capped_refuses_past_limit() {
        let policy = CappedGrowPolicy::new(1024, 0.1, 2.0, 4096);
        assert_eq!(policy.grow(1024), Some(2048));
        assert_eq!(policy.grow(2048), Some(4096));
        assert_eq!(policy.grow(4096), None);

        let fixed = CappedGrowPolicy::fixed(4096, 0.25);
        assert!(fixed.should_grow(4096, 1000));
        assert_eq!(fixed.grow(4096), None);
    }
}
