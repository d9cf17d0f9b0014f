use std::fs;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};
use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::StoreStats;
use crate::core::types::Key;
use crate::index::index::Index;
use crate::search::cache::{QueryCache, QueryKey};
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StoreLayout;

/// On-disk layout version written to the `format` file
pub const STORE_FORMAT: u32 = 1;

/// Creation record kept next to the index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreInfo {
    pub format: u32,
    pub created_at: DateTime<Utc>,
    pub shard_initial_size: usize,
}

/// A fuzzy key store at one location on disk
pub struct Store {
    config: Config,
    layout: StoreLayout,
    info: StoreInfo,
    index: RwLock<Index>,
    query_cache: Option<QueryCache>,
    _lock: FileLock,

    // Metrics
    start_time: SystemTime,
    started: Instant,
    insert_count: AtomicU64,
    search_count: AtomicU64,
}

impl Store {
    /// Lay out a new store. An existing store is an error unless
    /// `overwrite` is set, in which case it is wiped first. The lock is held
    /// from before the wipe until the store is open.
    pub fn create(config: Config, overwrite: bool) -> Result<Self> {
        let layout = StoreLayout::new(&config.storage_path);

        let lock = if layout.base_dir.exists() {
            if !overwrite {
                return Err(Error::new(
                    ErrorKind::AlreadyExists,
                    format!("Store already exists at {}", layout.base_dir.display()),
                ));
            }
            let lock = FileLock::acquire(&layout)?;
            wipe_except_lock(&layout)?;
            info!("Removed existing store at {}", layout.base_dir.display());
            lock
        } else {
            fs::create_dir_all(&layout.base_dir)?;
            FileLock::acquire(&layout)?
        };

        fs::create_dir_all(&layout.index_dir)?;
        write_atomic(&layout, &layout.format_path(), STORE_FORMAT.to_string().as_bytes())?;

        let store_info = StoreInfo {
            format: STORE_FORMAT,
            created_at: Utc::now(),
            shard_initial_size: config.shard_initial_size,
        };
        write_atomic(&layout, &layout.info_path(), &serde_json::to_vec_pretty(&store_info)?)?;

        info!("Created store at {}", layout.base_dir.display());
        Self::open_locked(config, layout, lock)
    }

    pub fn open(config: Config) -> Result<Self> {
        let layout = StoreLayout::new(&config.storage_path);

        let format_path = layout.format_path();
        if !format_path.exists() {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("No store at {}", layout.base_dir.display()),
            ));
        }
        let tag = fs::read_to_string(&format_path)?;
        if tag.trim().parse::<u32>().ok() != Some(STORE_FORMAT) {
            return Err(Error::new(
                ErrorKind::InvalidState,
                format!("Unsupported store format {:?}, expected {}", tag.trim(), STORE_FORMAT),
            ));
        }

        let lock = FileLock::acquire(&layout)?;
        Self::open_locked(config, layout, lock)
    }

    fn open_locked(config: Config, layout: StoreLayout, lock: FileLock) -> Result<Self> {
        let store_info: StoreInfo = serde_json::from_slice(&fs::read(layout.info_path())?)?;
        let index = Index::open(&layout.index_dir, &config)?;
        let query_cache = QueryCache::new(config.query_cache_size);

        debug!(
            "Opened store at {} created {}",
            layout.base_dir.display(),
            store_info.created_at.to_rfc3339()
        );

        Ok(Store {
            config,
            layout,
            info: store_info,
            index: RwLock::new(index),
            query_cache,
            _lock: lock,
            start_time: SystemTime::now(),
            started: Instant::now(),
            insert_count: AtomicU64::new(0),
            search_count: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.layout.base_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn info(&self) -> &StoreInfo {
        &self.info
    }

    pub fn insert(&self, key: &[u8]) -> Result<()> {
        let mut index = self.index.write();
        let result = index.insert(key);
        // A failed insert may still have touched the forward trie
        self.clear_cache();
        drop(index);

        result?;
        self.insert_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Insert several keys under one write lock; returns how many were given.
    /// Keys before a failing one stay inserted.
    pub fn insert_batch<I, K>(&self, keys: I) -> Result<usize>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let mut index = self.index.write();
        let mut count = 0;
        let mut result = Ok(());
        for key in keys {
            result = index.insert(key.as_ref());
            if result.is_err() {
                break;
            }
            count += 1;
        }
        self.clear_cache();
        drop(index);

        self.insert_count.fetch_add(count as u64, Ordering::Relaxed);
        result.map(|_| count)
    }

    fn clear_cache(&self) {
        if let Some(cache) = &self.query_cache {
            cache.clear();
        }
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(!self.search_exact(key)?.is_empty())
    }

    pub fn search_exact(&self, key: &[u8]) -> Result<Vec<Key>> {
        self.search_count.fetch_add(1, Ordering::Relaxed);
        self.index.read().search_exact(key)
    }

    pub fn search(&self, key: &[u8], max_edits: usize, transpositions: bool) -> Result<Vec<Key>> {
        self.search_count.fetch_add(1, Ordering::Relaxed);

        let cache_key = QueryKey::new(key, max_edits, transpositions);
        if let Some(cache) = &self.query_cache {
            if let Some(hit) = cache.get(&cache_key) {
                return Ok(hit);
            }
        }

        // Hold the read lock until the result is cached so an insert cannot
        // clear the cache in between
        let index = self.index.read();
        let found = index.search(key, max_edits, transpositions)?;
        if let Some(cache) = &self.query_cache {
            cache.put(cache_key, found.clone());
        }
        Ok(found)
    }

    pub fn flush(&self) -> Result<()> {
        self.index.read().flush()
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let index = self.index.read().stats()?;
        let index_size_bytes = index
            .forward
            .parts
            .iter()
            .chain(&index.reverse.parts)
            .map(|p| p.capacity as u64)
            .sum();

        let elapsed = self.started.elapsed().as_secs_f64();
        let searches = self.search_count.load(Ordering::Relaxed);

        Ok(StoreStats {
            uptime_secs: elapsed as u64,
            start_time: self.start_time,
            index,
            index_size_bytes,
            inserts: self.insert_count.load(Ordering::Relaxed),
            searches,
            queries_per_second: if elapsed > 0.0 { searches as f64 / elapsed } else { 0.0 },
            cache_stats: self.query_cache.as_ref().map(|c| c.stats()),
        })
    }
}

/// Remove everything under the store directory except the lock file
fn wipe_except_lock(layout: &StoreLayout) -> Result<()> {
    let lock_path = layout.lock_path();
    for entry in fs::read_dir(&layout.base_dir)? {
        let path = entry?.path();
        if path == lock_path {
            continue;
        }
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn write_atomic(layout: &StoreLayout, path: &std::path::Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(&layout.base_dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn small_config(path: std::path::PathBuf) -> Config {
        Config {
            shard_initial_size: 1024 * 1024,
            shard_size_limit: Some(1024 * 1024),
            ..Config::with_path(path)
        }
    }

    #[test]
    fn create_refuses_existing_store() {
        let dir = tempdir().unwrap();
        let config = small_config(dir.path().join("store"));
        drop(Store::create(config.clone(), false).unwrap());

        let err = Store::create(config.clone(), false).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let store = Store::create(config, true).unwrap();
        assert_eq!(store.info().format, STORE_FORMAT);
    }

    #[test]
    fn open_checks_format_tag() {
        let dir = tempdir().unwrap();
        let config = small_config(dir.path().join("store"));

        let err = Store::open(config.clone()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        drop(Store::create(config.clone(), false).unwrap());
        fs::write(dir.path().join("store").join("format"), "99").unwrap();
        let err = Store::open(config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let config = small_config(dir.path().join("store"));
        let _store = Store::create(config.clone(), false).unwrap();

        let err = Store::open(config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Locked);
    }

    #[test]
    fn insert_invalidates_cached_results() {
        let dir = tempdir().unwrap();
        let store = Store::create(small_config(dir.path().join("store")), false).unwrap();
        store.insert(b"cat").unwrap();
        assert_eq!(store.search(b"cas", 1, false).unwrap(), vec![b"cat".to_vec()]);

        store.insert(b"cash").unwrap();
        assert_eq!(
            store.search(b"cas", 1, false).unwrap(),
            vec![b"cash".to_vec(), b"cat".to_vec()]
        );
        let cache = store.stats().unwrap().cache_stats.unwrap();
        assert_eq!(cache.hit_count, 0);
        assert_eq!(cache.miss_count, 2);
    }

    #[test]
    fn failed_batch_still_invalidates_cached_results() {
        let dir = tempdir().unwrap();
        let store = Store::create(small_config(dir.path().join("store")), false).unwrap();
        store.insert(b"cat").unwrap();
        assert_eq!(store.search(b"cas", 1, false).unwrap(), vec![b"cat".to_vec()]);

        let batch: [&[u8]; 2] = [b"cash", b"x\xFF"];
        let err = store.insert_batch(batch).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(store.contains(b"cash").unwrap());
        assert_eq!(
            store.search(b"cas", 1, false).unwrap(),
            vec![b"cash".to_vec(), b"cat".to_vec()]
        );
        assert_eq!(store.stats().unwrap().inserts, 2);
    }

    #[test]
    fn failed_insert_still_invalidates_cached_results() {
        let dir = tempdir().unwrap();
        let store = Store::create(small_config(dir.path().join("store")), false).unwrap();
        store.insert(b"dog").unwrap();
        assert_eq!(store.search(b"dot", 1, false).unwrap(), vec![b"dog".to_vec()]);

        assert!(store.insert(b"do\xFFt").is_err());
        store.search(b"dot", 1, false).unwrap();
        let cache = store.stats().unwrap().cache_stats.unwrap();
        assert_eq!(cache.hit_count, 0);
    }

    #[test]
    fn cached_searches_stay_fresh_under_concurrent_inserts() {
        let dir = tempdir().unwrap();
        let store = Store::create(small_config(dir.path().join("store")), false).unwrap();
        let words: Vec<String> = (0..150).map(|i| format!("ca{}", i)).collect();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for word in &words {
                    store.insert(word.as_bytes()).unwrap();
                }
            });
            for _ in 0..2 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        store.search(b"ca1", 1, false).unwrap();
                    }
                });
            }
        });

        let mut expected: Vec<Vec<u8>> = words
            .iter()
            .map(|w| w.as_bytes().to_vec())
            .filter(|w| crate::search::distance::edit_distance(b"ca1", w, false) <= 1)
            .collect();
        expected.sort();
        assert_eq!(store.search(b"ca1", 1, false).unwrap(), expected);
    }

    #[test]
    fn overwrite_wipes_old_keys_and_keeps_the_lock() {
        let dir = tempdir().unwrap();
        let config = small_config(dir.path().join("store"));
        {
            let store = Store::create(config.clone(), false).unwrap();
            store.insert(b"old").unwrap();
        }

        let store = Store::create(config.clone(), true).unwrap();
        assert!(!store.contains(b"old").unwrap());
        assert!(dir.path().join("store").join(".lock").exists());

        let err = Store::open(config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Locked);
    }
}
