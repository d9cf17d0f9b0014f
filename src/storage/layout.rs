use std::fs;
use std::path::{Path, PathBuf};
use crate::core::error::Result;
use crate::core::types::PartId;

/// Directory structure of one trie
#[derive(Debug, Clone)]
pub struct TrieLayout {
    pub base_dir: PathBuf,      // Shard files 0000, 0001, ... and HEAD
}

impl TrieLayout {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        Ok(TrieLayout { base_dir })
    }

    pub fn part_path(&self, id: PartId) -> PathBuf {
        self.base_dir.join(format!("{:04}", id.0))
    }

    pub fn head_path(&self) -> PathBuf {
        self.base_dir.join("HEAD")
    }

    /// All shard ids present on disk, sorted
    pub fn find_parts(&self) -> Result<Vec<PartId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.len() >= 4 && name.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(id) = name.parse::<u32>() {
                    ids.push(PartId(id));
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Directory structure of a store: format tag, info record, lock and the two tries
#[derive(Debug, Clone)]
pub struct StoreLayout {
    pub base_dir: PathBuf,
    pub index_dir: PathBuf,     // Holds the fwd/ and rev/ tries
}

impl StoreLayout {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        let base_dir = base_dir.as_ref().to_path_buf();
        let index_dir = base_dir.join("index");
        StoreLayout { base_dir, index_dir }
    }

    pub fn format_path(&self) -> PathBuf {
        self.base_dir.join("format")
    }

    pub fn info_path(&self) -> PathBuf {
        self.base_dir.join("info")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(".lock")
    }
}
