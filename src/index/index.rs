use std::collections::BTreeSet;
use std::path::Path;
use log::{debug, warn};
use rayon::prelude::*;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{EditBudget, Key, reversed, validate_key};
use crate::search::distance::within_distance;
use crate::trie::trie::{Trie, TrieStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// One split search to run against either trie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPlan {
    pub direction: Direction,
    /// Query as seen by the trie, already reversed for `Reverse`
    pub query: Key,
    pub switch_len: usize,
    pub head: EditBudget,
    pub tail: EditBudget,
}

#[derive(Debug, Clone)]
pub struct IndexStats {
    pub forward: TrieStats,
    pub reverse: TrieStats,
}

/// Pair of tries over the same key set, one storing every key reversed
pub struct Index {
    forward: Trie,
    reverse: Trie,
    max_edits: usize,
    parallel: bool,
}

impl Index {
    pub fn open<P: AsRef<Path>>(dir: P, config: &Config) -> Result<Self> {
        let dir = dir.as_ref();
        let policy = config.grow_policy();
        Ok(Index {
            forward: Trie::open(dir.join("fwd"), policy.clone())?,
            reverse: Trie::open(dir.join("rev"), policy)?,
            max_edits: config.max_edits,
            parallel: config.parallel_search,
        })
    }

    pub fn forward(&self) -> &Trie {
        &self.forward
    }

    pub fn reverse(&self) -> &Trie {
        &self.reverse
    }

    /// Add `key` to both tries.
    ///
    /// The forward trie is written first. If the reverse insert then fails
    /// the key stays in the forward trie only: exact lookups find it, while
    /// split searches that go through the reverse trie may miss it until the
    /// insert is retried.
    pub fn insert(&mut self, key: &[u8]) -> Result<()> {
        validate_key(key)?;
        self.forward.insert(key)?;
        self.reverse.insert(&reversed(key)).inspect_err(|e| {
            warn!(
                "Key {:?} reached the forward trie but not the reverse one: {}",
                String::from_utf8_lossy(key),
                e
            );
        })
    }

    pub fn search_exact(&self, key: &[u8]) -> Result<Vec<Key>> {
        self.forward.search_exact(key)
    }

    /// Sorted, duplicate free list of keys within `max_edits` of `key`
    pub fn search(&self, key: &[u8], max_edits: usize, transpositions: bool) -> Result<Vec<Key>> {
        validate_key(key)?;
        if max_edits == 0 {
            return self.search_exact(key);
        }
        if max_edits > self.max_edits {
            return Err(Error::new(
                ErrorKind::UnsupportedQuery,
                format!("Edit budget {} exceeds the configured maximum {}", max_edits, self.max_edits),
            ));
        }

        if key.len() < 2 {
            return self.forward.search(key, EditBudget::within(max_edits), transpositions);
        }

        let plans = split_plans(key, max_edits, transpositions);
        debug!("Running {} split plans for a {} byte key", plans.len(), key.len());

        let candidates: Vec<Vec<Key>> = if self.parallel {
            plans
                .par_iter()
                .map(|plan| self.run_plan(plan, transpositions))
                .collect::<Result<Vec<_>>>()?
        } else {
            plans
                .iter()
                .map(|plan| self.run_plan(plan, transpositions))
                .collect::<Result<Vec<_>>>()?
        };

        // Plans over-approximate; keep only true matches
        let found: BTreeSet<Key> = candidates
            .into_iter()
            .flatten()
            .filter(|word| within_distance(key, word, max_edits, transpositions))
            .collect();
        Ok(found.into_iter().collect())
    }

    fn run_plan(&self, plan: &SplitPlan, transpositions: bool) -> Result<Vec<Key>> {
        match plan.direction {
            Direction::Forward => {
                self.forward
                    .search_split(&plan.query, plan.switch_len, plan.head, plan.tail, transpositions)
            }
            Direction::Reverse => {
                let found = self
                    .reverse
                    .search_split(&plan.query, plan.switch_len, plan.head, plan.tail, transpositions)?;
                Ok(found.into_iter().map(|word| reversed(&word)).collect())
            }
        }
    }

    pub fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            forward: self.forward.stats()?,
            reverse: self.reverse.stats()?,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.forward.flush()?;
        self.reverse.flush()
    }
}

/// Split searches whose union holds every key within `k` edits of `key`.
///
/// The key is cut at `s = n / 2` into `A` and `B`. A match `W` can be cut
/// into `W1`, `W2` with `d(A, W1) + d(B, W2) <= k`, so one side took at most
/// half the edits: either `d(A, W1) = k1 <= k / 2` (forward trie, head `A`)
/// or `d(B, W2) = k2 < (k + 1) / 2` (reverse trie, head `rev(B)`). A
/// transposition straddling the cut is covered by the same enumeration on
/// the key with the two middle bytes swapped and one edit less.
pub fn split_plans(key: &[u8], k: usize, transpositions: bool) -> Vec<SplitPlan> {
    let mut plans = Vec::new();
    push_plans(&mut plans, key, k);

    let s = key.len() / 2;
    if transpositions && k >= 1 && s >= 1 && key[s - 1] != key[s] {
        let mut swapped = key.to_vec();
        swapped.swap(s - 1, s);
        push_plans(&mut plans, &swapped, k - 1);
    }
    plans
}

fn push_plans(plans: &mut Vec<SplitPlan>, key: &[u8], k: usize) {
    let n = key.len();
    let s = n / 2;
    let back = reversed(key);

    for k1 in 0..=k / 2 {
        plans.push(SplitPlan {
            direction: Direction::Forward,
            query: key.to_vec(),
            switch_len: s,
            head: EditBudget::exactly(k1),
            tail: EditBudget::within(k - k1),
        });
    }
    for k2 in 0..(k + 1) / 2 {
        plans.push(SplitPlan {
            direction: Direction::Reverse,
            query: back.clone(),
            switch_len: n - s,
            head: EditBudget::exactly(k2),
            tail: EditBudget::within(k - k2),
        });
    }
}
