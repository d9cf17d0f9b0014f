//! Fuzzy traversal of a [`Trie`].
//!
//! Both walks are depth first. Every branch gets its own clone of the
//! automaton context and is abandoned as soon as the context stops being
//! viable, so only the neighbourhood of the query is ever resolved.

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{EditBudget, Key, PartId, TERMINATOR, strip_terminator, validate_key, with_terminator};
use crate::search::fuzzy::{Context, FuzzyProcessor};
use crate::trie::node::{Child, NodeLoc};
use crate::trie::trie::Trie;

/// Matcher for the tail of a key, and the budget its matches must satisfy
struct TailMatch {
    processor: FuzzyProcessor,
    budget: EditBudget,
}

/// Two-phase search state: the head is matched without the terminator,
/// the tail starts wherever the head reaches an accepted final state
struct SplitMatch {
    head: FuzzyProcessor,
    head_budget: EditBudget,
    tail: TailMatch,
}

impl SplitMatch {
    fn head_accepts(&self, ctx: &Context) -> bool {
        self.head
            .distance(ctx)
            .is_some_and(|d| self.head_budget.accepts(d))
    }
}

impl Trie {
    /// Every stored key whose distance to `key` satisfies `budget`
    pub fn search(&self, key: &[u8], budget: EditBudget, transpositions: bool) -> Result<Vec<Key>> {
        validate_key(key)?;
        if budget.max_edits == 0 {
            return self.search_exact(key);
        }

        let tail = TailMatch {
            processor: FuzzyProcessor::new(&with_terminator(key), budget.max_edits, transpositions)?,
            budget,
        };
        let mut scratch = Vec::new();
        let mut results = Vec::new();
        let ctx = tail.processor.context();
        self.walk_node(self.head(), &tail, &ctx, &mut scratch, &mut results)?;

        results.sort();
        results.dedup();
        Ok(results)
    }

    /// Match `key[..switch_len]` against word prefixes with the `head`
    /// budget and the remainder against the rest of the word with the
    /// `tail` budget
    pub fn search_split(
        &self,
        key: &[u8],
        switch_len: usize,
        head: EditBudget,
        tail: EditBudget,
        transpositions: bool,
    ) -> Result<Vec<Key>> {
        validate_key(key)?;
        if switch_len > key.len() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Switch position {} is past the end of a {} byte key", switch_len, key.len()),
            ));
        }

        if head.max_edits == 0 && tail.max_edits == 0 {
            return self.search_exact(key);
        }
        if switch_len == 0 {
            if head.max_edits == 0 {
                return self.search(key, tail, transpositions);
            }
            return Err(Error::new(
                ErrorKind::UnsupportedQuery,
                "An empty head cannot carry an edit budget".to_string(),
            ));
        }

        let (front, back) = key.split_at(switch_len);
        let split = SplitMatch {
            head: FuzzyProcessor::new(front, head.max_edits, transpositions)?,
            head_budget: head,
            tail: TailMatch {
                processor: FuzzyProcessor::new(&with_terminator(back), tail.max_edits, transpositions)?,
                budget: tail,
            },
        };

        let mut scratch = Vec::new();
        let mut results = Vec::new();
        let root = self.head();
        let ctx = split.head.context();
        if split.head_accepts(&ctx) {
            let tail_ctx = split.tail.processor.context();
            self.walk_node(root, &split.tail, &tail_ctx, &mut scratch, &mut results)?;
        }
        self.split_node(root, &split, &ctx, &mut scratch, &mut results)?;

        results.sort();
        results.dedup();
        Ok(results)
    }

    fn walk_node(
        &self,
        loc: NodeLoc,
        tail: &TailMatch,
        ctx: &Context,
        scratch: &mut Vec<u8>,
        results: &mut Vec<Key>,
    ) -> Result<()> {
        let node = self.resolve(loc)?;
        for child in &node.children {
            self.walk_edge(loc.part, child, 0, tail, ctx.clone(), scratch, results)?;
        }
        Ok(())
    }

    /// Feed `child.label[from..]`, then either report the word or descend
    #[allow(clippy::too_many_arguments)]
    fn walk_edge(
        &self,
        owner: PartId,
        child: &Child,
        from: usize,
        tail: &TailMatch,
        mut ctx: Context,
        scratch: &mut Vec<u8>,
        results: &mut Vec<Key>,
    ) -> Result<()> {
        let mark = scratch.len();
        let mut viable = true;
        for &c in &child.label[from..] {
            tail.processor.feed(&mut ctx, c);
            scratch.push(c);
            if !tail.processor.is_viable(&ctx) {
                viable = false;
                break;
            }
        }

        if viable {
            match child.target {
                Some(target) => self.walk_node(target.resolve(owner), tail, &ctx, scratch, results)?,
                None if tail.processor.is_final(&ctx) => {
                    if let Some(d) = tail.processor.distance(&ctx) {
                        if tail.budget.accepts(d) {
                            results.push(strip_terminator(scratch).to_vec());
                        }
                    }
                }
                None => {}
            }
        }

        scratch.truncate(mark);
        Ok(())
    }

    fn split_node(
        &self,
        loc: NodeLoc,
        split: &SplitMatch,
        ctx: &Context,
        scratch: &mut Vec<u8>,
        results: &mut Vec<Key>,
    ) -> Result<()> {
        let node = self.resolve(loc)?;
        for child in &node.children {
            self.split_edge(loc.part, child, split, ctx.clone(), scratch, results)?;
        }
        Ok(())
    }

    /// Head phase along one edge. The tail phase may begin after any byte,
    /// including in the middle of the label.
    fn split_edge(
        &self,
        owner: PartId,
        child: &Child,
        split: &SplitMatch,
        mut ctx: Context,
        scratch: &mut Vec<u8>,
        results: &mut Vec<Key>,
    ) -> Result<()> {
        let mark = scratch.len();
        let mut descend = true;

        for (i, &c) in child.label.iter().enumerate() {
            if c == TERMINATOR {
                descend = false;
                break;
            }
            split.head.feed(&mut ctx, c);
            scratch.push(c);
            if !split.head.is_viable(&ctx) {
                descend = false;
                break;
            }
            if split.head_accepts(&ctx) {
                let tail_ctx = split.tail.processor.context();
                self.walk_edge(owner, child, i + 1, &split.tail, tail_ctx, scratch, results)?;
            }
        }

        if descend {
            if let Some(target) = child.target {
                self.split_node(target.resolve(owner), split, &ctx, scratch, results)?;
            }
        }

        scratch.truncate(mark);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::core::types::EditBudget;
    use crate::search::distance::edit_distance;
    use crate::storage::grow_policy::CappedGrowPolicy;
    use crate::trie::trie::Trie;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn trie_with(words: &[&str]) -> (tempfile::TempDir, Trie) {
        let dir = tempdir().unwrap();
        let mut trie = Trie::open(dir.path(), Arc::new(CappedGrowPolicy::fixed(1024 * 1024, 0.05))).unwrap();
        for word in words {
            trie.insert(word.as_bytes()).unwrap();
        }
        (dir, trie)
    }

    fn strings(keys: Vec<Vec<u8>>) -> Vec<String> {
        keys.into_iter().map(|k| String::from_utf8(k).unwrap()).collect()
    }

    #[test]
    fn fuzzy_search_finds_neighbours() {
        let (_dir, trie) = trie_with(&["cat", "car", "cart", "dog"]);
        let found = trie.search(b"cat", EditBudget::within(1), false).unwrap();
        assert_eq!(strings(found), vec!["car", "cart", "cat"]);

        let found = trie.search(b"cat", EditBudget::exactly(1), false).unwrap();
        assert_eq!(strings(found), vec!["car", "cart"]);

        let found = trie.search(b"dgo", EditBudget::within(1), true).unwrap();
        assert_eq!(strings(found), vec!["dog"]);
    }

    #[test]
    fn exact_head_with_fuzzy_tail() {
        let (_dir, trie) = trie_with(&["cat", "car", "cart", "bat", "cut"]);
        // "ca" must match exactly, "t" within one edit
        let found = trie
            .search_split(b"cat", 2, EditBudget::exactly(0), EditBudget::within(1), false)
            .unwrap();
        assert_eq!(strings(found), vec!["car", "cart", "cat"]);
    }

    #[test]
    fn fuzzy_head_switches_mid_label() {
        let (_dir, trie) = trie_with(&["cbt", "xyz"]);
        // The single edge "cbt" is entered by the head and left by the tail
        let found = trie
            .search_split(b"cat", 2, EditBudget::exactly(1), EditBudget::within(0), false)
            .unwrap();
        assert_eq!(strings(found), vec!["cbt"]);
    }

    #[test]
    fn split_matches_brute_force_partition() {
        let words = ["banana", "bandana", "cabana", "band", "bandit", "canal", "panama", "banal"];
        let (_dir, trie) = trie_with(&words);
        let key = b"banana";

        for switch in 1..key.len() {
            for k1 in 0..=2 {
                for k2 in 0..=2 {
                    let found = trie
                        .search_split(key, switch, EditBudget::exactly(k1), EditBudget::within(k2), false)
                        .unwrap();

                    let (front, back) = key.split_at(switch);
                    let expected: Vec<String> = words
                        .iter()
                        .filter(|w| {
                            let w = w.as_bytes();
                            (0..=w.len()).any(|cut| {
                                edit_distance(front, &w[..cut], false) == k1
                                    && edit_distance(back, &w[cut..], false) <= k2
                            })
                        })
                        .map(|w| w.to_string())
                        .collect::<std::collections::BTreeSet<_>>()
                        .into_iter()
                        .collect();
                    assert_eq!(strings(found), expected, "switch={} k1={} k2={}", switch, k1, k2);
                }
            }
        }
    }

    #[test]
    fn switch_past_end_is_rejected() {
        let (_dir, trie) = trie_with(&["cat"]);
        let err = trie
            .search_split(b"cat", 4, EditBudget::within(1), EditBudget::within(1), false)
            .unwrap_err();
        assert_eq!(err.kind(), crate::core::error::ErrorKind::InvalidInput);
    }
}
