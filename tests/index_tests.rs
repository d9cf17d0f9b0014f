use std::collections::BTreeSet;
use fuzzdex::core::config::Config;
use fuzzdex::core::error::ErrorKind;
use fuzzdex::index::index::Index;
use fuzzdex::search::distance::edit_distance;
use levenshtein_automata::{Distance, LevenshteinAutomatonBuilder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::{TempDir, tempdir};

fn open_index(parallel: bool) -> (TempDir, Index) {
    let dir = tempdir().unwrap();
    let config = Config {
        shard_initial_size: 1024 * 1024,
        shard_size_limit: Some(1024 * 1024),
        max_edits: 3,
        parallel_search: parallel,
        ..Config::with_path(dir.path())
    };
    let index = Index::open(dir.path().join("index"), &config).unwrap();
    (dir, index)
}

fn strings(keys: Vec<Vec<u8>>) -> Vec<String> {
    keys.into_iter().map(|k| String::from_utf8(k).unwrap()).collect()
}

fn random_word(rng: &mut StdRng, alphabet: &[u8], max_len: usize) -> Vec<u8> {
    let len = rng.gen_range(1..=max_len);
    (0..len).map(|_| alphabet[rng.gen_range(0..alphabet.len())]).collect()
}

fn brute_force(words: &BTreeSet<Vec<u8>>, query: &[u8], k: usize, transpositions: bool) -> Vec<Vec<u8>> {
    words
        .iter()
        .filter(|w| edit_distance(query, w, transpositions) <= k)
        .cloned()
        .collect()
}

#[test]
fn concrete_scenario() {
    let (_dir, mut index) = open_index(false);
    for word in ["cat", "car", "cart", "dog"] {
        index.insert(word.as_bytes()).unwrap();
    }

    assert_eq!(strings(index.search_exact(b"car").unwrap()), vec!["car"]);
    // "cart" is one insertion away from "cat"
    assert_eq!(strings(index.search(b"cat", 1, false).unwrap()), vec!["car", "cart", "cat"]);
    assert_eq!(strings(index.search(b"cqt", 1, true).unwrap()), vec!["cat"]);
    assert_eq!(strings(index.search(b"act", 1, true).unwrap()), vec!["cat"]);
    assert!(index.search(b"act", 1, false).unwrap().is_empty());
    assert_eq!(strings(index.search(b"dgo", 2, false).unwrap()), vec!["dog"]);
}

#[test]
fn single_byte_and_empty_queries() {
    let (_dir, mut index) = open_index(true);
    for word in ["a", "b", "ab", "abc", ""] {
        index.insert(word.as_bytes()).unwrap();
    }
    assert_eq!(strings(index.search(b"a", 1, false).unwrap()), vec!["", "a", "ab", "b"]);
    assert_eq!(strings(index.search(b"", 1, false).unwrap()), vec!["", "a", "b"]);
}

#[test]
fn budget_above_maximum_is_unsupported() {
    let (_dir, index) = open_index(false);
    let err = index.search(b"word", 4, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedQuery);
}

#[test]
fn terminator_byte_is_invalid_input() {
    let (_dir, mut index) = open_index(false);
    let err = index.insert(&[b'a', 0xFF]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let err = index.search(&[0xFF], 1, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn split_search_matches_brute_force() {
    let mut rng = StdRng::seed_from_u64(2024);
    let alphabet = b"abcd";

    for parallel in [false, true] {
        let (_dir, mut index) = open_index(parallel);
        let mut words = BTreeSet::new();
        while words.len() < 200 {
            let word = random_word(&mut rng, alphabet, 8);
            index.insert(&word).unwrap();
            words.insert(word);
        }

        for _ in 0..40 {
            let query = random_word(&mut rng, alphabet, 9);
            for k in 0..=3 {
                for transpositions in [false, true] {
                    let found = index.search(&query, k, transpositions).unwrap();
                    let expected = brute_force(&words, &query, k, transpositions);
                    assert_eq!(
                        found,
                        expected,
                        "query {:?} k={} transpositions={}",
                        String::from_utf8_lossy(&query),
                        k,
                        transpositions
                    );
                }
            }
        }
    }
}

#[test]
fn levenshtein_results_agree_with_dfa() {
    let mut rng = StdRng::seed_from_u64(17);
    let (_dir, mut index) = open_index(true);
    let mut words = BTreeSet::new();
    while words.len() < 150 {
        let word = random_word(&mut rng, b"abcde", 7);
        index.insert(&word).unwrap();
        words.insert(word);
    }

    for k in 1..=2u8 {
        let builder = LevenshteinAutomatonBuilder::new(k, false);
        for _ in 0..25 {
            let query = random_word(&mut rng, b"abcde", 7);
            let dfa = builder.build_dfa(std::str::from_utf8(&query).unwrap());
            let expected: Vec<Vec<u8>> = words
                .iter()
                .filter(|w| matches!(dfa.eval(std::str::from_utf8(w).unwrap()), Distance::Exact(_)))
                .cloned()
                .collect();
            assert_eq!(index.search(&query, k as usize, false).unwrap(), expected);
        }
    }
}

#[test]
fn both_tries_hold_every_key() {
    let (_dir, mut index) = open_index(false);
    for word in ["stone", "notes", "onset"] {
        index.insert(word.as_bytes()).unwrap();
    }
    assert_eq!(strings(index.forward().keys().unwrap()), vec!["notes", "onset", "stone"]);
    assert_eq!(strings(index.reverse().keys().unwrap()), vec!["enots", "seton", "tesno"]);

    let stats = index.stats().unwrap();
    assert_eq!(stats.forward.live_nodes(), index.forward().reachable_nodes().unwrap());
    assert_eq!(stats.reverse.live_nodes(), index.reverse().reachable_nodes().unwrap());
}
